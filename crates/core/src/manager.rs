//! Texture manager: the application-facing side of the texture pipeline.
//!
//! Owns the cache, the request queue, the handoff gate and the background
//! worker, and exposes them as one object living on the interactive thread.
//! The event loop calls [`TextureManager::pump`] (or `pump_timeout`) to apply
//! worker results, and [`TextureManager::poll_viewport`] to let the debounce
//! timer fire.

use crate::config::{DesktopConfig, DesktopConfigError};
use pdf_desktop_cache::{
    CacheError, CacheKey, CacheStats, Epoch, Scale, TextureCache, TextureHandle, TextureLease,
};
use pdf_desktop_render::{PageRef, Rasterizer};
use pdf_desktop_scheduler::{
    handoff_channel, CommitSender, HandoffGate, InteractivePump, LoadRequest, QueueStats,
    RequestQueue, SeedEntry, TextureWorker, ViewportScheduler, VisibleSet, WorkerStats,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("texture worker already started")]
    AlreadyStarted,
    #[error("failed to spawn texture worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] DesktopConfigError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub cache: CacheStats,
    pub queue: QueueStats,
    pub worker: WorkerStats,
}

pub struct TextureManager {
    config: DesktopConfig,
    rasterizer: Arc<dyn Rasterizer>,
    cache: Arc<TextureCache>,
    queue: Arc<RequestQueue>,
    gate: Arc<HandoffGate>,
    viewport: ViewportScheduler,
    pump: InteractivePump,
    commits: Option<CommitSender>,
    worker: Option<TextureWorker>,
}

impl TextureManager {
    /// Build the pipeline. Nothing runs until [`TextureManager::start`].
    pub fn new(rasterizer: Arc<dyn Rasterizer>, config: DesktopConfig) -> ManagerResult<Self> {
        config.validate()?;

        let cache = Arc::new(TextureCache::new(config.cache.clone()));
        let queue = Arc::new(RequestQueue::new());
        let gate = Arc::new(HandoffGate::new());
        let (commits, pump) = handoff_channel(Arc::clone(&gate));
        let viewport = ViewportScheduler::new(config.scheduler.clone(), Arc::clone(&queue));

        Ok(Self {
            config,
            rasterizer,
            cache,
            queue,
            gate,
            viewport,
            pump,
            commits: Some(commits),
            worker: None,
        })
    }

    pub fn config(&self) -> &DesktopConfig {
        &self.config
    }

    /// Spawn the worker and open the handoff gate for its first request.
    pub fn start(&mut self) -> ManagerResult<()> {
        let commits = self.commits.take().ok_or(ManagerError::AlreadyStarted)?;
        let worker = TextureWorker::spawn(
            Arc::clone(&self.rasterizer),
            Arc::clone(&self.cache),
            Arc::clone(&self.queue),
            Arc::clone(&self.gate),
            commits,
        )?;
        self.worker = Some(worker);
        self.gate.release();

        tracing::info!(
            max_textures_keep = self.config.cache.max_textures_keep,
            freeing = ?self.config.cache.freeing,
            "texture manager started"
        );
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.worker.is_some()
    }

    /// Started and the worker thread has not exited.
    pub fn is_worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(TextureWorker::is_running)
    }

    /// Queue requests for the worker.
    pub fn submit(&self, requests: Vec<LoadRequest>, replaceable: bool) {
        self.queue.submit(requests, replaceable);
    }

    /// Best cached texture for `page` at `scale`; see [`TextureCache::get`].
    ///
    /// In ref-counted mode every hit must be paired with [`release`] or
    /// [`release_handle`]; [`acquire`] does that automatically.
    ///
    /// [`release`]: TextureManager::release
    /// [`release_handle`]: TextureManager::release_handle
    /// [`acquire`]: TextureManager::acquire
    pub fn get(&self, page: PageRef, scale: Scale) -> Option<TextureHandle> {
        self.cache.get(page, scale)
    }

    pub fn acquire(&self, page: PageRef, scale: Scale) -> Option<TextureLease> {
        self.cache.acquire(page, scale)
    }

    /// Give back a reference by key. No-op unless ref-counted.
    pub fn release(&self, key: CacheKey) -> ManagerResult<()> {
        Ok(self.cache.release(key)?)
    }

    pub fn release_handle(&self, handle: TextureHandle) -> ManagerResult<()> {
        Ok(self.cache.release_handle(handle)?)
    }

    pub fn has_any(&self, page: PageRef) -> bool {
        self.cache.has_any(page)
    }

    pub fn is_fresh(&self, stamp: Epoch) -> bool {
        self.cache.is_fresh(stamp)
    }

    pub fn cache(&self) -> &Arc<TextureCache> {
        &self.cache
    }

    pub fn viewport_scheduler(&mut self) -> &mut ViewportScheduler {
        &mut self.viewport
    }

    /// Note a viewport change; see [`ViewportScheduler::viewport_changed`].
    pub fn viewport_changed(&mut self, now: Instant, preserve_timer: bool) {
        self.viewport.viewport_changed(now, preserve_timer);
    }

    /// Let the debounce timer fire if it is due.
    pub fn poll_viewport(&mut self, now: Instant, view: &impl VisibleSet) -> bool {
        self.viewport.poll(now, view)
    }

    /// Queue the initial textures for a restored layout.
    pub fn seed(&mut self, entries: &[SeedEntry], view_scale: f32) -> usize {
        self.viewport.seed(entries, view_scale)
    }

    /// Apply pending worker results; `on_refresh` runs once per new texture.
    pub fn pump<F>(&self, on_refresh: F) -> usize
    where
        F: FnMut(CacheKey),
    {
        self.pump.pump(on_refresh)
    }

    pub fn pump_timeout<F>(&self, timeout: Duration, on_refresh: F) -> usize
    where
        F: FnMut(CacheKey),
    {
        self.pump.pump_timeout(timeout, on_refresh)
    }

    /// No queued or in-flight work and no results waiting to be pumped.
    pub fn is_idle(&self) -> bool {
        self.queue.is_drained() && self.pump.pending() == 0
    }

    /// Pump until the pipeline is idle or `timeout` passes.
    ///
    /// For headless drivers; an interactive application pumps from its own
    /// event loop instead. Returns whether the pipeline went idle, and gives
    /// up early when pending work has no running worker to serve it.
    pub fn run_until_idle<F>(&self, timeout: Duration, mut on_refresh: F) -> bool
    where
        F: FnMut(CacheKey),
    {
        let deadline = Instant::now() + timeout;
        loop {
            let drained = self.queue.is_drained();
            self.pump.pump(&mut on_refresh);
            if drained {
                return true;
            }
            if !self.is_worker_running() {
                tracing::warn!(pending = self.queue.pending_len(), "texture worker is not running");
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(pending = self.queue.pending_len(), "texture pipeline did not go idle");
                return false;
            }
            let wait = (deadline - now).min(Duration::from_millis(20));
            self.pump.pump_timeout(wait, &mut on_refresh);
        }
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            cache: self.cache.stats(),
            queue: self.queue.stats(),
            worker: self.worker.as_ref().map(TextureWorker::stats).unwrap_or_default(),
        }
    }

    /// Stop the worker. Cached textures stay readable.
    pub fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}
