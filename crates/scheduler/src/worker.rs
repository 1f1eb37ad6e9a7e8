//! Background texture worker.
//!
//! A single dedicated thread drains the request queue one batch at a time.
//! For every request it takes the handoff gate, checks whether a newer batch
//! made the rest of a replaceable batch obsolete, rasterizes on a cache miss,
//! and hands the gate back through the interactive thread. Cancellation is
//! only checked between requests; an in-flight rasterization always runs to
//! completion.

use crate::gate::HandoffGate;
use crate::handoff::CommitSender;
use crate::queue::{RequestBatch, RequestQueue};
use pdf_desktop_cache::{CacheKey, TextureCache};
use pdf_desktop_render::{check_dimensions, PixelBuffer, RasterError, RasterResult, Rasterizer};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "pdf-desktop-raster";

/// Statistics about the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Batches taken from the queue and finished (fully or abandoned)
    pub batches: u64,

    /// Requests that produced a new texture
    pub rasterized: u64,

    /// Requests skipped because the exact variant was already cached
    pub already_cached: u64,

    /// Requests dropped because a newer batch superseded them
    pub abandoned: u64,

    /// Requests whose rasterization failed
    pub failures: u64,
}

#[derive(Default)]
struct WorkerCounters {
    batches: AtomicU64,
    rasterized: AtomicU64,
    already_cached: AtomicU64,
    abandoned: AtomicU64,
    failures: AtomicU64,
}

impl WorkerCounters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            batches: self.batches.load(Ordering::Relaxed),
            rasterized: self.rasterized.load(Ordering::Relaxed),
            already_cached: self.already_cached.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Everything the worker thread owns.
struct WorkerContext {
    rasterizer: Arc<dyn Rasterizer>,
    cache: Arc<TextureCache>,
    queue: Arc<RequestQueue>,
    gate: Arc<HandoffGate>,
    commits: CommitSender,
    shutdown: Arc<AtomicBool>,
    counters: Arc<WorkerCounters>,
}

/// Handle to the running texture worker.
///
/// Dropping the handle shuts the worker down and joins it.
pub struct TextureWorker {
    thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    queue: Arc<RequestQueue>,
    gate: Arc<HandoffGate>,
    counters: Arc<WorkerCounters>,
}

impl TextureWorker {
    /// Start the worker thread.
    ///
    /// The worker blocks on `gate` before its first request; the interactive
    /// side is expected to open it once it is ready to receive commits.
    pub fn spawn(
        rasterizer: Arc<dyn Rasterizer>,
        cache: Arc<TextureCache>,
        queue: Arc<RequestQueue>,
        gate: Arc<HandoffGate>,
        commits: CommitSender,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(WorkerCounters::default());

        let context = WorkerContext {
            rasterizer,
            cache,
            queue: Arc::clone(&queue),
            gate: Arc::clone(&gate),
            commits,
            shutdown: Arc::clone(&shutdown),
            counters: Arc::clone(&counters),
        };

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || context.run())?;

        tracing::debug!("texture worker started");

        Ok(Self { thread: Some(thread), shutdown, queue, gate, counters })
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// A rasterization already in progress finishes first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.queue.close();
        self.gate.close();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("texture worker panicked");
            }
            tracing::debug!("texture worker stopped");
        }
    }
}

impl Drop for TextureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl WorkerContext {
    fn run(self) {
        while let Some(batch) = self.queue.wait_pop() {
            self.process(&batch);
            self.queue.finish_batch();
            self.counters.batches.fetch_add(1, Ordering::Relaxed);

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
        }
    }

    fn process(&self, batch: &RequestBatch) {
        for (index, request) in batch.requests().iter().enumerate() {
            if !self.gate.acquire() || self.shutdown.load(Ordering::Acquire) {
                return;
            }

            if batch.is_replaceable() && self.queue.supersedes(request) {
                let remaining = (batch.len() - index) as u64;
                self.counters.abandoned.fetch_add(remaining, Ordering::Relaxed);
                tracing::debug!(%request, remaining, "batch superseded, abandoning the rest");
                self.commits.release_gate();
                return;
            }

            self.load(*request);
            self.commits.release_gate();
        }
    }

    fn load(&self, request: CacheKey) {
        if self.cache.contains(request) {
            self.counters.already_cached.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.rasterize(request) {
            Ok(buffer) => {
                self.cache.put(request, buffer);
                self.counters.rasterized.fetch_add(1, Ordering::Relaxed);
                self.commits.refresh(request);
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%request, error = %err, "rasterization failed");
            }
        }
    }

    /// A panicking backend is reported as a failure so the loop keeps going.
    fn rasterize(&self, request: CacheKey) -> RasterResult<PixelBuffer> {
        let rasterizer = &self.rasterizer;
        let buffer = panic::catch_unwind(AssertUnwindSafe(|| {
            rasterizer.rasterize(request.document(), request.page_index(), request.scale.get())
        }))
        .map_err(|payload| RasterError::Panicked(panic_payload_message(payload)))??;
        check_dimensions(buffer.width(), buffer.height())?;
        Ok(buffer)
    }
}

fn panic_payload_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else {
        "unknown panic".to_string()
    }
}
