//! Debounced viewport-driven load scheduling.
//!
//! The scheduler does not know the camera or the layout. It is told when the
//! viewport changed and, when asked to fire, queries a [`VisibleSet`] for the
//! pages on screen and the current view scale. Time is passed in explicitly so
//! the caller's event loop owns the clock.

use crate::config::SchedulerConfig;
use crate::queue::{LoadRequest, RequestQueue};
use pdf_desktop_cache::{CacheKey, Scale};
use pdf_desktop_render::PageRef;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// What the viewport currently shows.
pub trait VisibleSet {
    /// Current camera scale.
    fn view_scale(&self) -> f32;

    /// Pages on screen, in the order they should be loaded.
    fn visible_pages(&self) -> Vec<PageRef>;
}

/// Plain snapshot of a viewport, for callers without a live layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub scale: f32,
    pub visible: Vec<PageRef>,
}

impl ViewSnapshot {
    pub fn new(scale: f32, visible: Vec<PageRef>) -> Self {
        Self { scale, visible }
    }
}

impl VisibleSet for ViewSnapshot {
    fn view_scale(&self) -> f32 {
        self.scale
    }

    fn visible_pages(&self) -> Vec<PageRef> {
        self.visible.clone()
    }
}

/// One placed page from the restored layout, nearest to the camera first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedEntry {
    pub page: PageRef,
    /// Whether the page intersects the initial viewport.
    pub in_bounds: bool,
}

impl SeedEntry {
    pub fn new(page: PageRef, in_bounds: bool) -> Self {
        Self { page, in_bounds }
    }
}

pub struct ViewportScheduler {
    config: SchedulerConfig,
    queue: Arc<RequestQueue>,
    deadline: Option<Instant>,
    fired: u64,
}

impl ViewportScheduler {
    pub fn new(config: SchedulerConfig, queue: Arc<RequestQueue>) -> Self {
        Self { config, queue, deadline: None, fired: 0 }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Scale requests are issued at for a given view scale.
    ///
    /// Views zoomed out below `min_load_scale` load at `default_scale`; nothing
    /// is requested above `max_load_scale`.
    pub fn effective_scale(&self, view_scale: f32) -> Scale {
        let scale = if view_scale >= self.config.min_load_scale {
            view_scale.min(self.config.max_load_scale)
        } else {
            self.config.default_scale
        };
        Scale::new(scale).unwrap_or_else(|| self.default_scale())
    }

    fn default_scale(&self) -> Scale {
        Scale::new(self.config.default_scale).unwrap_or(Scale::ONE)
    }

    /// Note a pan, zoom, or resize.
    ///
    /// Restarts the debounce timer, unless `preserve_timer` is set and a timer
    /// is already running (continuous panning).
    pub fn viewport_changed(&mut self, now: Instant, preserve_timer: bool) {
        if preserve_timer && self.deadline.is_some() {
            return;
        }
        self.deadline = Some(now + self.config.debounce());
    }

    /// When the pending timer fires, if one is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Drop a pending timer without scheduling anything.
    pub fn cancel_pending(&mut self) {
        self.deadline = None;
    }

    /// Fire the timer if it is due. Returns whether a batch was submitted.
    pub fn poll(&mut self, now: Instant, view: &impl VisibleSet) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.schedule_now(view);
                true
            }
            _ => false,
        }
    }

    /// Submit the visible pages right away as a replaceable batch.
    ///
    /// Clears any pending timer. Returns the number of requests submitted.
    pub fn schedule_now(&mut self, view: &impl VisibleSet) -> usize {
        self.deadline = None;
        let requests = self.visible_requests(view);
        let len = requests.len();

        tracing::debug!(requests = len, scale = view.view_scale(), "scheduling visible pages");
        self.queue.submit(requests, true);
        self.fired += 1;
        len
    }

    /// Requests for every visible page at the effective scale.
    pub fn visible_requests(&self, view: &impl VisibleSet) -> Vec<LoadRequest> {
        let scale = self.effective_scale(view.view_scale());
        let mut seen = HashSet::new();
        view.visible_pages()
            .into_iter()
            .filter(|page| seen.insert(*page))
            .map(|page| CacheKey::new(page, scale))
            .collect()
    }

    /// Build the initial load list from a restored layout.
    ///
    /// For each page the view scale comes first when the page is on screen
    /// and the scale is at least `min_load_scale`, followed by the default
    /// scale. Pages keep the order of their first appearance.
    pub fn seed_requests(&self, entries: &[SeedEntry], view_scale: f32) -> Vec<LoadRequest> {
        let view = Scale::new(view_scale).filter(|_| view_scale >= self.config.min_load_scale);
        let default = self.default_scale();

        let mut scales: HashMap<PageRef, Vec<Scale>> = HashMap::new();
        for entry in entries {
            let listed = scales.entry(entry.page).or_default();
            if let Some(view) = view {
                if entry.in_bounds && !listed.contains(&view) {
                    listed.insert(0, view);
                }
            }
            if !listed.contains(&default) {
                listed.push(default);
            }
        }

        let mut added = HashSet::new();
        let mut requests = Vec::new();
        for entry in entries {
            if !added.insert(entry.page) {
                continue;
            }
            if let Some(listed) = scales.get(&entry.page) {
                requests.extend(listed.iter().map(|&scale| CacheKey::new(entry.page, scale)));
            }
        }
        requests
    }

    /// Submit the seed list as a non-replaceable batch.
    pub fn seed(&mut self, entries: &[SeedEntry], view_scale: f32) -> usize {
        let requests = self.seed_requests(entries, view_scale);
        let len = requests.len();
        tracing::debug!(requests = len, pages = entries.len(), "seeding initial textures");
        self.queue.submit(requests, false);
        len
    }

    /// How many replaceable batches this scheduler has submitted.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}
