//! PDF Desktop Scheduler Library
//!
//! Request queue, background texture worker, handoff gate and debounced
//! viewport scheduling for the page texture pipeline.
//!
//! The worker runs on its own thread and never touches display objects. Every
//! result is marshalled back to the interactive thread as a [`UiEvent`], and
//! the [`HandoffGate`] keeps at most one such commit in flight.
//!
//! # Example
//!
//! ```
//! use pdf_desktop_cache::{CacheKey, Scale};
//! use pdf_desktop_render::{DocumentHandle, PageRef};
//! use pdf_desktop_scheduler::RequestQueue;
//!
//! let queue = RequestQueue::new();
//! let page = PageRef::new(DocumentHandle::from_raw(1), 0);
//!
//! // Viewport-driven work is replaceable; a newer batch may cut it short.
//! let request = CacheKey::new(page, Scale::ONE);
//! queue.submit(vec![request], true);
//!
//! // The worker takes the batch, then the view moves away from the page.
//! let batch = queue.wait_pop().unwrap();
//! queue.submit(Vec::new(), true);
//! assert!(batch.contains(&request));
//! assert!(queue.supersedes(&request));
//! ```

pub mod config;
pub mod gate;
pub mod handoff;
pub mod queue;
pub mod viewport;
pub mod worker;

pub use config::{SchedulerConfig, SchedulerConfigError};
pub use gate::HandoffGate;
pub use handoff::{handoff_channel, CommitSender, InteractivePump, UiEvent};
pub use queue::{LoadRequest, QueueStats, RequestBatch, RequestQueue};
pub use viewport::{SeedEntry, ViewSnapshot, ViewportScheduler, VisibleSet};
pub use worker::{TextureWorker, WorkerStats, WORKER_THREAD_NAME};
