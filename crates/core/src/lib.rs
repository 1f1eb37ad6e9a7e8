//! PDF Desktop Core Library
//!
//! Ties the texture pipeline together for the desktop: a [`TextureManager`]
//! that owns the cache, queue, worker and viewport scheduler, the per-entity
//! [`PageSlot`] policy that decides when to ask the cache again, and the
//! display side table used to route pointer events back to page entities.
//!
//! # Example
//!
//! ```no_run
//! use pdf_desktop_core::{DesktopConfig, TextureManager};
//! use pdf_desktop_render::{LopdfRasterizer, OpenSource, PageRef};
//! use pdf_desktop_scheduler::SeedEntry;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut rasterizer = LopdfRasterizer::new();
//! let doc = rasterizer.open(OpenSource::from(std::path::Path::new("paper.pdf")))?;
//!
//! let mut manager = TextureManager::new(Arc::new(rasterizer), DesktopConfig::from_env()?)?;
//! manager.start()?;
//! manager.seed(&[SeedEntry::new(PageRef::new(doc, 0), true)], 1.0);
//! manager.run_until_idle(Duration::from_secs(10), |key| println!("ready: {key}"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod manager;
pub mod registry;
pub mod slot;

pub use config::{DesktopConfig, DesktopConfigError, ENV_DEBOUNCE_MS};
pub use manager::{ManagerError, ManagerResult, ManagerStats, TextureManager};
pub use registry::{DisplayId, DisplayRegistry, EntityId};
pub use slot::{PageSlot, SlotChange};
