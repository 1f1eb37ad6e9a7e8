//! PDF Desktop Cache Library
//!
//! Bounded multi-resolution texture cache keyed by (document, page), with an
//! optional reference-counted freeing mode and a global epoch for cheap
//! staleness checks.

pub mod config;
pub mod key;
pub mod texture;

pub use config::{CacheConfig, ConfigError, FreeingStrategy};
pub use key::{CacheKey, Epoch, Scale};
pub use texture::{CacheError, CacheStats, TextureCache, TextureHandle, TextureLease};
