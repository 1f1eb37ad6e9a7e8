//! Cache keys, scales and the cache epoch.

use pdf_desktop_render::{DocumentHandle, PageRef};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Positive, finite zoom factor a page is rasterized at.
///
/// Compared and hashed by bit pattern so that it can be part of a key;
/// ordered with `f32::total_cmp`.
#[derive(Debug, Clone, Copy)]
pub struct Scale(f32);

impl Scale {
    /// One pixel per PDF point.
    pub const ONE: Scale = Scale(1.0);

    /// Returns `None` unless `value` is positive and finite.
    pub fn new(value: f32) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl PartialEq for Scale {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Scale {}

impl Hash for Scale {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Scale {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scale {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one rasterized variant: (document, page, scale).
///
/// Load requests use the same triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub page: PageRef,
    pub scale: Scale,
}

impl CacheKey {
    pub fn new(page: PageRef, scale: Scale) -> Self {
        Self { page, scale }
    }

    pub fn document(&self) -> DocumentHandle {
        self.page.document
    }

    pub fn page_index(&self) -> u32 {
        self.page.index
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc {} page {} @ {}", self.page.document.raw(), self.page.index, self.scale)
    }
}

/// Monotonic counter advanced on every cache mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}
