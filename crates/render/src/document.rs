//! Document and page identity.
//!
//! Documents are owned by whoever opened them; the texture pipeline only
//! ever sees the opaque handle and compares it by value.

/// Opaque handle to an open document, issued by a [`crate::Rasterizer`] backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    /// Wrap a raw backend identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A page within a document (zero-based index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageRef {
    pub document: DocumentHandle,
    pub index: u32,
}

impl PageRef {
    pub const fn new(document: DocumentHandle, index: u32) -> Self {
        Self { document, index }
    }
}

/// Page size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// US Letter, used when a page carries no usable MediaBox.
    pub const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

    /// Pixel dimensions of the page rasterized at `scale`, truncated like the
    /// surface allocation of the renderer.
    pub fn pixel_size(&self, scale: f32) -> (u32, u32) {
        let width = (self.width_pt * scale).max(0.0) as u32;
        let height = (self.height_pt * scale).max(0.0) as u32;
        (width, height)
    }
}
