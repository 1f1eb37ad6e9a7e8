//! The rasterization seam.
//!
//! A [`Rasterizer`] turns (document, page, scale) into an RGBA pixel buffer.
//! Implementations may be slow and may fail; the background worker treats
//! every call as opaque and never interrupts one in flight.

use crate::document::{DocumentHandle, PageSize};
use image::{ImageBuffer, Rgba};

/// RGBA8 pixel buffer produced by a rasterizer and owned by the texture cache.
pub type PixelBuffer = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid document handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported by this backend")]
    EncryptedUnsupported,
    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f32),
    #[error("rasterizer produced a degenerate {width}x{height} buffer")]
    Degenerate { width: u32, height: u32 },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("rasterizer panicked: {0}")]
    Panicked(String),
}

pub type RasterResult<T> = Result<T, RasterError>;

/// Rasterization backend consumed by the texture worker.
///
/// Called from the worker thread only, hence `Send + Sync`.
pub trait Rasterizer: Send + Sync {
    fn page_count(&self, document: DocumentHandle) -> RasterResult<u32>;

    fn page_size(&self, document: DocumentHandle, page_index: u32) -> RasterResult<PageSize>;

    /// Render one page at `scale` (1.0 = one pixel per PDF point).
    fn rasterize(
        &self,
        document: DocumentHandle,
        page_index: u32,
        scale: f32,
    ) -> RasterResult<PixelBuffer>;
}

/// Reject buffers that cannot back a texture.
pub fn check_dimensions(width: u32, height: u32) -> RasterResult<()> {
    if width == 0 || height == 0 {
        return Err(RasterError::Degenerate { width, height });
    }
    Ok(())
}
