//! PDF Desktop Render Library
//!
//! The rasterization seam of the texture pipeline: document handles, the
//! `Rasterizer` trait the background worker calls on cache misses, and a
//! lopdf-backed reference implementation.

pub mod document;
pub mod lopdf_backend;
pub mod raster;

pub use document::{DocumentHandle, PageRef, PageSize};
pub use lopdf_backend::{LopdfRasterizer, OpenSource};
pub use raster::{check_dimensions, PixelBuffer, RasterError, RasterResult, Rasterizer};
