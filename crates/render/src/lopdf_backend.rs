//! Reference rasterizer backed by lopdf.
//!
//! lopdf parses structure but does not paint content streams, so pages are
//! produced as blank paper of the correct pixel size with a light border.
//! That is enough to drive the texture pipeline end to end and to exercise
//! real page geometry.

use crate::document::{DocumentHandle, PageSize};
use crate::raster::{check_dimensions, PixelBuffer, RasterError, RasterResult, Rasterizer};
use image::Rgba;
use lopdf::Document;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    label: String,
    page_sizes: Vec<PageSize>,
}

#[derive(Debug, Default)]
pub struct LopdfRasterizer {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document and return its handle. Documents stay open until
    /// [`LopdfRasterizer::close`] is called.
    pub fn open(&mut self, source: OpenSource) -> RasterResult<DocumentHandle> {
        let (label, bytes) = match source {
            OpenSource::Path(path) => (path.display().to_string(), fs::read(&path)?),
            OpenSource::Bytes(bytes) => ("<memory>".to_owned(), bytes),
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle::from_raw(self.next_handle);
        self.docs.insert(handle, DocumentRecord { label, page_sizes });

        Ok(handle)
    }

    pub fn close(&mut self, handle: DocumentHandle) -> RasterResult<()> {
        self.docs.remove(&handle).map(|_| ()).ok_or(RasterError::InvalidHandle(handle.raw()))
    }

    /// Path (or `<memory>`) the document was opened from.
    pub fn label(&self, handle: DocumentHandle) -> RasterResult<&str> {
        Ok(self.record(handle)?.label.as_str())
    }

    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    fn parse_sizes(bytes: &[u8]) -> RasterResult<Vec<PageSize>> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(RasterError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or(PageSize::LETTER);

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(RasterError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> RasterResult<&DocumentRecord> {
        self.docs.get(&handle).ok_or(RasterError::InvalidHandle(handle.raw()))
    }
}

impl Rasterizer for LopdfRasterizer {
    fn page_count(&self, handle: DocumentHandle) -> RasterResult<u32> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page_index: u32) -> RasterResult<PageSize> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(RasterError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn rasterize(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        scale: f32,
    ) -> RasterResult<PixelBuffer> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RasterError::InvalidScale(scale));
        }

        let (width, height) = self.page_size(handle, page_index)?.pixel_size(scale);
        check_dimensions(width, height)?;

        let mut image = PixelBuffer::from_pixel(width, height, PAPER);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        Ok(image)
    }
}
