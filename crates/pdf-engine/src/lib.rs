//! Document collaborators for the editor: a page renderer ([`PdfEngine`])
//! and a document mutator ([`DocumentMutator`]), both backed by `lopdf`.
//!
//! [`LopdfEngine`] only reads page geometry. Its surfaces are white,
//! page-sized and framed by a grey border; page content is not rasterized.

mod mutator;
mod objects;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use mutator::{
    DocumentMutator, EllipseParams, FontRef, ImageFormat, ImageParams, ImageRef, LineParams,
    LopdfMutator, PageRef, PathParams, PdfColor, PdfRect, RectangleParams, StandardFont,
    StrokeParams, TextParams,
};

use image::{ImageBuffer, Rgba};
use lopdf::Document;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Quarter-turn view rotation. Quarter turns swap surface width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageRotation {
    #[default]
    None,
    Clockwise90,
    Half,
    Clockwise270,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
    pub rotation: PageRotation,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0, rotation: PageRotation::None }
    }
}

/// Pixel surface of one page at the requested scale and rotation.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: RgbaImage,
    pub width_px: u32,
    pub height_px: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSize {
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self { width_px: 256, height_px: 256 }
    }
}

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

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("{kind} does not belong to document {handle}")]
    ForeignReference { kind: &'static str, handle: u64 },
    #[error("{0}")]
    Backend(String),
}

/// Page renderer the editor session reads geometry and surfaces from.
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    /// Media box size of a 0-based page, in points.
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RenderedPage, PdfEngineError>;
    /// Surface scaled down to fit `target`, aspect ratio kept.
    fn render_thumbnail(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        target: ThumbnailSize,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

pub(crate) fn reject_encrypted(bytes: &[u8]) -> Result<(), PdfEngineError> {
    if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfEngineError::EncryptedUnsupported);
    }
    Ok(())
}

/// Renderer that parses media boxes with `lopdf` and paints white
/// surfaces of the page's size. Documents containing `/Encrypt` are refused.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    page_sizes: HashMap<DocumentHandle, Vec<PageSize>>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        reject_encrypted(bytes)?;

        let doc = Document::load_mem(bytes)?;
        let sizes: Vec<PageSize> = doc
            .get_pages()
            .into_values()
            .map(|page_id| {
                let [x0, y0, x1, y1] = objects::media_box(&doc, page_id);
                PageSize { width_pt: x1 - x0, height_pt: y1 - y0 }
            })
            .collect();

        if sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn sizes(&self, handle: DocumentHandle) -> Result<&[PageSize], PdfEngineError> {
        self.page_sizes
            .get(&handle)
            .map(Vec::as_slice)
            .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        tracing::debug!(handle = handle.raw(), pages = page_sizes.len(), "opened document");
        self.page_sizes.insert(handle, page_sizes);

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.sizes(handle)?.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let sizes = self.sizes(handle)?;
        sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RenderedPage, PdfEngineError> {
        let page_size = self.page_size(handle, request.page_index)?;
        let scale = if request.scale <= 0.0 { 1.0 } else { request.scale };

        let (page_width, page_height) = match request.rotation {
            PageRotation::Clockwise90 | PageRotation::Clockwise270 => {
                (page_size.height_pt, page_size.width_pt)
            }
            PageRotation::None | PageRotation::Half => (page_size.width_pt, page_size.height_pt),
        };

        let width = (page_width * scale).round().max(1.0) as u32;
        let height = (page_height * scale).round().max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(RenderedPage { image, width_px: width, height_px: height })
    }

    fn render_thumbnail(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        target: ThumbnailSize,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page = self.render_page(
            handle,
            RenderRequest { page_index, scale: 0.25, ..RenderRequest::default() },
        )?;
        let (width, height) = fit_within(page.width_px, page.height_px, target);

        Ok(image::imageops::thumbnail(&page.image, width, height))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.page_sizes
            .remove(&handle)
            .map(|_| ())
            .ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

/// Largest size with the surface's aspect ratio that fits inside `target`.
fn fit_within(width: u32, height: u32, target: ThumbnailSize) -> (u32, u32) {
    let ratio =
        (target.width_px as f32 / width as f32).min(target.height_px as f32 / height as f32);
    let fit = |side: u32| ((side as f32 * ratio).round() as u32).max(1);
    (fit(width), fit(height))
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

pub fn default_mutator() -> LopdfMutator {
    LopdfMutator::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_pdf;

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf(&[(612.0, 792.0), (300.0, 400.0)])))
            .expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 2);
        let size = engine.page_size(handle, 1).expect("size should succeed");
        assert_eq!(size, PageSize { width_pt: 300.0, height_pt: 400.0 });
    }

    #[test]
    fn rotated_render_swaps_surface_dimensions() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(sample_pdf(&[(200.0, 100.0)]))).unwrap();

        let page = engine
            .render_page(
                handle,
                RenderRequest {
                    scale: 2.0,
                    rotation: PageRotation::Clockwise90,
                    ..Default::default()
                },
            )
            .expect("render should succeed");

        assert_eq!((page.width_px, page.height_px), (200, 400));
        assert_eq!(page.image.dimensions(), (200, 400));
    }

    #[test]
    fn thumbnails_keep_the_page_aspect_ratio() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf(&[(612.0, 792.0)])))
            .expect("open should succeed");

        let image = engine
            .render_thumbnail(handle, 0, ThumbnailSize { width_px: 80, height_px: 80 })
            .expect("thumbnail should render");

        // 612x792 keeps its portrait ratio inside the square target.
        assert_eq!(image.dimensions(), (62, 80));
    }

    #[test]
    fn surfaces_are_white_with_a_grey_frame() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(sample_pdf(&[(40.0, 20.0)]))).unwrap();

        let page = engine.render_page(handle, RenderRequest::default()).unwrap();

        assert_eq!(page.image.dimensions(), (40, 20));
        assert_eq!(page.image.get_pixel(20, 10), &Rgba([255, 255, 255, 255]));
        assert_eq!(page.image.get_pixel(0, 0), &Rgba([220, 220, 220, 255]));
        assert_eq!(page.image.get_pixel(39, 19), &Rgba([220, 220, 220, 255]));
    }

    #[test]
    fn encrypted_documents_are_refused() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"%PDF-1.7\ntrailer << /Encrypt 5 0 R >>\n".to_vec()))
            .expect_err("should refuse");
        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }

    #[test]
    fn garbage_bytes_fail_to_open() {
        let mut engine = LopdfEngine::new();
        let err = engine.open(OpenSource::Bytes(b"not a pdf".to_vec())).expect_err("should fail");
        assert!(matches!(err, PdfEngineError::Parse(_)));
    }
}
