//! Editing session controller
//!
//! Owns the live `(pages, annotations)` snapshot, the linear undo history,
//! the loaded document and the renderer/mutator collaborators. Every
//! discrete mutation builds the next snapshot and pushes it through
//! [`EditorSession::push_history`]; transient gesture frames go through
//! [`EditorSession::update_annotation`] and never touch history.
//!
//! Page numbers are 1-based positions in the editor page sequence.

use crate::config::EditorConfig;
use crate::export::{self, ExportError, ExportOptions};
use crate::interaction::{AnnotationStore, PageInteraction};
use crate::transform::PageTransform;
use doc_model::{
    Annotation, AnnotationId, AnnotationKind, Color, EditorPage, FontSpec, HistorySnapshot, PageId,
    Rotation, Size, Viewport,
};
use image::Rgba;
use pdf_engine::{
    DocumentHandle, DocumentMutator, OpenSource, PageRotation, PdfEngine, PdfEngineError, PdfRect,
    RenderRequest, RenderedPage, RgbaImage, ThumbnailSize,
};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to load document: {0}")]
    Load(#[source] PdfEngineError),
    #[error("cannot delete the last remaining page")]
    LastPage,
    #[error("page {0} is a blank page and cannot be cropped")]
    BlankPageCrop(u32),
    #[error("no document is loaded")]
    NoDocument,
    #[error("page {page} is out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("unknown annotation {0}")]
    UnknownAnnotation(AnnotationId),
    #[error("annotation {0} is not a crop region")]
    NotACrop(AnnotationId),
    #[error("crop region {0} is too small to apply")]
    DegenerateCrop(AnnotationId),
    #[error("invalid zoom scale {0}")]
    InvalidScale(f32),
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

/// Styling of the selected annotation, for property panels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionStyle {
    pub id: AnnotationId,
    pub kind: &'static str,
    pub color: Color,
    pub opacity: f32,
    pub stroke_width: Option<f32>,
    pub font: Option<FontSpec>,
}

impl SelectionStyle {
    fn of(annotation: &Annotation) -> Self {
        let stroke_width = match &annotation.kind {
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Highlight(shape)
            | AnnotationKind::Whiteout(shape)
            | AnnotationKind::Crop(shape) => Some(shape.stroke.width),
            AnnotationKind::Circle(ellipse) => Some(ellipse.stroke.width),
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                Some(segment.stroke.width)
            }
            AnnotationKind::FreehandPath(path) => Some(path.stroke.width),
            AnnotationKind::Text(_) | AnnotationKind::Image(_) | AnnotationKind::Stamp(_) => None,
        };
        let font = match &annotation.kind {
            AnnotationKind::Text(text) => Some(text.font.clone()),
            _ => None,
        };
        Self {
            id: annotation.id,
            kind: annotation.kind_name(),
            color: annotation.color(),
            opacity: annotation.opacity,
            stroke_width,
            font,
        }
    }
}

/// Source document as currently loaded in the renderer.
#[derive(Debug)]
struct LoadedDocument {
    bytes: Vec<u8>,
    handle: DocumentHandle,
    page_sizes: Vec<Size>,
    thumbnails: Vec<RgbaImage>,
}

impl LoadedDocument {
    fn open<R: PdfEngine>(renderer: &mut R, bytes: Vec<u8>) -> Result<Self, PdfEngineError> {
        let handle = renderer.open(OpenSource::Bytes(bytes.clone()))?;
        match Self::read_pages(renderer, handle) {
            Ok((page_sizes, thumbnails)) => Ok(Self { bytes, handle, page_sizes, thumbnails }),
            Err(err) => {
                let _ = renderer.close(handle);
                Err(err)
            }
        }
    }

    fn read_pages<R: PdfEngine>(
        renderer: &R,
        handle: DocumentHandle,
    ) -> Result<(Vec<Size>, Vec<RgbaImage>), PdfEngineError> {
        let count = renderer.page_count(handle)?;
        let mut sizes = Vec::with_capacity(count as usize);
        let mut thumbnails = Vec::with_capacity(count as usize);
        for index in 0..count {
            let size = renderer.page_size(handle, index)?;
            sizes.push(Size::new(size.width_pt, size.height_pt));
            thumbnails.push(renderer.render_thumbnail(handle, index, ThumbnailSize::default())?);
        }
        Ok((sizes, thumbnails))
    }
}

/// Editing session over one source document.
pub struct EditorSession<R: PdfEngine, M: DocumentMutator> {
    renderer: R,
    mutator: M,
    config: EditorConfig,
    document: Option<LoadedDocument>,
    history: Vec<HistorySnapshot>,
    cursor: usize,
    live: HistorySnapshot,
    selection: Option<AnnotationId>,
    scale: f32,
    rotation: Rotation,
    next_page_id: u64,
}

impl<R: PdfEngine, M: DocumentMutator> EditorSession<R, M> {
    /// Session with no document and no pages.
    pub fn new(renderer: R, mutator: M, config: EditorConfig) -> Self {
        let live = HistorySnapshot::default();
        Self {
            renderer,
            mutator,
            config,
            document: None,
            history: vec![live.clone()],
            cursor: 0,
            live,
            selection: None,
            scale: 1.0,
            rotation: Rotation::R0,
            next_page_id: 1,
        }
    }

    pub fn open(
        renderer: R,
        mutator: M,
        bytes: Vec<u8>,
        config: EditorConfig,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(renderer, mutator, config);
        session.load_document(bytes)?;
        Ok(session)
    }

    /// Replace the source document and start a fresh history with one page
    /// per source page.
    pub fn load_document(&mut self, bytes: Vec<u8>) -> Result<(), SessionError> {
        let document = LoadedDocument::open(&mut self.renderer, bytes).map_err(SessionError::Load)?;

        let pages = (0..document.page_sizes.len() as u32)
            .map(|index| EditorPage::original(self.allocate_page_id(), index))
            .collect();
        tracing::info!(
            pages = document.page_sizes.len(),
            bytes = document.bytes.len(),
            "document loaded"
        );

        self.replace_document(document);
        self.reset_history(HistorySnapshot::new(pages, Vec::new()));
        Ok(())
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Live state, including transient gesture frames.
    pub fn snapshot(&self) -> &HistorySnapshot {
        &self.live
    }

    pub fn pages(&self) -> &[EditorPage] {
        &self.live.pages
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.live.annotations
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.live.annotation(id)
    }

    pub fn page_count(&self) -> u32 {
        self.live.page_count()
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    /// Bytes of the loaded source document, as last (re)loaded.
    pub fn document_bytes(&self) -> Option<&[u8]> {
        self.document.as_ref().map(|document| document.bytes.as_slice())
    }

    /// Thumbnail of the source page shown at `page`, if it is not blank.
    pub fn thumbnail(&self, page: u32) -> Option<&RgbaImage> {
        let source_index = self.live.page(page)?.source_index()?;
        self.document.as_ref()?.thumbnails.get(source_index as usize)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// New interaction state machine for `page`, configured like the session.
    pub fn interaction(&self, page: u32) -> PageInteraction {
        PageInteraction::new(page, &self.config)
    }

    // History

    /// Drop everything after the cursor, append `(pages, annotations)` and
    /// make it the live state.
    pub fn push_history(&mut self, pages: Vec<EditorPage>, annotations: Vec<Annotation>) {
        let snapshot = HistorySnapshot::new(pages, annotations);
        self.history.truncate(self.cursor + 1);
        self.history.push(snapshot.clone());
        self.cursor = self.history.len() - 1;
        self.live = snapshot;
        self.drop_stale_selection();
        tracing::debug!(cursor = self.cursor, entries = self.history.len(), "history pushed");
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    /// Step back one entry; returns whether anything changed.
    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.cursor -= 1;
        self.restore_cursor();
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.cursor += 1;
        self.restore_cursor();
        true
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn restore_cursor(&mut self) {
        self.live = self.history[self.cursor].clone();
        self.drop_stale_selection();
        tracing::debug!(cursor = self.cursor, "history restored");
    }

    fn reset_history(&mut self, snapshot: HistorySnapshot) {
        self.history = vec![snapshot.clone()];
        self.cursor = 0;
        self.live = snapshot;
        self.selection = None;
    }

    // Annotations

    /// Add a finished annotation. A crop replaces any crop already on its page.
    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<AnnotationId, SessionError> {
        self.check_page(annotation.page)?;
        let annotation = annotation.normalized();
        let id = annotation.id;

        let mut annotations = self.live.annotations.clone();
        if annotation.is_crop() {
            annotations
                .retain(|existing| !(existing.is_crop() && existing.page == annotation.page));
        }
        tracing::debug!(
            %id,
            kind = annotation.kind_name(),
            page = annotation.page,
            "annotation added"
        );
        annotations.push(annotation);
        self.push_history(self.live.pages.clone(), annotations);
        Ok(id)
    }

    /// Replace an annotation in the live state only. Used for gesture frames.
    pub fn update_annotation(&mut self, annotation: Annotation) -> Result<(), SessionError> {
        self.check_page(annotation.page)?;
        let index = self.index_of(annotation.id)?;
        self.live.annotations[index] = annotation;
        Ok(())
    }

    /// Replace an annotation with its normalized form and push history.
    pub fn commit_annotation(&mut self, annotation: Annotation) -> Result<(), SessionError> {
        self.check_page(annotation.page)?;
        let index = self.index_of(annotation.id)?;
        let annotation = annotation.normalized();

        let mut annotations = self.live.annotations.clone();
        annotations[index] = annotation.clone();
        if annotation.is_crop() {
            annotations.retain(|existing| {
                existing.id == annotation.id
                    || !(existing.is_crop() && existing.page == annotation.page)
            });
        }
        self.push_history(self.live.pages.clone(), annotations);
        Ok(())
    }

    /// Apply a property change to one annotation as a single history entry.
    pub fn edit_annotation(
        &mut self,
        id: AnnotationId,
        edit: impl FnOnce(&mut Annotation),
    ) -> Result<(), SessionError> {
        let mut annotation = self.live.annotations[self.index_of(id)?].clone();
        edit(&mut annotation);
        annotation.id = id;
        self.commit_annotation(annotation)
    }

    pub fn set_color(&mut self, id: AnnotationId, color: Color) -> Result<(), SessionError> {
        self.edit_annotation(id, |annotation| annotation.set_color(color))
    }

    pub fn set_opacity(&mut self, id: AnnotationId, opacity: f32) -> Result<(), SessionError> {
        self.edit_annotation(id, |annotation| annotation.set_opacity(opacity))
    }

    /// Explicit width/height from a property panel.
    pub fn set_size(
        &mut self,
        id: AnnotationId,
        width: f32,
        height: f32,
    ) -> Result<(), SessionError> {
        self.edit_annotation(id, |annotation| annotation.resize_to(width, height))
    }

    /// Replace the content of a text annotation; other kinds are left as is.
    pub fn set_text(
        &mut self,
        id: AnnotationId,
        content: impl Into<String>,
    ) -> Result<(), SessionError> {
        let content = content.into();
        self.edit_annotation(id, |annotation| {
            if let AnnotationKind::Text(text) = &mut annotation.kind {
                text.text = content;
            }
        })
    }

    pub fn set_font(&mut self, id: AnnotationId, font: FontSpec) -> Result<(), SessionError> {
        self.edit_annotation(id, |annotation| {
            if let AnnotationKind::Text(text) = &mut annotation.kind {
                text.font = font;
            }
        })
    }

    pub fn delete_annotation(&mut self, id: AnnotationId) -> Result<(), SessionError> {
        let index = self.index_of(id)?;
        let mut annotations = self.live.annotations.clone();
        let removed = annotations.remove(index);
        tracing::debug!(%id, kind = removed.kind_name(), "annotation deleted");
        self.push_history(self.live.pages.clone(), annotations);
        Ok(())
    }

    /// Delete the selected annotation; returns whether there was one.
    pub fn delete_selected(&mut self) -> Result<bool, SessionError> {
        match self.selection {
            Some(id) => {
                self.delete_annotation(id)?;
                self.selection = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn select(&mut self, id: Option<AnnotationId>) {
        self.selection = id.filter(|id| self.live.annotation(*id).is_some());
    }

    pub fn selected(&self) -> Option<&Annotation> {
        self.selection.and_then(|id| self.live.annotation(id))
    }

    pub fn selection_style(&self) -> Option<SelectionStyle> {
        self.selected().map(SelectionStyle::of)
    }

    fn index_of(&self, id: AnnotationId) -> Result<usize, SessionError> {
        self.live
            .annotations
            .iter()
            .position(|annotation| annotation.id == id)
            .ok_or(SessionError::UnknownAnnotation(id))
    }

    fn drop_stale_selection(&mut self) {
        if let Some(id) = self.selection {
            if self.live.annotation(id).is_none() {
                self.selection = None;
            }
        }
    }

    // Pages

    /// Insert a blank page after position `after` (0 inserts at the front).
    /// Returns the new page's position.
    pub fn insert_page(&mut self, after: u32) -> Result<u32, SessionError> {
        let page_count = self.page_count();
        if after > page_count {
            return Err(SessionError::PageOutOfRange { page: after, page_count });
        }

        let mut pages = self.live.pages.clone();
        pages.insert(after as usize, EditorPage::blank(self.allocate_page_id()));
        let annotations = self
            .live
            .annotations
            .iter()
            .cloned()
            .map(|mut annotation| {
                if annotation.page > after {
                    annotation.page += 1;
                }
                annotation
            })
            .collect();

        tracing::debug!(after, "blank page inserted");
        self.push_history(pages, annotations);
        Ok(after + 1)
    }

    /// Delete a page and its annotations; later pages move up by one.
    pub fn delete_page(&mut self, page: u32) -> Result<(), SessionError> {
        if self.page_count() <= 1 {
            tracing::warn!(page, "refused to delete the last page");
            return Err(SessionError::LastPage);
        }
        self.check_page(page)?;

        let mut pages = self.live.pages.clone();
        pages.remove(page as usize - 1);
        let annotations = self
            .live
            .annotations
            .iter()
            .filter(|annotation| annotation.page != page)
            .cloned()
            .map(|mut annotation| {
                if annotation.page > page {
                    annotation.page -= 1;
                }
                annotation
            })
            .collect();

        tracing::debug!(page, "page deleted");
        self.push_history(pages, annotations);
        Ok(())
    }

    /// Move the page at `from` to position `to`. Annotations follow their
    /// page's identity.
    pub fn reorder_page(&mut self, from: u32, to: u32) -> Result<(), SessionError> {
        self.check_page(from)?;
        self.check_page(to)?;
        if from == to {
            return Ok(());
        }

        let before: Vec<PageId> = self.live.pages.iter().map(|page| page.id).collect();
        let mut pages = self.live.pages.clone();
        let moved = pages.remove(from as usize - 1);
        pages.insert(to as usize - 1, moved);

        let positions: HashMap<PageId, u32> =
            pages.iter().enumerate().map(|(index, page)| (page.id, index as u32 + 1)).collect();
        let annotations = self
            .live
            .annotations
            .iter()
            .cloned()
            .map(|mut annotation| {
                let id = before[annotation.page as usize - 1];
                annotation.page = positions[&id];
                annotation
            })
            .collect();

        tracing::debug!(from, to, "page reordered");
        self.push_history(pages, annotations);
        Ok(())
    }

    fn check_page(&self, page: u32) -> Result<(), SessionError> {
        let page_count = self.page_count();
        if page == 0 || page > page_count {
            return Err(SessionError::PageOutOfRange { page, page_count });
        }
        Ok(())
    }

    fn allocate_page_id(&mut self) -> PageId {
        let id = PageId(self.next_page_id);
        self.next_page_id += 1;
        id
    }

    // Crop

    /// Crop the crop marker's page to the marker, reload the document and
    /// start a new history baseline. Annotations on the page move with the
    /// crop origin so they stay where they were on screen.
    pub fn apply_crop(&mut self, crop_id: AnnotationId) -> Result<(), SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        let crop = self.live.annotation(crop_id).ok_or(SessionError::UnknownAnnotation(crop_id))?;
        let AnnotationKind::Crop(shape) = &crop.kind else {
            return Err(SessionError::NotACrop(crop_id));
        };
        let page = crop.page;
        let editor_page = self.live.page(page).ok_or(SessionError::PageOutOfRange {
            page,
            page_count: self.live.page_count(),
        })?;
        let Some(source_index) = editor_page.source_index() else {
            tracing::warn!(page, "refused to crop a blank page");
            return Err(SessionError::BlankPageCrop(page));
        };
        let page_size = *document.page_sizes.get(source_index as usize).ok_or(
            PdfEngineError::PageOutOfRange {
                page: source_index,
                page_count: document.page_sizes.len() as u32,
            },
        )?;

        let rect = shape.rect.normalized();
        let min = self.config.min_shape_size;
        if !(rect.width >= min && rect.height >= min) {
            tracing::warn!(page, ?rect, "refused a degenerate crop");
            return Err(SessionError::DegenerateCrop(crop_id));
        }
        let target =
            PageTransform::new(self.scale, page_size, self.rotation).to_document_rect(rect);

        let bytes = write_crop(&mut self.mutator, &document.bytes, source_index, target)?;
        let reloaded = LoadedDocument::open(&mut self.renderer, bytes)?;

        let annotations = self
            .live
            .annotations
            .iter()
            .filter(|annotation| annotation.id != crop_id)
            .cloned()
            .map(|mut annotation| {
                if annotation.page == page {
                    annotation.translate(-rect.x, -rect.y);
                }
                annotation
            })
            .collect();
        let snapshot = HistorySnapshot::new(self.live.pages.clone(), annotations);

        tracing::info!(page, source_index, ?target, "crop applied");
        self.replace_document(reloaded);
        self.reset_history(snapshot);
        Ok(())
    }

    fn replace_document(&mut self, document: LoadedDocument) {
        if let Some(previous) = self.document.replace(document) {
            if let Err(err) = self.renderer.close(previous.handle) {
                tracing::warn!(error = %err, "failed to close previous document");
            }
        }
    }

    // View

    /// Change the zoom scale. Stored geometry is in device pixels, so every
    /// snapshot is rescaled to keep annotations on the same document spot.
    pub fn set_scale(&mut self, scale: f32) -> Result<(), SessionError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(SessionError::InvalidScale(scale));
        }
        let factor = scale / self.scale;
        for snapshot in self.history.iter_mut().chain(std::iter::once(&mut self.live)) {
            for annotation in &mut snapshot.annotations {
                annotation.scale_by(factor);
            }
        }
        self.scale = scale;
        Ok(())
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Unrotated size of the page at `page`, in points.
    pub fn page_size(&self, page: u32) -> Result<Size, SessionError> {
        self.check_page(page)?;
        match self.live.pages[page as usize - 1].source_index() {
            None => Ok(self.config.blank_page_size),
            Some(source_index) => {
                let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
                document.page_sizes.get(source_index as usize).copied().ok_or(
                    SessionError::Engine(PdfEngineError::PageOutOfRange {
                        page: source_index,
                        page_count: document.page_sizes.len() as u32,
                    }),
                )
            }
        }
    }

    pub fn viewport(&self, page: u32) -> Result<Viewport, SessionError> {
        Ok(Viewport::for_page(self.page_size(page)?, self.scale, self.rotation))
    }

    pub fn transform(&self, page: u32) -> Result<PageTransform, SessionError> {
        Ok(PageTransform::new(self.scale, self.page_size(page)?, self.rotation))
    }

    /// Rasterize the page at the current zoom and rotation. Blank pages
    /// render as a white surface of the viewport size.
    pub fn render_page(&self, page: u32) -> Result<RenderedPage, SessionError> {
        let viewport = self.viewport(page)?;
        let Some(source_index) = self.live.pages[page as usize - 1].source_index() else {
            let width_px = viewport.width.round().max(1.0) as u32;
            let height_px = viewport.height.round().max(1.0) as u32;
            let image = RgbaImage::from_pixel(width_px, height_px, Rgba([255, 255, 255, 255]));
            return Ok(RenderedPage { image, width_px, height_px });
        };

        let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        let request = RenderRequest {
            page_index: source_index,
            scale: self.scale,
            rotation: page_rotation(self.rotation),
        };
        Ok(self.renderer.render_page(document.handle, request)?)
    }

    // Export

    /// Assemble the output document from the live state.
    pub fn export_document(&mut self) -> Result<Vec<u8>, SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        let options = ExportOptions {
            scale: self.scale,
            rotation: self.rotation,
            blank_page_size: self.config.blank_page_size,
        };
        Ok(export::export_snapshot(&mut self.mutator, &document.bytes, &self.live, &options)?)
    }
}

impl<R: PdfEngine, M: DocumentMutator> AnnotationStore for EditorSession<R, M> {
    fn annotations_on(&self, page: u32) -> Vec<Annotation> {
        self.live.annotations_on(page).cloned().collect()
    }

    fn selected_id(&self) -> Option<AnnotationId> {
        self.selection
    }

    fn add_annotation(&mut self, annotation: Annotation) -> Result<AnnotationId, SessionError> {
        EditorSession::add_annotation(self, annotation)
    }

    fn update_annotation(&mut self, annotation: Annotation) -> Result<(), SessionError> {
        EditorSession::update_annotation(self, annotation)
    }

    fn commit_annotation(&mut self, annotation: Annotation) -> Result<(), SessionError> {
        EditorSession::commit_annotation(self, annotation)
    }

    fn select(&mut self, id: Option<AnnotationId>) {
        EditorSession::select(self, id)
    }
}

fn page_rotation(rotation: Rotation) -> PageRotation {
    match rotation {
        Rotation::R0 => PageRotation::None,
        Rotation::R90 => PageRotation::Clockwise90,
        Rotation::R180 => PageRotation::Half,
        Rotation::R270 => PageRotation::Clockwise270,
    }
}

/// Set crop and media box of one page and return the new document bytes.
fn write_crop<M: DocumentMutator>(
    mutator: &mut M,
    bytes: &[u8],
    page_index: u32,
    rect: PdfRect,
) -> Result<Vec<u8>, PdfEngineError> {
    let handle = mutator.load_document(bytes)?;
    let result = mutator.page_ref(handle, page_index).and_then(|page| {
        mutator.set_crop_box(page, rect)?;
        mutator.set_media_box(page, rect)?;
        mutator.save(handle)
    });
    if let Err(err) = mutator.close(handle) {
        tracing::debug!(error = %err, "failed to close crop document");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{BoxShape, DashStyle, Point, Rect, Stroke, Tool};
    use pdf_engine::fixtures::sample_pdf;
    use pdf_engine::{
        EllipseParams, FontRef, ImageFormat, ImageParams, ImageRef, LineParams, LopdfEngine,
        LopdfMutator, PageRef, PageSize, PathParams, RectangleParams, StandardFont, TextParams,
    };

    type Session = EditorSession<LopdfEngine, LopdfMutator>;

    fn session(pages: usize) -> Session {
        let sizes = vec![(612.0, 792.0); pages];
        EditorSession::open(
            LopdfEngine::new(),
            LopdfMutator::new(),
            sample_pdf(&sizes),
            EditorConfig::default(),
        )
        .expect("fixture should open")
    }

    fn boxed(kind: fn(BoxShape) -> AnnotationKind, page: u32, rect: Rect) -> Annotation {
        Annotation::new(
            page,
            kind(BoxShape {
                rect,
                fill: None,
                stroke: Stroke::new(Color::RED, 2.0),
                dash: DashStyle::Solid,
            }),
        )
    }

    fn crop_on(page: u32, rect: Rect) -> Annotation {
        boxed(AnnotationKind::Crop, page, rect)
    }

    fn rect_on(page: u32) -> Annotation {
        boxed(AnnotationKind::Rectangle, page, Rect::new(10.0, 10.0, 20.0, 20.0))
    }

    fn pages_of(session: &Session, ids: &[AnnotationId]) -> Vec<u32> {
        ids.iter().map(|id| session.annotation(*id).map_or(0, |a| a.page)).collect()
    }

    fn assert_invariants(session: &Session) {
        let count = session.page_count();
        for annotation in session.annotations() {
            assert!((1..=count).contains(&annotation.page), "{annotation:?}");
        }
        for page in 1..=count {
            let crops = session.snapshot().annotations_on(page).filter(|a| a.is_crop()).count();
            assert!(crops <= 1, "page {page} has {crops} crops");
        }
    }

    #[test]
    fn open_starts_with_one_original_page_per_source_page() {
        let session = session(3);
        assert_eq!(session.page_count(), 3);
        assert_eq!(session.pages()[2].source_index(), Some(2));
        assert_eq!(session.history_len(), 1);
        assert!(!session.can_undo());
        assert!(session.thumbnail(1).is_some());
    }

    #[test]
    fn garbage_bytes_are_a_load_failure() {
        let result = EditorSession::open(
            LopdfEngine::new(),
            LopdfMutator::new(),
            b"%PDF-nope".to_vec(),
            EditorConfig::default(),
        );
        assert!(matches!(result, Err(SessionError::Load(_))));
    }

    #[test]
    fn undo_and_redo_round_trip_a_commit() {
        let mut session = session(1);
        let id = session.add_annotation(rect_on(1)).unwrap();
        let before = session.snapshot().clone();

        let mut moved = session.annotation(id).unwrap().clone();
        moved.move_to(Point::new(100.0, 100.0));
        session.commit_annotation(moved).unwrap();
        let after = session.snapshot().clone();

        assert!(session.undo());
        assert_eq!(session.snapshot(), &before);
        assert!(session.redo());
        assert_eq!(session.snapshot(), &after);
        assert!(!session.redo());
    }

    #[test]
    fn new_action_after_undo_truncates_redo() {
        let mut session = session(1);
        session.add_annotation(rect_on(1)).unwrap();
        session.add_annotation(rect_on(1)).unwrap();
        session.undo();
        assert!(session.can_redo());

        session.add_annotation(rect_on(1)).unwrap();
        assert!(!session.can_redo());
        assert_eq!(session.history_len(), 3);
        assert_eq!(session.annotations().len(), 2);
    }

    #[test]
    fn undo_at_baseline_is_a_no_op() {
        let mut session = session(1);
        assert!(!session.undo());
        assert_eq!(session.history_len(), 1);
    }

    #[test]
    fn transient_updates_do_not_push_history() {
        let mut session = session(1);
        let id = session.add_annotation(rect_on(1)).unwrap();
        let mut frame = session.annotation(id).unwrap().clone();
        frame.resize_to(-40.0, 5.0);

        session.update_annotation(frame.clone()).unwrap();
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.annotation(id), Some(&frame));

        session.commit_annotation(frame).unwrap();
        assert_eq!(session.history_len(), 3);
        assert_eq!(session.annotation(id).unwrap().bounds(), Rect::new(-30.0, 10.0, 40.0, 5.0));
    }

    #[test]
    fn annotations_outside_the_page_range_are_rejected() {
        let mut session = session(2);
        let err = session.add_annotation(rect_on(3)).expect_err("should fail");
        assert!(matches!(err, SessionError::PageOutOfRange { page: 3, page_count: 2 }));
        assert!(session.add_annotation(rect_on(0)).is_err());
        assert_eq!(session.history_len(), 1);
    }

    #[test]
    fn a_second_crop_replaces_the_first() {
        let mut session = session(2);
        let first = session.add_annotation(crop_on(1, Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();
        session.add_annotation(crop_on(2, Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();
        let second = session.add_annotation(crop_on(1, Rect::new(5.0, 5.0, 60.0, 60.0))).unwrap();

        assert!(session.annotation(first).is_none());
        assert!(session.annotation(second).is_some());
        assert_eq!(session.annotations().len(), 2);
        assert_invariants(&session);
    }

    #[test]
    fn deleting_a_page_drops_its_annotations_and_renumbers_later_ones() {
        let mut session = session(3);
        let ids: Vec<_> =
            (1..=3).map(|page| session.add_annotation(rect_on(page)).unwrap()).collect();

        session.delete_page(2).unwrap();

        assert_eq!(session.page_count(), 2);
        assert_eq!(pages_of(&session, &ids), vec![1, 0, 2]);
        assert_invariants(&session);
    }

    #[test]
    fn deleting_the_last_page_is_refused() {
        let mut session = session(1);
        session.add_annotation(rect_on(1)).unwrap();
        let err = session.delete_page(1).expect_err("should refuse");
        assert!(matches!(err, SessionError::LastPage));
        assert_eq!(session.page_count(), 1);
        assert_eq!(session.annotations().len(), 1);
    }

    #[test]
    fn inserting_a_page_shifts_later_annotations() {
        let mut session = session(2);
        let ids: Vec<_> =
            (1..=2).map(|page| session.add_annotation(rect_on(page)).unwrap()).collect();

        assert_eq!(session.insert_page(1).unwrap(), 2);

        assert_eq!(session.page_count(), 3);
        assert!(session.pages()[1].is_blank());
        assert_eq!(pages_of(&session, &ids), vec![1, 3]);
        assert!(session.insert_page(4).is_err());
        assert_invariants(&session);
    }

    #[test]
    fn reordering_remaps_annotations_by_page_identity() {
        let mut session = session(3);
        let page_ids: Vec<PageId> = session.pages().iter().map(|page| page.id).collect();
        let ids: Vec<_> =
            (1..=3).map(|page| session.add_annotation(rect_on(page)).unwrap()).collect();

        // [A, B, C] -> [C, A, B]
        session.reorder_page(3, 1).unwrap();

        let order: Vec<PageId> = session.pages().iter().map(|page| page.id).collect();
        assert_eq!(order, vec![page_ids[2], page_ids[0], page_ids[1]]);
        assert_eq!(pages_of(&session, &ids), vec![2, 3, 1]);
        assert_invariants(&session);

        session.undo();
        assert_eq!(pages_of(&session, &ids), vec![1, 2, 3]);
    }

    #[test]
    fn reorder_with_inserted_blank_page_keeps_identities() {
        let mut session = session(2);
        let on_second = session.add_annotation(rect_on(2)).unwrap();
        session.insert_page(0).unwrap();
        // [blank, A, B] -> [A, B, blank]
        session.reorder_page(1, 3).unwrap();

        assert!(session.pages()[2].is_blank());
        assert_eq!(session.annotation(on_second).unwrap().page, 2);
    }

    #[test]
    fn delete_selected_removes_the_selection() {
        let mut session = session(1);
        let id = session.add_annotation(rect_on(1)).unwrap();
        assert!(!session.delete_selected().unwrap());

        session.select(Some(id));
        assert_eq!(session.selection_style().map(|style| style.kind), Some("rectangle"));
        assert!(session.delete_selected().unwrap());
        assert!(session.annotations().is_empty());
        assert!(session.selected().is_none());

        session.undo();
        assert_eq!(session.annotations().len(), 1);
    }

    #[test]
    fn property_edits_are_single_history_entries() {
        let mut session = session(1);
        let id = session.add_annotation(rect_on(1)).unwrap();
        session.set_color(id, Color::BLUE).unwrap();
        session.set_opacity(id, 0.5).unwrap();

        let style = {
            session.select(Some(id));
            session.selection_style().unwrap()
        };
        assert_eq!(style.color, Color::BLUE);
        assert_eq!(style.opacity, 0.5);
        assert_eq!(session.history_len(), 4);
    }

    #[test]
    fn applying_a_crop_shifts_annotations_by_the_crop_origin() {
        let mut session = session(2);
        let crop_rect = Rect::new(100.0, 150.0, 200.0, 300.0);
        let marker = session.add_annotation(crop_on(1, crop_rect)).unwrap();
        let inside = session
            .add_annotation(boxed(
                AnnotationKind::Rectangle,
                1,
                Rect::new(105.0, 155.0, 10.0, 10.0),
            ))
            .unwrap();
        let other_page = session.add_annotation(rect_on(2)).unwrap();

        session.apply_crop(marker).unwrap();

        assert!(session.annotation(marker).is_none());
        assert_eq!(session.annotation(inside).unwrap().origin(), Point::new(5.0, 5.0));
        assert_eq!(session.annotation(other_page).unwrap().origin(), Point::new(10.0, 10.0));
        assert_eq!(session.page_size(1).unwrap(), Size::new(200.0, 300.0));
        assert_eq!(session.page_size(2).unwrap(), Size::new(612.0, 792.0));
        assert_eq!(session.history_len(), 1);
        assert!(!session.can_undo());
    }

    #[test]
    fn crop_at_zoom_maps_through_the_scale() {
        let mut session = session(1);
        session.set_scale(2.0).unwrap();
        let marker = session.add_annotation(crop_on(1, Rect::new(0.0, 0.0, 400.0, 200.0))).unwrap();

        session.apply_crop(marker).unwrap();

        assert_eq!(session.page_size(1).unwrap(), Size::new(200.0, 100.0));
    }

    #[test]
    fn cropping_a_blank_page_is_refused() {
        let mut session = session(1);
        session.insert_page(1).unwrap();
        let marker = session.add_annotation(crop_on(2, Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();

        let err = session.apply_crop(marker).expect_err("should refuse");
        assert!(matches!(err, SessionError::BlankPageCrop(2)));
        assert!(session.annotation(marker).is_some());
    }

    #[test]
    fn crop_and_export_need_a_document() {
        let mut session =
            EditorSession::new(LopdfEngine::new(), LopdfMutator::new(), EditorConfig::default());
        session.insert_page(0).unwrap();
        let marker = session.add_annotation(crop_on(1, Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();

        assert!(matches!(session.apply_crop(marker), Err(SessionError::NoDocument)));
        assert!(matches!(session.export_document(), Err(SessionError::NoDocument)));
    }

    #[test]
    fn crops_below_the_minimum_shape_size_are_refused() {
        let mut session = session(1);
        let sliver = session.add_annotation(crop_on(1, Rect::new(10.0, 10.0, 200.0, 2.0))).unwrap();
        let bytes = session.document_bytes().map(<[u8]>::to_vec);

        let err = session.apply_crop(sliver).expect_err("should refuse");
        assert!(matches!(err, SessionError::DegenerateCrop(id) if id == sliver));
        assert!(session.annotation(sliver).is_some());
        assert_eq!(session.document_bytes().map(<[u8]>::to_vec), bytes);
        assert_eq!(session.page_size(1).unwrap(), Size::new(612.0, 792.0));

        let inverted = session
            .add_annotation(crop_on(1, Rect::new(50.0, 50.0, -3.0, -40.0)))
            .unwrap();
        assert!(matches!(session.apply_crop(inverted), Err(SessionError::DegenerateCrop(_))));
    }

    #[test]
    fn non_crop_annotations_cannot_be_applied_as_crops() {
        let mut session = session(1);
        let id = session.add_annotation(rect_on(1)).unwrap();
        assert!(matches!(session.apply_crop(id), Err(SessionError::NotACrop(_))));
    }

    /// Mutator whose `save` always fails.
    struct FailingSave(LopdfMutator);

    impl DocumentMutator for FailingSave {
        fn create_document(&mut self) -> Result<DocumentHandle, PdfEngineError> {
            self.0.create_document()
        }
        fn load_document(&mut self, bytes: &[u8]) -> Result<DocumentHandle, PdfEngineError> {
            self.0.load_document(bytes)
        }
        fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
            self.0.page_count(handle)
        }
        fn page_size(
            &self,
            handle: DocumentHandle,
            index: u32,
        ) -> Result<PageSize, PdfEngineError> {
            self.0.page_size(handle, index)
        }
        fn page_ref(&self, handle: DocumentHandle, index: u32) -> Result<PageRef, PdfEngineError> {
            self.0.page_ref(handle, index)
        }
        fn copy_page(
            &mut self,
            target: DocumentHandle,
            source: DocumentHandle,
            index: u32,
        ) -> Result<PageRef, PdfEngineError> {
            self.0.copy_page(target, source, index)
        }
        fn add_blank_page(
            &mut self,
            target: DocumentHandle,
            size: PageSize,
        ) -> Result<PageRef, PdfEngineError> {
            self.0.add_blank_page(target, size)
        }
        fn set_crop_box(&mut self, page: PageRef, rect: PdfRect) -> Result<(), PdfEngineError> {
            self.0.set_crop_box(page, rect)
        }
        fn set_media_box(&mut self, page: PageRef, rect: PdfRect) -> Result<(), PdfEngineError> {
            self.0.set_media_box(page, rect)
        }
        fn embed_font(
            &mut self,
            handle: DocumentHandle,
            font: StandardFont,
        ) -> Result<FontRef, PdfEngineError> {
            self.0.embed_font(handle, font)
        }
        fn embed_image(
            &mut self,
            handle: DocumentHandle,
            bytes: &[u8],
            format: ImageFormat,
        ) -> Result<ImageRef, PdfEngineError> {
            self.0.embed_image(handle, bytes, format)
        }
        fn draw_text(
            &mut self,
            page: PageRef,
            text: &str,
            params: &TextParams,
        ) -> Result<(), PdfEngineError> {
            self.0.draw_text(page, text, params)
        }
        fn draw_rectangle(
            &mut self,
            page: PageRef,
            params: &RectangleParams,
        ) -> Result<(), PdfEngineError> {
            self.0.draw_rectangle(page, params)
        }
        fn draw_ellipse(
            &mut self,
            page: PageRef,
            params: &EllipseParams,
        ) -> Result<(), PdfEngineError> {
            self.0.draw_ellipse(page, params)
        }
        fn draw_line(&mut self, page: PageRef, params: &LineParams) -> Result<(), PdfEngineError> {
            self.0.draw_line(page, params)
        }
        fn draw_path(&mut self, page: PageRef, params: &PathParams) -> Result<(), PdfEngineError> {
            self.0.draw_path(page, params)
        }
        fn draw_image(
            &mut self,
            page: PageRef,
            params: &ImageParams,
        ) -> Result<(), PdfEngineError> {
            self.0.draw_image(page, params)
        }
        fn save(&mut self, _handle: DocumentHandle) -> Result<Vec<u8>, PdfEngineError> {
            Err(PdfEngineError::Backend("disk full".to_owned()))
        }
        fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
            self.0.close(handle)
        }
    }

    #[test]
    fn failed_crop_leaves_the_session_untouched() {
        let mut session = EditorSession::open(
            LopdfEngine::new(),
            FailingSave(LopdfMutator::new()),
            sample_pdf(&[(612.0, 792.0)]),
            EditorConfig::default(),
        )
        .unwrap();
        let marker = session
            .add_annotation(crop_on(1, Rect::new(100.0, 100.0, 50.0, 50.0)))
            .unwrap();
        session.add_annotation(rect_on(1)).unwrap();
        let before = session.snapshot().clone();
        let bytes_before = session.document_bytes().map(<[u8]>::to_vec);

        let err = session.apply_crop(marker).expect_err("save fails");
        assert!(matches!(err, SessionError::Engine(PdfEngineError::Backend(_))));

        assert_eq!(session.snapshot(), &before);
        assert_eq!(session.history_len(), 3);
        assert_eq!(session.document_bytes().map(<[u8]>::to_vec), bytes_before);
        assert!(matches!(session.export_document(), Err(SessionError::Export(_))));
        assert_eq!(session.snapshot(), &before);
    }

    #[test]
    fn export_has_one_page_per_editor_page() {
        let mut session = session(2);
        session.insert_page(2).unwrap();
        session.add_annotation(crop_on(1, Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();

        let bytes = session.export_document().unwrap();

        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn zoom_changes_rescale_every_snapshot() {
        let mut session = session(1);
        let id = session.add_annotation(rect_on(1)).unwrap();
        session.set_color(id, Color::BLUE).unwrap();

        session.set_scale(2.0).unwrap();
        assert_eq!(session.annotation(id).unwrap().bounds(), Rect::new(20.0, 20.0, 40.0, 40.0));

        session.undo();
        assert_eq!(session.annotation(id).unwrap().bounds(), Rect::new(20.0, 20.0, 40.0, 40.0));
        assert_eq!(session.viewport(1).unwrap().width, 1224.0);
        assert!(session.set_scale(0.0).is_err());
    }

    #[test]
    fn blank_pages_render_at_viewport_size() {
        let mut session = session(1);
        session.insert_page(1).unwrap();
        session.set_rotation(Rotation::R90);

        let blank = session.render_page(2).unwrap();
        assert_eq!((blank.width_px, blank.height_px), (842, 595));
        let original = session.render_page(1).unwrap();
        assert_eq!((original.width_px, original.height_px), (792, 612));
    }

    #[test]
    fn gestures_drive_the_session_through_the_store() {
        let mut session = session(1);
        let mut interaction = session.interaction(1);
        interaction.set_tool(Tool::Rectangle);

        interaction.pointer_down(&mut session, Point::new(50.0, 50.0)).unwrap();
        interaction.pointer_move(&mut session, Point::new(30.0, 20.0)).unwrap();
        assert!(session.annotations().is_empty());
        interaction.pointer_up(&mut session).unwrap();

        assert_eq!(session.annotations().len(), 1);
        assert_eq!(session.annotations()[0].bounds(), Rect::new(30.0, 20.0, 20.0, 30.0));

        // Drag it by (+10, +5): one more history entry.
        interaction.set_tool(Tool::Select);
        interaction.pointer_down(&mut session, Point::new(35.0, 25.0)).unwrap();
        interaction.pointer_move(&mut session, Point::new(45.0, 30.0)).unwrap();
        interaction.pointer_up(&mut session).unwrap();

        assert_eq!(session.annotations()[0].origin(), Point::new(40.0, 25.0));
        assert_eq!(session.history_len(), 3);
        session.undo();
        assert_eq!(session.annotations()[0].origin(), Point::new(30.0, 20.0));
        assert_invariants(&session);
    }
}
