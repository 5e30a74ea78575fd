//! Export pipeline
//!
//! Assembles a new document from the editor page sequence and composites
//! every annotation into page content as vector primitives. Editor geometry
//! is mapped through [`PageTransform`], so every length is divided by the
//! zoom scale and the output does not depend on the zoom it was edited at.

use crate::fonts;
use crate::transform::PageTransform;
use doc_model::{
    Annotation, AnnotationKind, BoxShape, Color, HistorySnapshot, ImageMime, PageKind, Rotation,
    Size, StampKind, Stroke, TextBox,
};
use pdf_engine::{
    DocumentHandle, DocumentMutator, EllipseParams, ImageFormat, ImageParams, LineParams,
    PageRef, PageSize, PathParams, PdfColor, PdfEngineError, PdfRect, RectangleParams,
    StrokeParams, TextParams,
};

/// View state the annotations were authored in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    pub scale: f32,
    pub rotation: Rotation,
    /// Size of blank pages, in points.
    pub blank_page_size: Size,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("page {page} references missing source page {source_index} (page_count={page_count})")]
    MissingSourcePage { page: u32, source_index: u32, page_count: u32 },
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
}

/// Render `snapshot` over the source document `source` and return the bytes
/// of the new document. Nothing is returned unless every page and annotation
/// was processed.
pub fn export_snapshot<M: DocumentMutator>(
    mutator: &mut M,
    source: &[u8],
    snapshot: &HistorySnapshot,
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError> {
    let source_handle = mutator.load_document(source)?;
    let output = match mutator.create_document() {
        Ok(handle) => handle,
        Err(err) => {
            release(mutator, source_handle);
            return Err(err.into());
        }
    };

    let result = assemble(mutator, source_handle, output, snapshot, options)
        .and_then(|()| mutator.save(output).map_err(ExportError::from));
    release(mutator, output);
    release(mutator, source_handle);

    match &result {
        Ok(bytes) => tracing::info!(
            pages = snapshot.page_count(),
            annotations = snapshot.annotations.len(),
            bytes = bytes.len(),
            "exported document"
        ),
        Err(err) => tracing::warn!(error = %err, "export aborted"),
    }
    result
}

fn release<M: DocumentMutator>(mutator: &mut M, handle: DocumentHandle) {
    if let Err(err) = mutator.close(handle) {
        tracing::debug!(handle = handle.raw(), error = %err, "failed to close document");
    }
}

fn assemble<M: DocumentMutator>(
    mutator: &mut M,
    source: DocumentHandle,
    output: DocumentHandle,
    snapshot: &HistorySnapshot,
    options: &ExportOptions,
) -> Result<(), ExportError> {
    let source_pages = mutator.page_count(source)?;

    for (index, editor_page) in snapshot.pages.iter().enumerate() {
        let page_number = index as u32 + 1;
        let (page, page_size) = match editor_page.kind {
            PageKind::Original { source_index } => {
                if source_index >= source_pages {
                    return Err(ExportError::MissingSourcePage {
                        page: page_number,
                        source_index,
                        page_count: source_pages,
                    });
                }
                let size = mutator.page_size(source, source_index)?;
                (mutator.copy_page(output, source, source_index)?, size)
            }
            PageKind::Blank => {
                let size = PageSize {
                    width_pt: options.blank_page_size.width,
                    height_pt: options.blank_page_size.height,
                };
                (mutator.add_blank_page(output, size)?, size)
            }
        };

        let transform = PageTransform::new(
            options.scale,
            Size::new(page_size.width_pt, page_size.height_pt),
            options.rotation,
        );
        let mut painter = PagePainter { mutator: &mut *mutator, page, transform };
        for annotation in snapshot.annotations_on(page_number) {
            painter.draw(annotation)?;
        }
    }

    Ok(())
}

fn pdf_color(color: Color) -> PdfColor {
    let (r, g, b) = color.to_normalized();
    PdfColor::new(r, g, b)
}

/// Emits the primitives of one annotation onto one output page.
struct PagePainter<'a, M: DocumentMutator> {
    mutator: &'a mut M,
    page: PageRef,
    transform: PageTransform,
}

impl<M: DocumentMutator> PagePainter<'_, M> {
    fn draw(&mut self, annotation: &Annotation) -> Result<(), PdfEngineError> {
        let opacity = annotation.opacity;
        match &annotation.kind {
            AnnotationKind::Crop(_) => Ok(()),
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Highlight(shape)
            | AnnotationKind::Whiteout(shape) => self.draw_box(shape, opacity),
            AnnotationKind::Circle(ellipse) => {
                let Some(stroke) = self.stroke(&ellipse.stroke, Vec::new()) else {
                    return Ok(());
                };
                let params = EllipseParams {
                    rect: self.transform.to_document_rect(ellipse.rect),
                    fill: None,
                    stroke: Some(stroke),
                    opacity,
                };
                self.mutator.draw_ellipse(self.page, &params)
            }
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                let Some(stroke) = self.stroke(&segment.stroke, Vec::new()) else {
                    return Ok(());
                };
                self.line(segment.start, segment.end, stroke, opacity)
            }
            AnnotationKind::FreehandPath(path) => {
                if path.points.len() < 2 {
                    return Ok(());
                }
                let Some(stroke) = self.stroke(&path.stroke, Vec::new()) else {
                    return Ok(());
                };
                let points = path
                    .points
                    .iter()
                    .map(|point| {
                        let mapped = self.transform.to_document(*point);
                        (mapped.x, mapped.y)
                    })
                    .collect();
                self.mutator.draw_path(self.page, &PathParams { points, stroke, opacity })
            }
            AnnotationKind::Text(text) => self.draw_text(text, opacity),
            AnnotationKind::Image(image) => {
                let format = match image.mime {
                    ImageMime::Png => ImageFormat::Png,
                    ImageMime::Jpeg => ImageFormat::Jpeg,
                };
                let image_ref = self.mutator.embed_image(self.page.document, &image.data, format)?;
                let params = ImageParams {
                    rect: self.transform.to_document_rect(image.rect),
                    image: image_ref,
                    opacity,
                };
                self.mutator.draw_image(self.page, &params)
            }
            AnnotationKind::Stamp(stamp) => match stamp.kind {
                StampKind::Dot => {
                    let params = EllipseParams {
                        rect: self.transform.to_document_rect(stamp.rect),
                        fill: Some(pdf_color(stamp.color)),
                        stroke: None,
                        opacity,
                    };
                    self.mutator.draw_ellipse(self.page, &params)
                }
                StampKind::Check | StampKind::Cross => {
                    let stroke = StrokeParams::solid(
                        pdf_color(stamp.color),
                        self.transform.length(stamp.line_width()),
                    );
                    for (start, end) in stamp.strokes() {
                        self.line(start, end, stroke.clone(), opacity)?;
                    }
                    Ok(())
                }
            },
        }
    }

    /// Stroke in document units, or `None` when it paints nothing.
    fn stroke(&self, stroke: &Stroke, dash: Vec<f32>) -> Option<StrokeParams> {
        if stroke.width <= 0.0 {
            return None;
        }
        Some(StrokeParams {
            color: pdf_color(stroke.color),
            width: self.transform.length(stroke.width),
            dash: dash.into_iter().map(|value| self.transform.length(value)).collect(),
        })
    }

    fn line(
        &mut self,
        start: doc_model::Point,
        end: doc_model::Point,
        stroke: StrokeParams,
        opacity: f32,
    ) -> Result<(), PdfEngineError> {
        let start = self.transform.to_document(start);
        let end = self.transform.to_document(end);
        let params = LineParams { start: (start.x, start.y), end: (end.x, end.y), stroke, opacity };
        self.mutator.draw_line(self.page, &params)
    }

    fn draw_box(&mut self, shape: &BoxShape, opacity: f32) -> Result<(), PdfEngineError> {
        let stroke = self.stroke(&shape.stroke, shape.dash.pattern(shape.stroke.width));
        if shape.fill.is_none() && stroke.is_none() {
            return Ok(());
        }
        let params = RectangleParams {
            rect: self.transform.to_document_rect(shape.rect),
            fill: shape.fill.map(pdf_color),
            stroke,
            opacity,
        };
        self.mutator.draw_rectangle(self.page, &params)
    }

    /// Text baseline sits one font size below the anchor. The background is
    /// painted first and framed by the font's metrics plus padding.
    fn draw_text(&mut self, text: &TextBox, opacity: f32) -> Result<(), PdfEngineError> {
        let font = fonts::resolve_font(&text.font.family, text.font.bold, text.font.italic);
        let size = self.transform.length(text.font.size);
        let anchor = self.transform.to_document(text.origin);
        let baseline = anchor.y - size;

        if let Some(background) = &text.background {
            let padding = self.transform.length(background.padding);
            let width = fonts::text_width(font, &text.text, size)
                .max(self.transform.length(background.min_width));
            let params = RectangleParams {
                rect: PdfRect::new(
                    anchor.x - padding,
                    baseline + fonts::descent(font, size) - padding,
                    width + 2.0 * padding,
                    fonts::line_height(font, size) + 2.0 * padding,
                ),
                fill: Some(pdf_color(background.color)),
                stroke: None,
                opacity,
            };
            self.mutator.draw_rectangle(self.page, &params)?;
        }

        if text.text.is_empty() {
            return Ok(());
        }
        let font_ref = self.mutator.embed_font(self.page.document, font)?;
        let params = TextParams {
            x: anchor.x,
            y: baseline,
            size,
            font: font_ref,
            color: pdf_color(text.color),
            opacity,
        };
        self.mutator.draw_text(self.page, &text.text, &params)
    }
}
