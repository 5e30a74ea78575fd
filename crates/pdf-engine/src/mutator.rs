//! Document mutation: assembling output documents, copying pages, editing
//! page boxes and painting vector primitives into page content.
//!
//! Drawing calls are buffered per page and flushed into a new content stream
//! when the document is saved. The page's original content is wrapped in
//! `q … Q` so its graphics state cannot leak into the overlay.

use crate::objects::{self, ObjectCopier};
use crate::{reject_encrypted, DocumentHandle, PageSize, PdfEngineError};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, HashMap};

/// Bezier control distance for quarter ellipses.
const KAPPA: f32 = 0.552_284_8;

/// Prefix for resource names added by the mutator, to stay clear of names
/// already used by copied pages.
const RESOURCE_PREFIX: &str = "Pm";

/// The standard 14 Type1 fonts, minus the symbol sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

impl StandardFont {
    pub fn base_font(self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
            Self::HelveticaOblique => "Helvetica-Oblique",
            Self::HelveticaBoldOblique => "Helvetica-BoldOblique",
            Self::TimesRoman => "Times-Roman",
            Self::TimesBold => "Times-Bold",
            Self::TimesItalic => "Times-Italic",
            Self::TimesBoldItalic => "Times-BoldItalic",
            Self::Courier => "Courier",
            Self::CourierBold => "Courier-Bold",
            Self::CourierOblique => "Courier-Oblique",
            Self::CourierBoldOblique => "Courier-BoldOblique",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

/// Page of a document held by the mutator (0-based index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub document: DocumentHandle,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontRef {
    document: DocumentHandle,
    slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageRef {
    document: DocumentHandle,
    slot: usize,
}

/// RGB with channels in 0.0–1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl PdfColor {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    fn operands(self) -> Vec<Object> {
        vec![self.r.into(), self.g.into(), self.b.into()]
    }
}

/// Rectangle in PDF user space: origin bottom-left, units in points,
/// relative to the page's media box origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PdfRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeParams {
    pub color: PdfColor,
    pub width: f32,
    pub dash: Vec<f32>,
}

impl StrokeParams {
    pub fn solid(color: PdfColor, width: f32) -> Self {
        Self { color, width, dash: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextParams {
    pub x: f32,
    /// Baseline position.
    pub y: f32,
    pub size: f32,
    pub font: FontRef,
    pub color: PdfColor,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectangleParams {
    pub rect: PdfRect,
    pub fill: Option<PdfColor>,
    pub stroke: Option<StrokeParams>,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EllipseParams {
    /// Bounding box of the ellipse.
    pub rect: PdfRect,
    pub fill: Option<PdfColor>,
    pub stroke: Option<StrokeParams>,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineParams {
    pub start: (f32, f32),
    pub end: (f32, f32),
    pub stroke: StrokeParams,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathParams {
    pub points: Vec<(f32, f32)>,
    pub stroke: StrokeParams,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageParams {
    pub rect: PdfRect,
    pub image: ImageRef,
    pub opacity: f32,
}

/// Document mutation contract consumed by crop application and export.
pub trait DocumentMutator {
    /// Start an empty output document.
    fn create_document(&mut self) -> Result<DocumentHandle, PdfEngineError>;
    fn load_document(&mut self, bytes: &[u8]) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(&self, handle: DocumentHandle, index: u32) -> Result<PageSize, PdfEngineError>;
    fn page_ref(&self, handle: DocumentHandle, index: u32) -> Result<PageRef, PdfEngineError>;
    /// Append a copy of `source`'s page `index` to `target`.
    fn copy_page(
        &mut self,
        target: DocumentHandle,
        source: DocumentHandle,
        index: u32,
    ) -> Result<PageRef, PdfEngineError>;
    fn add_blank_page(
        &mut self,
        target: DocumentHandle,
        size: PageSize,
    ) -> Result<PageRef, PdfEngineError>;
    fn set_crop_box(&mut self, page: PageRef, rect: PdfRect) -> Result<(), PdfEngineError>;
    fn set_media_box(&mut self, page: PageRef, rect: PdfRect) -> Result<(), PdfEngineError>;
    fn embed_font(
        &mut self,
        handle: DocumentHandle,
        font: StandardFont,
    ) -> Result<FontRef, PdfEngineError>;
    fn embed_image(
        &mut self,
        handle: DocumentHandle,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<ImageRef, PdfEngineError>;
    fn draw_text(
        &mut self,
        page: PageRef,
        text: &str,
        params: &TextParams,
    ) -> Result<(), PdfEngineError>;
    fn draw_rectangle(
        &mut self,
        page: PageRef,
        params: &RectangleParams,
    ) -> Result<(), PdfEngineError>;
    fn draw_ellipse(&mut self, page: PageRef, params: &EllipseParams)
        -> Result<(), PdfEngineError>;
    fn draw_line(&mut self, page: PageRef, params: &LineParams) -> Result<(), PdfEngineError>;
    fn draw_path(&mut self, page: PageRef, params: &PathParams) -> Result<(), PdfEngineError>;
    fn draw_image(&mut self, page: PageRef, params: &ImageParams) -> Result<(), PdfEngineError>;
    /// Flush pending drawing and serialize the document.
    fn save(&mut self, handle: DocumentHandle) -> Result<Vec<u8>, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

/// Operations and resources queued for one page.
#[derive(Debug, Default)]
struct PageOverlay {
    operations: Vec<Operation>,
    fonts: BTreeMap<String, ObjectId>,
    images: BTreeMap<String, ObjectId>,
    states: BTreeMap<String, ObjectId>,
}

#[derive(Debug)]
struct MutableDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    overlays: HashMap<ObjectId, PageOverlay>,
    fonts: Vec<(StandardFont, ObjectId)>,
    images: Vec<ObjectId>,
    /// Opacity in thousandths -> ExtGState object.
    states: BTreeMap<u32, ObjectId>,
    /// Media box origin as loaded, so box edits stay relative to it.
    origins: HashMap<ObjectId, (f32, f32)>,
}

impl MutableDocument {
    fn new(doc: Document) -> Self {
        let page_ids = doc.get_pages().into_values().collect();
        Self {
            doc,
            page_ids,
            overlays: HashMap::new(),
            fonts: Vec::new(),
            images: Vec::new(),
            states: BTreeMap::new(),
            origins: HashMap::new(),
        }
    }

    fn empty() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        Self::new(doc)
    }

    fn page_id(&self, index: u32) -> Result<ObjectId, PdfEngineError> {
        self.page_ids.get(index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: index,
            page_count: self.page_ids.len() as u32,
        })
    }

    fn origin(&mut self, page_id: ObjectId) -> (f32, f32) {
        let doc = &self.doc;
        *self.origins.entry(page_id).or_insert_with(|| {
            let [x0, y0, _, _] = objects::media_box(doc, page_id);
            (x0, y0)
        })
    }

    fn root_pages_id(&self) -> Result<ObjectId, PdfEngineError> {
        Ok(self.doc.catalog()?.get(b"Pages")?.as_reference()?)
    }

    /// Link `page_id` as the last kid of the root page tree node.
    fn append_page(&mut self, page_id: ObjectId) -> Result<u32, PdfEngineError> {
        let pages_id = self.root_pages_id()?;
        let pages = self.doc.get_object_mut(pages_id)?.as_dict_mut()?;
        let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        pages.get_mut(b"Kids")?.as_array_mut()?.push(Object::Reference(page_id));
        pages.set("Count", count + 1);

        if let Ok(page) = self.doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", Object::Reference(pages_id));
        }

        self.page_ids.push(page_id);
        Ok(self.page_ids.len() as u32 - 1)
    }

    fn graphics_state(&mut self, opacity: f32) -> Option<(String, ObjectId)> {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity >= 1.0 {
            return None;
        }
        let key = (opacity * 1000.0).round() as u32;
        let doc = &mut self.doc;
        let id = *self.states.entry(key).or_insert_with(|| {
            doc.add_object(dictionary! {
                "Type" => "ExtGState",
                "CA" => opacity,
                "ca" => opacity,
            })
        });
        Some((format!("{RESOURCE_PREFIX}Gs{key}"), id))
    }

    /// Merge the overlay's resources into the page and append its content.
    fn flush_overlay(
        &mut self,
        page_id: ObjectId,
        overlay: PageOverlay,
    ) -> Result<(), PdfEngineError> {
        if overlay.operations.is_empty() {
            return Ok(());
        }

        let (origin_x, origin_y) = self.origin(page_id);
        let mut operations = Vec::with_capacity(overlay.operations.len() + 3);
        operations.push(Operation::new("q", vec![]));
        if origin_x != 0.0 || origin_y != 0.0 {
            operations.push(Operation::new(
                "cm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), origin_x.into(), origin_y.into()],
            ));
        }
        operations.extend(overlay.operations);
        operations.push(Operation::new("Q", vec![]));
        let overlay_bytes = Content { operations }.encode()?;

        let page = self.doc.get_dictionary(page_id)?;
        let mut resources = objects::owned_dictionary(&self.doc, page.get(b"Resources").ok());
        for (category, entries) in
            [("Font", &overlay.fonts), ("XObject", &overlay.images), ("ExtGState", &overlay.states)]
        {
            if entries.is_empty() {
                continue;
            }
            let mut sub =
                objects::owned_dictionary(&self.doc, resources.get(category.as_bytes()).ok());
            for (name, id) in entries {
                sub.set(name.as_bytes().to_vec(), Object::Reference(*id));
            }
            resources.set(category, Object::Dictionary(sub));
        }
        let existing = match page.get(b"Contents") {
            Ok(Object::Array(items)) => items.clone(),
            Ok(other) => vec![other.clone()],
            Err(_) => Vec::new(),
        };

        let mut contents = Vec::with_capacity(existing.len() + 3);
        if !existing.is_empty() {
            let save = self.doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
            let restore = self.doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
            contents.push(Object::Reference(save));
            contents.extend(existing);
            contents.push(Object::Reference(restore));
        }
        let overlay_id = self.doc.add_object(Stream::new(dictionary! {}, overlay_bytes));
        contents.push(Object::Reference(overlay_id));

        let page = self.doc.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));
        Ok(())
    }
}

/// [`DocumentMutator`] over in-memory `lopdf` documents.
#[derive(Debug, Default)]
pub struct LopdfMutator {
    next_handle: u64,
    docs: HashMap<DocumentHandle, MutableDocument>,
}

impl LopdfMutator {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, document: MutableDocument) -> DocumentHandle {
        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, document);
        handle
    }

    fn document(&self, handle: DocumentHandle) -> Result<&MutableDocument, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    fn document_mut(
        &mut self,
        handle: DocumentHandle,
    ) -> Result<&mut MutableDocument, PdfEngineError> {
        self.docs.get_mut(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    fn overlay(&mut self, page: PageRef) -> Result<&mut PageOverlay, PdfEngineError> {
        let document = self.document_mut(page.document)?;
        let page_id = document.page_id(page.index)?;
        Ok(document.overlays.entry(page_id).or_default())
    }

    /// Queue `body` on the page, wrapped in `q … Q` with the opacity state.
    fn paint(
        &mut self,
        page: PageRef,
        opacity: f32,
        body: Vec<Operation>,
    ) -> Result<(), PdfEngineError> {
        let state = self.document_mut(page.document)?.graphics_state(opacity);
        let overlay = self.overlay(page)?;
        overlay.operations.push(Operation::new("q", vec![]));
        if let Some((name, id)) = state {
            let operand = Object::Name(name.clone().into_bytes());
            overlay.operations.push(Operation::new("gs", vec![operand]));
            overlay.states.insert(name, id);
        }
        overlay.operations.extend(body);
        overlay.operations.push(Operation::new("Q", vec![]));
        Ok(())
    }

    fn set_box(&mut self, page: PageRef, key: &str, rect: PdfRect) -> Result<(), PdfEngineError> {
        let document = self.document_mut(page.document)?;
        let page_id = document.page_id(page.index)?;
        let (origin_x, origin_y) = document.origin(page_id);
        let values = [
            origin_x + rect.x,
            origin_y + rect.y,
            origin_x + rect.x + rect.width,
            origin_y + rect.y + rect.height,
        ];
        document.doc.get_object_mut(page_id)?.as_dict_mut()?.set(key, objects::box_object(values));
        tracing::debug!(page = page.index, key, ?values, "updated page box");
        Ok(())
    }

    fn embed_png(doc: &mut Document, bytes: &[u8]) -> Result<ObjectId, PdfEngineError> {
        let decoded = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        if alpha.iter().any(|&value| value < u8::MAX) {
            let mask = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            ));
            dict.set("SMask", Object::Reference(mask));
        }
        Ok(doc.add_object(Stream::new(dict, rgb)))
    }

    fn embed_jpeg(doc: &mut Document, bytes: &[u8]) -> Result<ObjectId, PdfEngineError> {
        let decoded = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)?;
        let color_space = match decoded.color().channel_count() {
            1 => "DeviceGray",
            _ => "DeviceRGB",
        };
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => decoded.width(),
                "Height" => decoded.height(),
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            bytes.to_vec(),
        );
        Ok(doc.add_object(stream))
    }
}

fn stroke_operations(stroke: &StrokeParams) -> Vec<Operation> {
    let dash: Vec<Object> = stroke.dash.iter().map(|&value| value.into()).collect();
    vec![
        Operation::new("RG", stroke.color.operands()),
        Operation::new("w", vec![stroke.width.into()]),
        Operation::new("d", vec![Object::Array(dash), 0.into()]),
    ]
}

/// Paint operator for a path given which of fill/stroke apply.
fn paint_operator(fill: bool, stroke: bool, close: bool) -> &'static str {
    match (fill, stroke, close) {
        (true, true, false) => "B",
        (true, true, true) => "b",
        (true, false, _) => "f",
        (false, true, false) => "S",
        (false, true, true) => "s",
        (false, false, _) => "n",
    }
}

fn ellipse_path(rect: PdfRect) -> Vec<Operation> {
    let rx = rect.width / 2.0;
    let ry = rect.height / 2.0;
    let cx = rect.x + rx;
    let cy = rect.y + ry;
    let kx = rx * KAPPA;
    let ky = ry * KAPPA;
    let curve =
        |values: [f32; 6]| Operation::new("c", values.into_iter().map(Object::Real).collect());
    vec![
        Operation::new("m", vec![(cx + rx).into(), cy.into()]),
        curve([cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry]),
        curve([cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy]),
        curve([cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry]),
        curve([cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy]),
    ]
}

/// Encode text for a WinAnsi simple font; unmappable characters become `?`.
fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u8,
            0x2013 => 0x96,
            0x2014 => 0x97,
            0x2018 => 0x91,
            0x2019 => 0x92,
            0x201c => 0x93,
            0x201d => 0x94,
            0x2022 => 0x95,
            0x2026 => 0x85,
            0x20ac => 0x80,
            _ => b'?',
        })
        .collect()
}

impl DocumentMutator for LopdfMutator {
    fn create_document(&mut self) -> Result<DocumentHandle, PdfEngineError> {
        Ok(self.insert(MutableDocument::empty()))
    }

    fn load_document(&mut self, bytes: &[u8]) -> Result<DocumentHandle, PdfEngineError> {
        reject_encrypted(bytes)?;
        let doc = Document::load_mem(bytes)?;
        let document = MutableDocument::new(doc);
        if document.page_ids.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }
        Ok(self.insert(document))
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.document(handle)?.page_ids.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, index: u32) -> Result<PageSize, PdfEngineError> {
        let document = self.document(handle)?;
        let [x0, y0, x1, y1] = objects::media_box(&document.doc, document.page_id(index)?);
        Ok(PageSize { width_pt: x1 - x0, height_pt: y1 - y0 })
    }

    fn page_ref(&self, handle: DocumentHandle, index: u32) -> Result<PageRef, PdfEngineError> {
        self.document(handle)?.page_id(index)?;
        Ok(PageRef { document: handle, index })
    }

    fn copy_page(
        &mut self,
        target: DocumentHandle,
        source: DocumentHandle,
        index: u32,
    ) -> Result<PageRef, PdfEngineError> {
        if target == source {
            return Err(PdfEngineError::Backend(
                "cannot copy a page into its own document".to_owned(),
            ));
        }
        let source_page = self.document(source)?.page_id(index)?;
        let mut output =
            self.docs.remove(&target).ok_or(PdfEngineError::InvalidHandle(target.raw()))?;

        let copied = match self.docs.get(&source) {
            Some(document) => {
                let page_id =
                    ObjectCopier::new(&document.doc, &mut output.doc).copy_page(source_page);
                match page_id {
                    Ok(page_id) => output.append_page(page_id),
                    Err(err) => Err(err.into()),
                }
            }
            None => Err(PdfEngineError::InvalidHandle(source.raw())),
        };
        self.docs.insert(target, output);

        Ok(PageRef { document: target, index: copied? })
    }

    fn add_blank_page(
        &mut self,
        target: DocumentHandle,
        size: PageSize,
    ) -> Result<PageRef, PdfEngineError> {
        let document = self.document_mut(target)?;
        let page_id = document.doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => objects::box_object([0.0, 0.0, size.width_pt, size.height_pt]),
            "Resources" => Dictionary::new(),
        });
        let index = document.append_page(page_id)?;
        Ok(PageRef { document: target, index })
    }

    fn set_crop_box(&mut self, page: PageRef, rect: PdfRect) -> Result<(), PdfEngineError> {
        self.set_box(page, "CropBox", rect)
    }

    fn set_media_box(&mut self, page: PageRef, rect: PdfRect) -> Result<(), PdfEngineError> {
        self.set_box(page, "MediaBox", rect)
    }

    fn embed_font(
        &mut self,
        handle: DocumentHandle,
        font: StandardFont,
    ) -> Result<FontRef, PdfEngineError> {
        let document = self.document_mut(handle)?;
        if let Some(slot) = document.fonts.iter().position(|(embedded, _)| *embedded == font) {
            return Ok(FontRef { document: handle, slot });
        }
        let id = document.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        document.fonts.push((font, id));
        Ok(FontRef { document: handle, slot: document.fonts.len() - 1 })
    }

    fn embed_image(
        &mut self,
        handle: DocumentHandle,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<ImageRef, PdfEngineError> {
        let document = self.document_mut(handle)?;
        let id = match format {
            ImageFormat::Png => Self::embed_png(&mut document.doc, bytes)?,
            ImageFormat::Jpeg => Self::embed_jpeg(&mut document.doc, bytes)?,
        };
        document.images.push(id);
        Ok(ImageRef { document: handle, slot: document.images.len() - 1 })
    }

    fn draw_text(
        &mut self,
        page: PageRef,
        text: &str,
        params: &TextParams,
    ) -> Result<(), PdfEngineError> {
        if params.font.document != page.document {
            return Err(PdfEngineError::ForeignReference {
                kind: "font",
                handle: page.document.raw(),
            });
        }
        let (_, font_id) = self.document(page.document)?.fonts[params.font.slot];
        let name = format!("{RESOURCE_PREFIX}F{}", params.font.slot + 1);

        let body = vec![
            Operation::new("rg", params.color.operands()),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(name.clone().into_bytes()), params.size.into()]),
            Operation::new("Td", vec![params.x.into(), params.y.into()]),
            Operation::new("Tj", vec![Object::String(to_win_ansi(text), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ];
        self.paint(page, params.opacity, body)?;
        self.overlay(page)?.fonts.insert(name, font_id);
        Ok(())
    }

    fn draw_rectangle(
        &mut self,
        page: PageRef,
        params: &RectangleParams,
    ) -> Result<(), PdfEngineError> {
        let mut body = Vec::new();
        if let Some(fill) = params.fill {
            body.push(Operation::new("rg", fill.operands()));
        }
        if let Some(stroke) = &params.stroke {
            body.extend(stroke_operations(stroke));
        }
        let PdfRect { x, y, width, height } = params.rect;
        body.push(Operation::new("re", vec![x.into(), y.into(), width.into(), height.into()]));
        body.push(Operation::new(
            paint_operator(params.fill.is_some(), params.stroke.is_some(), false),
            vec![],
        ));
        self.paint(page, params.opacity, body)
    }

    fn draw_ellipse(
        &mut self,
        page: PageRef,
        params: &EllipseParams,
    ) -> Result<(), PdfEngineError> {
        let mut body = Vec::new();
        if let Some(fill) = params.fill {
            body.push(Operation::new("rg", fill.operands()));
        }
        if let Some(stroke) = &params.stroke {
            body.extend(stroke_operations(stroke));
        }
        body.extend(ellipse_path(params.rect));
        body.push(Operation::new(
            paint_operator(params.fill.is_some(), params.stroke.is_some(), true),
            vec![],
        ));
        self.paint(page, params.opacity, body)
    }

    fn draw_line(&mut self, page: PageRef, params: &LineParams) -> Result<(), PdfEngineError> {
        let mut body = stroke_operations(&params.stroke);
        body.push(Operation::new("J", vec![1.into()]));
        body.push(Operation::new("m", vec![params.start.0.into(), params.start.1.into()]));
        body.push(Operation::new("l", vec![params.end.0.into(), params.end.1.into()]));
        body.push(Operation::new("S", vec![]));
        self.paint(page, params.opacity, body)
    }

    fn draw_path(&mut self, page: PageRef, params: &PathParams) -> Result<(), PdfEngineError> {
        let [first, rest @ ..] = params.points.as_slice() else {
            return Ok(());
        };
        if rest.is_empty() {
            return Ok(());
        }
        let mut body = stroke_operations(&params.stroke);
        body.push(Operation::new("J", vec![1.into()]));
        body.push(Operation::new("j", vec![1.into()]));
        body.push(Operation::new("m", vec![first.0.into(), first.1.into()]));
        for (x, y) in rest {
            body.push(Operation::new("l", vec![(*x).into(), (*y).into()]));
        }
        body.push(Operation::new("S", vec![]));
        self.paint(page, params.opacity, body)
    }

    fn draw_image(&mut self, page: PageRef, params: &ImageParams) -> Result<(), PdfEngineError> {
        if params.image.document != page.document {
            return Err(PdfEngineError::ForeignReference {
                kind: "image",
                handle: page.document.raw(),
            });
        }
        let image_id = self.document(page.document)?.images[params.image.slot];
        let name = format!("{RESOURCE_PREFIX}Im{}", params.image.slot + 1);
        let PdfRect { x, y, width, height } = params.rect;

        let body = vec![
            Operation::new(
                "cm",
                vec![width.into(), 0.into(), 0.into(), height.into(), x.into(), y.into()],
            ),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
        ];
        self.paint(page, params.opacity, body)?;
        self.overlay(page)?.images.insert(name, image_id);
        Ok(())
    }

    fn save(&mut self, handle: DocumentHandle) -> Result<Vec<u8>, PdfEngineError> {
        let document = self.document_mut(handle)?;
        let overlays = std::mem::take(&mut document.overlays);
        for (page_id, overlay) in overlays {
            document.flush_overlay(page_id, overlay)?;
        }

        let mut bytes = Vec::new();
        document.doc.save_to(&mut bytes)?;
        tracing::debug!(handle = handle.raw(), bytes = bytes.len(), "saved document");
        Ok(bytes)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}
