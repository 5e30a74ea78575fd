//! Editor value types
//!
//! Pages, annotations, history snapshots and viewports shared by the
//! interaction layer, the session controller and the export pipeline.
//! All geometry stored here is in editor space: device pixels at the active
//! zoom scale, origin at the top-left of the page.

mod annotation;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, BoxShape, DashStyle, EllipseShape, FontSpec,
    Freehand, ImageBox, ImageMime, Segment, StampKind, StampShape, Stroke, TextBackground,
    TextBox, HIGHLIGHT_OPACITY,
};

use serde::{Deserialize, Serialize};

/// Size of a freshly inserted blank page, in points (A4 at 72 DPI).
pub const BLANK_PAGE_SIZE: Size = Size { width: 595.0, height: 842.0 };

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle anchored at its top-left corner.
///
/// Width and height may be negative while a drag is in progress; stored
/// state always goes through [`Rect::normalized`] first.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning two arbitrary corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x - a.x, b.y - a.y).normalized()
    }

    /// Square of `side` centered on `center`.
    pub fn centered(center: Point, side: f32) -> Self {
        Self::new(center.x - side / 2.0, center.y - side / 2.0, side, side)
    }

    /// Flip negative extents so width/height are non-negative, moving the
    /// origin to keep the covered area unchanged.
    pub fn normalized(&self) -> Self {
        let (x, width) = if self.width < 0.0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0.0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        Self { x, y, width, height }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn bottom_right(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: &Point, tolerance: f32) -> bool {
        let rect = self.normalized();
        point.x >= rect.x - tolerance
            && point.x <= rect.x + rect.width + tolerance
            && point.y >= rect.y - tolerance
            && point.y <= rect.y + rect.height + tolerance
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..*self }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseColorError {
    #[error("color must be written as #rrggbb, got {0:?}")]
    Format(String),
}

/// Opaque RGB color; opacity lives on the annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0 };
    pub const GREEN: Color = Color { r: 0, g: 160, b: 0 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255 };
    pub const YELLOW: Color = Color { r: 255, g: 235, b: 59 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(value: &str) -> Result<Self, ParseColorError> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ParseColorError::Format(value.to_owned()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| ParseColorError::Format(value.to_owned()))
        };
        Ok(Self { r: channel(0..2)?, g: channel(2..4)?, b: channel(4..6)? })
    }

    /// Channels in the 0.0–1.0 range.
    pub fn to_normalized(&self) -> (f32, f32, f32) {
        (self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0)
    }
}

/// Stable page identity, independent of the page's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageKind {
    /// A page of the loaded source document (0-based index).
    Original { source_index: u32 },
    /// A freshly inserted page of [`BLANK_PAGE_SIZE`].
    Blank,
}

/// One slot in the output page sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorPage {
    pub id: PageId,
    pub kind: PageKind,
}

impl EditorPage {
    pub fn original(id: PageId, source_index: u32) -> Self {
        Self { id, kind: PageKind::Original { source_index } }
    }

    pub fn blank(id: PageId) -> Self {
        Self { id, kind: PageKind::Blank }
    }

    pub fn source_index(&self) -> Option<u32> {
        match self.kind {
            PageKind::Original { source_index } => Some(source_index),
            PageKind::Blank => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self.kind, PageKind::Blank)
    }
}

/// Immutable `(pages, annotations)` pair; the unit of undo/redo.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub pages: Vec<EditorPage>,
    pub annotations: Vec<Annotation>,
}

impl HistorySnapshot {
    pub fn new(pages: Vec<EditorPage>, annotations: Vec<Annotation>) -> Self {
        Self { pages, annotations }
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Annotations owned by a 1-based page position, in paint order.
    pub fn annotations_on(&self, page: u32) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |annotation| annotation.page == page)
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.id == id)
    }

    /// Editor page at a 1-based position.
    pub fn page(&self, page: u32) -> Option<&EditorPage> {
        page.checked_sub(1).and_then(|index| self.pages.get(index as usize))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::R0),
            90 => Some(Self::R90),
            180 => Some(Self::R180),
            270 => Some(Self::R270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::R0 => 0,
            Self::R90 => 90,
            Self::R180 => 180,
            Self::R270 => 270,
        }
    }

    /// Whether the rotated page swaps its width and height on screen.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Self::R90 | Self::R270)
    }
}

/// Pixel-space rendering description of one page at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
    pub rotation: Rotation,
}

impl Viewport {
    /// Viewport for a page of `page_size` points.
    pub fn for_page(page_size: Size, scale: f32, rotation: Rotation) -> Self {
        let (width, height) = if rotation.is_quarter_turn() {
            (page_size.height, page_size.width)
        } else {
            (page_size.width, page_size.height)
        };
        Self { width: width * scale, height: height * scale, scale, rotation }
    }
}

/// Active editing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Select,
    Rectangle,
    Circle,
    Line,
    Arrow,
    Highlight,
    Whiteout,
    EditText,
    Crop,
    Pen,
    Text,
    Check,
    Cross,
    Dot,
}

/// Shapes created by dragging out a box or a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeTool {
    Rectangle,
    Circle,
    Line,
    Arrow,
    Highlight,
    Whiteout,
    EditText,
    Crop,
}

/// How a tool turns a pointer gesture into an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Select, drag or resize any annotation.
    Select,
    /// Select, drag or resize the page's crop marker, else draw a new one.
    CropSelect,
    /// Commit a fixed-size stamp on pointer-down.
    Stamp(StampKind),
    /// Place a placeholder text on pointer-down.
    PlaceText,
    /// Drag out a shape.
    DrawShape(ShapeTool),
    /// Collect a freehand point list.
    DrawPath,
}

impl Tool {
    pub fn gesture(self) -> Gesture {
        match self {
            Tool::Select => Gesture::Select,
            Tool::Crop => Gesture::CropSelect,
            Tool::Check => Gesture::Stamp(StampKind::Check),
            Tool::Cross => Gesture::Stamp(StampKind::Cross),
            Tool::Dot => Gesture::Stamp(StampKind::Dot),
            Tool::Text => Gesture::PlaceText,
            Tool::Pen => Gesture::DrawPath,
            Tool::Rectangle => Gesture::DrawShape(ShapeTool::Rectangle),
            Tool::Circle => Gesture::DrawShape(ShapeTool::Circle),
            Tool::Line => Gesture::DrawShape(ShapeTool::Line),
            Tool::Arrow => Gesture::DrawShape(ShapeTool::Arrow),
            Tool::Highlight => Gesture::DrawShape(ShapeTool::Highlight),
            Tool::Whiteout => Gesture::DrawShape(ShapeTool::Whiteout),
            Tool::EditText => Gesture::DrawShape(ShapeTool::EditText),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_rect_flips_negative_extents() {
        let rect = Rect::new(50.0, 50.0, -20.0, -30.0).normalized();
        assert_eq!(rect, Rect::new(30.0, 20.0, 20.0, 30.0));
    }

    #[test]
    fn from_corners_is_order_independent() {
        let a = Rect::from_corners(Point::new(10.0, 40.0), Point::new(30.0, 5.0));
        let b = Rect::from_corners(Point::new(30.0, 5.0), Point::new(10.0, 40.0));
        assert_eq!(a, b);
        assert_eq!(a, Rect::new(10.0, 5.0, 20.0, 35.0));
    }

    #[test]
    fn color_parses_hex() {
        assert_eq!(Color::from_hex("#ff8000"), Ok(Color::rgb(255, 128, 0)));
        assert_eq!(Color::from_hex("00ff00"), Ok(Color::rgb(0, 255, 0)));
        assert!(Color::from_hex("#fff").is_err());
        assert!(Color::from_hex("#gg0000").is_err());
    }

    #[test]
    fn viewport_swaps_dimensions_for_quarter_turns() {
        let size = Size::new(600.0, 800.0);
        let upright = Viewport::for_page(size, 2.0, Rotation::R0);
        assert_eq!((upright.width, upright.height), (1200.0, 1600.0));

        let turned = Viewport::for_page(size, 2.0, Rotation::R90);
        assert_eq!((turned.width, turned.height), (1600.0, 1200.0));
    }

    #[test]
    fn rotation_from_degrees_wraps() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::R270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::R90));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn every_tool_maps_to_a_gesture() {
        assert_eq!(Tool::Check.gesture(), Gesture::Stamp(StampKind::Check));
        assert_eq!(Tool::Crop.gesture(), Gesture::CropSelect);
        assert_eq!(Tool::EditText.gesture(), Gesture::DrawShape(ShapeTool::EditText));
        assert_eq!(Tool::Pen.gesture(), Gesture::DrawPath);
    }

    #[test]
    fn snapshot_page_lookup_is_one_based() {
        let snapshot = HistorySnapshot::new(
            vec![EditorPage::original(PageId(1), 0), EditorPage::blank(PageId(2))],
            Vec::new(),
        );
        assert_eq!(snapshot.page(0), None);
        assert_eq!(snapshot.page(2).map(EditorPage::is_blank), Some(true));
        assert_eq!(snapshot.page(3), None);
    }

    #[test]
    fn page_kind_serializes_with_tag() {
        let json = serde_json::to_string(&EditorPage::original(PageId(7), 3)).unwrap();
        assert_eq!(json, r#"{"id":7,"kind":{"kind":"original","source_index":3}}"#);
    }
}
