//! Annotation data model
//!
//! One sum type covers every overlay object. The interaction layer, the
//! session and the exporter all switch exhaustively on [`AnnotationKind`].

use crate::{Color, Point, Rect, Size};
use serde::{Deserialize, Serialize};

/// Unique identifier for an annotation (UUID v4).
pub type AnnotationId = uuid::Uuid;

/// Default opacity of highlighter boxes.
pub const HIGHLIGHT_OPACITY: f32 = 0.4;

const MIN_OPACITY: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

impl Stroke {
    pub fn new(color: Color, width: f32) -> Self {
        Self { color, width }
    }

    /// A stroke that paints nothing.
    pub fn none() -> Self {
        Self { color: Color::BLACK, width: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl DashStyle {
    /// Dash array in multiples of the stroke width; empty means solid.
    pub fn pattern(self, stroke_width: f32) -> Vec<f32> {
        let unit = stroke_width.max(1.0);
        match self {
            DashStyle::Solid => Vec::new(),
            DashStyle::Dashed => vec![unit * 4.0, unit * 3.0],
            DashStyle::Dotted => vec![unit, unit * 2.0],
        }
    }
}

/// Rectangle-like annotation body (rectangle, highlight, whiteout, crop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxShape {
    pub rect: Rect,
    pub fill: Option<Color>,
    pub stroke: Stroke,
    #[serde(default)]
    pub dash: DashStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EllipseShape {
    /// Bounding box of the ellipse.
    pub rect: Rect,
    pub stroke: Stroke,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
    pub stroke: Stroke,
}

impl Segment {
    pub fn length(&self) -> f32 {
        self.start.distance_to(&self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Freehand {
    pub points: Vec<Point>,
    pub stroke: Stroke,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: String,
    pub size: f32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl FontSpec {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self { family: family.into(), size, bold: false, italic: false }
    }
}

impl Default for FontSpec {
    fn default() -> Self {
        Self::new("Helvetica", 16.0)
    }
}

/// Fill painted behind a text run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextBackground {
    pub color: Color,
    pub padding: f32,
    /// Lower bound on the painted width, e.g. the box drawn by the edit-text tool.
    #[serde(default)]
    pub min_width: f32,
}

/// Single-line text run. `origin` is the top-left of the glyph run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub origin: Point,
    pub text: String,
    pub font: FontSpec,
    pub color: Color,
    pub background: Option<TextBackground>,
}

impl TextBox {
    /// Rough extent used for hit testing; export uses real font metrics.
    pub fn approximate_size(&self) -> Size {
        let chars = self.text.chars().count().max(1) as f32;
        let mut width = chars * self.font.size * 0.55;
        if let Some(background) = &self.background {
            width = width.max(background.min_width);
        }
        Size::new(width, self.font.size * 1.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMime {
    Png,
    Jpeg,
}

impl ImageMime {
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBox {
    pub rect: Rect,
    pub data: Vec<u8>,
    pub mime: ImageMime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StampKind {
    Check,
    Cross,
    Dot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampShape {
    pub kind: StampKind,
    pub rect: Rect,
    pub color: Color,
}

impl StampShape {
    /// Line segments that make up a check or cross mark, proportioned to the
    /// bounding box. Dots are filled ellipses and have no segments.
    pub fn strokes(&self) -> Vec<(Point, Point)> {
        let r = self.rect.normalized();
        let at = |fx: f32, fy: f32| Point::new(r.x + r.width * fx, r.y + r.height * fy);
        match self.kind {
            StampKind::Check => vec![(at(0.15, 0.55), at(0.4, 0.8)), (at(0.4, 0.8), at(0.85, 0.2))],
            StampKind::Cross => vec![(at(0.2, 0.2), at(0.8, 0.8)), (at(0.8, 0.2), at(0.2, 0.8))],
            StampKind::Dot => Vec::new(),
        }
    }

    /// Stroke width of check/cross marks.
    pub fn line_width(&self) -> f32 {
        let r = self.rect.normalized();
        (r.width.min(r.height) * 0.12).max(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationKind {
    Rectangle(BoxShape),
    Highlight(BoxShape),
    Whiteout(BoxShape),
    Crop(BoxShape),
    Circle(EllipseShape),
    Line(Segment),
    Arrow(Segment),
    FreehandPath(Freehand),
    Text(TextBox),
    Image(ImageBox),
    Stamp(StampShape),
}

/// Overlay object owned by one page position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// 1-based position in the editor page sequence.
    pub page: u32,
    pub opacity: f32,
    pub kind: AnnotationKind,
}

impl Annotation {
    /// Create an annotation with a fresh id and the kind's default opacity.
    pub fn new(page: u32, kind: AnnotationKind) -> Self {
        let opacity = match kind {
            AnnotationKind::Highlight(_) => HIGHLIGHT_OPACITY,
            _ => 1.0,
        };
        Self { id: AnnotationId::new_v4(), page, opacity, kind }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.set_opacity(opacity);
        self
    }

    /// Clamp into `(0, 1]`.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_finite() { opacity.clamp(MIN_OPACITY, 1.0) } else { 1.0 };
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            AnnotationKind::Rectangle(_) => "rectangle",
            AnnotationKind::Highlight(_) => "highlight",
            AnnotationKind::Whiteout(_) => "whiteout",
            AnnotationKind::Crop(_) => "crop",
            AnnotationKind::Circle(_) => "circle",
            AnnotationKind::Line(_) => "line",
            AnnotationKind::Arrow(_) => "arrow",
            AnnotationKind::FreehandPath(_) => "freehand",
            AnnotationKind::Text(_) => "text",
            AnnotationKind::Image(_) => "image",
            AnnotationKind::Stamp(_) => "stamp",
        }
    }

    pub fn is_crop(&self) -> bool {
        matches!(self.kind, AnnotationKind::Crop(_))
    }

    /// Normalized bounding box.
    pub fn bounds(&self) -> Rect {
        match &self.kind {
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Highlight(shape)
            | AnnotationKind::Whiteout(shape)
            | AnnotationKind::Crop(shape) => shape.rect.normalized(),
            AnnotationKind::Circle(ellipse) => ellipse.rect.normalized(),
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                Rect::from_corners(segment.start, segment.end)
            }
            AnnotationKind::FreehandPath(path) => points_bounds(&path.points),
            AnnotationKind::Text(text) => {
                let size = text.approximate_size();
                Rect::new(text.origin.x, text.origin.y, size.width, size.height)
            }
            AnnotationKind::Image(image) => image.rect.normalized(),
            AnnotationKind::Stamp(stamp) => stamp.rect.normalized(),
        }
    }

    /// Reference point that drags move: the box origin, the first endpoint of
    /// a segment, or the top-left of a path's bounds.
    pub fn origin(&self) -> Point {
        match &self.kind {
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Highlight(shape)
            | AnnotationKind::Whiteout(shape)
            | AnnotationKind::Crop(shape) => shape.rect.origin(),
            AnnotationKind::Circle(ellipse) => ellipse.rect.origin(),
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => segment.start,
            AnnotationKind::FreehandPath(path) => points_bounds(&path.points).origin(),
            AnnotationKind::Text(text) => text.origin,
            AnnotationKind::Image(image) => image.rect.origin(),
            AnnotationKind::Stamp(stamp) => stamp.rect.origin(),
        }
    }

    /// Translate every coordinate of the annotation.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        match &mut self.kind {
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Highlight(shape)
            | AnnotationKind::Whiteout(shape)
            | AnnotationKind::Crop(shape) => shape.rect = shape.rect.translate(dx, dy),
            AnnotationKind::Circle(ellipse) => ellipse.rect = ellipse.rect.translate(dx, dy),
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                segment.start = segment.start.offset(dx, dy);
                segment.end = segment.end.offset(dx, dy);
            }
            AnnotationKind::FreehandPath(path) => {
                for point in &mut path.points {
                    *point = point.offset(dx, dy);
                }
            }
            AnnotationKind::Text(text) => text.origin = text.origin.offset(dx, dy),
            AnnotationKind::Image(image) => image.rect = image.rect.translate(dx, dy),
            AnnotationKind::Stamp(stamp) => stamp.rect = stamp.rect.translate(dx, dy),
        }
    }

    /// Move so that [`Annotation::origin`] lands on `origin`.
    pub fn move_to(&mut self, origin: Point) {
        let current = self.origin();
        self.translate(origin.x - current.x, origin.y - current.y);
    }

    /// Set the extent measured from the origin. Negative values are allowed
    /// transiently and flipped by [`Annotation::normalized`].
    pub fn resize_to(&mut self, width: f32, height: f32) {
        match &mut self.kind {
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Highlight(shape)
            | AnnotationKind::Whiteout(shape)
            | AnnotationKind::Crop(shape) => {
                shape.rect.width = width;
                shape.rect.height = height;
            }
            AnnotationKind::Circle(ellipse) => {
                ellipse.rect.width = width;
                ellipse.rect.height = height;
            }
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                segment.end = segment.start.offset(width, height);
            }
            AnnotationKind::FreehandPath(path) => {
                let bounds = points_bounds(&path.points);
                let sx = if bounds.width > 0.0 { width / bounds.width } else { 1.0 };
                let sy = if bounds.height > 0.0 { height / bounds.height } else { 1.0 };
                for point in &mut path.points {
                    point.x = bounds.x + (point.x - bounds.x) * sx;
                    point.y = bounds.y + (point.y - bounds.y) * sy;
                }
            }
            AnnotationKind::Text(text) => {
                if let Some(background) = &mut text.background {
                    background.min_width = width.abs();
                }
            }
            AnnotationKind::Image(image) => {
                image.rect.width = width;
                image.rect.height = height;
            }
            AnnotationKind::Stamp(stamp) => {
                stamp.rect.width = width;
                stamp.rect.height = height;
            }
        }
    }

    /// Copy with every rectangle flipped to non-negative extents.
    pub fn normalized(&self) -> Self {
        let mut annotation = self.clone();
        match &mut annotation.kind {
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Highlight(shape)
            | AnnotationKind::Whiteout(shape)
            | AnnotationKind::Crop(shape) => shape.rect = shape.rect.normalized(),
            AnnotationKind::Circle(ellipse) => ellipse.rect = ellipse.rect.normalized(),
            AnnotationKind::Image(image) => image.rect = image.rect.normalized(),
            AnnotationKind::Stamp(stamp) => stamp.rect = stamp.rect.normalized(),
            AnnotationKind::Line(_)
            | AnnotationKind::Arrow(_)
            | AnnotationKind::FreehandPath(_)
            | AnnotationKind::Text(_) => {}
        }
        annotation
    }

    /// Multiply every coordinate and length by `factor` (zoom change).
    pub fn scale_by(&mut self, factor: f32) {
        let scale_rect = |rect: &mut Rect| {
            *rect = Rect::new(
                rect.x * factor,
                rect.y * factor,
                rect.width * factor,
                rect.height * factor,
            )
        };
        let scale_point =
            |point: &mut Point| *point = Point::new(point.x * factor, point.y * factor);
        match &mut self.kind {
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Highlight(shape)
            | AnnotationKind::Whiteout(shape)
            | AnnotationKind::Crop(shape) => {
                scale_rect(&mut shape.rect);
                shape.stroke.width *= factor;
            }
            AnnotationKind::Circle(ellipse) => {
                scale_rect(&mut ellipse.rect);
                ellipse.stroke.width *= factor;
            }
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                scale_point(&mut segment.start);
                scale_point(&mut segment.end);
                segment.stroke.width *= factor;
            }
            AnnotationKind::FreehandPath(path) => {
                path.points.iter_mut().for_each(scale_point);
                path.stroke.width *= factor;
            }
            AnnotationKind::Text(text) => {
                scale_point(&mut text.origin);
                text.font.size *= factor;
                if let Some(background) = &mut text.background {
                    background.padding *= factor;
                    background.min_width *= factor;
                }
            }
            AnnotationKind::Image(image) => scale_rect(&mut image.rect),
            AnnotationKind::Stamp(stamp) => scale_rect(&mut stamp.rect),
        }
    }

    /// Location of the single resize handle.
    pub fn resize_handle(&self) -> Point {
        match &self.kind {
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => segment.end,
            _ => self.bounds().bottom_right(),
        }
    }

    /// Whether `point` lies on the annotation, within `tolerance`.
    pub fn hit_test(&self, point: &Point, tolerance: f32) -> bool {
        match &self.kind {
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                let reach = tolerance + segment.stroke.width / 2.0;
                point_near_segment(point, &segment.start, &segment.end, reach)
            }
            AnnotationKind::FreehandPath(path) => {
                let reach = tolerance + path.stroke.width / 2.0;
                match path.points.as_slice() {
                    [] => false,
                    [only] => point.distance_to(only) <= reach,
                    points => points
                        .windows(2)
                        .any(|pair| point_near_segment(point, &pair[0], &pair[1], reach)),
                }
            }
            _ => self.bounds().contains(point, tolerance),
        }
    }

    /// Primary color, as edited by the property panel.
    pub fn color(&self) -> Color {
        match &self.kind {
            AnnotationKind::Rectangle(shape)
            | AnnotationKind::Whiteout(shape)
            | AnnotationKind::Crop(shape) => shape.stroke.color,
            AnnotationKind::Highlight(shape) => shape.fill.unwrap_or(shape.stroke.color),
            AnnotationKind::Circle(ellipse) => ellipse.stroke.color,
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => segment.stroke.color,
            AnnotationKind::FreehandPath(path) => path.stroke.color,
            AnnotationKind::Text(text) => text.color,
            AnnotationKind::Image(_) => Color::BLACK,
            AnnotationKind::Stamp(stamp) => stamp.color,
        }
    }

    pub fn set_color(&mut self, color: Color) {
        match &mut self.kind {
            AnnotationKind::Rectangle(shape) | AnnotationKind::Crop(shape) => {
                shape.stroke.color = color
            }
            AnnotationKind::Highlight(shape) => {
                shape.fill = Some(color);
                shape.stroke.color = color;
            }
            // Whiteout stays white.
            AnnotationKind::Whiteout(_) | AnnotationKind::Image(_) => {}
            AnnotationKind::Circle(ellipse) => ellipse.stroke.color = color,
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                segment.stroke.color = color
            }
            AnnotationKind::FreehandPath(path) => path.stroke.color = color,
            AnnotationKind::Text(text) => text.color = color,
            AnnotationKind::Stamp(stamp) => stamp.color = color,
        }
    }

    /// Whether a finished drawing is too small to keep. Segments are judged
    /// by endpoint separation, paths by point count, everything else by
    /// requiring both dimensions below `min_size`.
    pub fn is_degenerate(&self, min_size: f32) -> bool {
        match &self.kind {
            AnnotationKind::Line(segment) | AnnotationKind::Arrow(segment) => {
                segment.length() < min_size
            }
            AnnotationKind::FreehandPath(path) => path.points.len() < 2,
            AnnotationKind::Text(text) => text.text.is_empty(),
            _ => {
                let bounds = self.bounds();
                bounds.width < min_size && bounds.height < min_size
            }
        }
    }
}

fn points_bounds(points: &[Point]) -> Rect {
    let Some(first) = points.first() else {
        return Rect::default();
    };
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in points.iter().skip(1) {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }
    Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

fn point_near_segment(point: &Point, start: &Point, end: &Point, tolerance: f32) -> bool {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-6 {
        return point.distance_to(start) <= tolerance;
    }

    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    let closest = Point::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest) <= tolerance
}
