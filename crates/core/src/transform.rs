//! Screen to document coordinate mapping
//!
//! Editor geometry is in device pixels at the active zoom, origin top-left of
//! the rotated page image. Document geometry is in points, origin bottom-left
//! of the unrotated page.

use doc_model::{Point, Rect, Rotation, Size};
use pdf_engine::PdfRect;

/// Mapping for one page at one zoom scale and view rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    pub scale: f32,
    /// Unrotated page size in points.
    pub page_size: Size,
    pub rotation: Rotation,
}

impl PageTransform {
    pub fn new(scale: f32, page_size: Size, rotation: Rotation) -> Self {
        Self { scale, page_size, rotation }
    }

    /// Editor length to document length.
    pub fn length(&self, length: f32) -> f32 {
        length / self.scale
    }

    pub fn to_document(&self, point: Point) -> Point {
        let u = point.x / self.scale;
        let v = point.y / self.scale;
        let Size { width, height } = self.page_size;
        match self.rotation {
            Rotation::R0 => Point::new(u, height - v),
            Rotation::R90 => Point::new(v, u),
            Rotation::R180 => Point::new(width - u, v),
            Rotation::R270 => Point::new(width - v, height - u),
        }
    }

    pub fn to_screen(&self, point: Point) -> Point {
        let Size { width, height } = self.page_size;
        let (u, v) = match self.rotation {
            Rotation::R0 => (point.x, height - point.y),
            Rotation::R90 => (point.y, point.x),
            Rotation::R180 => (width - point.x, point.y),
            Rotation::R270 => (height - point.y, width - point.x),
        };
        Point::new(u * self.scale, v * self.scale)
    }

    /// Document-space box covering an editor rectangle. Corners are mapped
    /// individually, so the result is axis-aligned under every rotation.
    pub fn to_document_rect(&self, rect: Rect) -> PdfRect {
        let rect = rect.normalized();
        let corners = [
            rect.origin(),
            Point::new(rect.x + rect.width, rect.y),
            Point::new(rect.x, rect.y + rect.height),
            rect.bottom_right(),
        ]
        .map(|corner| self.to_document(corner));

        let min_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let min_y = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let max_y = corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
        PdfRect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: Size = Size { width: 612.0, height: 792.0 };

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn upright_transform_flips_y_and_divides_by_scale() {
        let transform = PageTransform::new(2.0, LETTER, Rotation::R0);
        assert_eq!(transform.to_document(Point::new(100.0, 50.0)), Point::new(50.0, 767.0));
        assert_eq!(transform.length(10.0), 5.0);
    }

    #[test]
    fn screen_corners_land_on_document_corners_for_every_rotation() {
        for rotation in [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270] {
            let transform = PageTransform::new(1.5, LETTER, rotation);
            let viewport = doc_model::Viewport::for_page(LETTER, 1.5, rotation);
            let rect = Rect::new(0.0, 0.0, viewport.width, viewport.height);

            let page = transform.to_document_rect(rect);
            assert!((page.x).abs() < 1e-3, "{rotation:?}");
            assert!((page.y).abs() < 1e-3, "{rotation:?}");
            assert!((page.width - LETTER.width).abs() < 1e-2, "{rotation:?}");
            assert!((page.height - LETTER.height).abs() < 1e-2, "{rotation:?}");
        }
    }

    #[test]
    fn quarter_turn_maps_top_left_of_view_to_document_origin() {
        // Rotated clockwise, the document's bottom-left corner is shown top-left.
        let transform = PageTransform::new(1.0, LETTER, Rotation::R90);
        assert!(close(transform.to_document(Point::new(0.0, 0.0)), Point::new(0.0, 0.0)));
        assert!(close(transform.to_document(Point::new(792.0, 0.0)), Point::new(0.0, 792.0)));
    }

    #[test]
    fn to_screen_inverts_to_document() {
        let point = Point::new(37.0, 411.0);
        for rotation in [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270] {
            let transform = PageTransform::new(1.25, LETTER, rotation);
            let back = transform.to_document(transform.to_screen(point));
            assert!(close(back, point), "{rotation:?}: {back:?}");
        }
    }

    #[test]
    fn negative_rect_is_normalized_before_mapping() {
        let transform = PageTransform::new(1.0, LETTER, Rotation::R0);
        let rect = transform.to_document_rect(Rect::new(50.0, 50.0, -20.0, -30.0));
        assert_eq!(rect, PdfRect::new(30.0, 742.0, 20.0, 30.0));
    }
}
