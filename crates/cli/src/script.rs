//! JSON action scripts replayed against an editing session.
//!
//! A script is a JSON array of actions, each tagged by `"action"`:
//!
//! ```json
//! [
//!   { "action": "gesture", "page": 1, "tool": "rectangle",
//!     "points": [{"x": 10, "y": 10}, {"x": 80, "y": 60}] },
//!   { "action": "click", "page": 1, "tool": "check", "x": 120, "y": 40 },
//!   { "action": "insert_page", "after": 1 },
//!   { "action": "undo" }
//! ]
//! ```

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use doc_model::{
    Annotation, AnnotationId, AnnotationKind, Color, DashStyle, FontSpec, ImageBox, ImageMime,
    Point, Rect, Rotation, Tool,
};
use pagemark_core::EditorSession;
use pdf_engine::{DocumentMutator, PdfEngine};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Press at the first point, move through the rest, release.
    Gesture {
        page: u32,
        tool: Tool,
        points: Vec<Point>,
        #[serde(default)]
        style: StyleOverride,
    },
    /// Press and release at one point.
    Click {
        page: u32,
        tool: Tool,
        x: f32,
        y: f32,
    },
    PlaceImage {
        page: u32,
        rect: Rect,
        /// `data:image/png;base64,...`
        data_url: String,
    },
    InsertPage {
        after: u32,
    },
    DeletePage {
        page: u32,
    },
    ReorderPage {
        from: u32,
        to: u32,
    },
    /// Apply the crop marker on `page`.
    ApplyCrop {
        page: u32,
    },
    DeleteSelected,
    SetText {
        text: String,
    },
    SetColor {
        color: String,
    },
    SetOpacity {
        opacity: f32,
    },
    SetFont {
        family: String,
        size: f32,
        #[serde(default)]
        bold: bool,
        #[serde(default)]
        italic: bool,
    },
    Zoom {
        scale: f32,
    },
    Rotate {
        degrees: i32,
    },
    Undo,
    Redo,
}

/// Per-gesture changes to the tool style.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StyleOverride {
    pub color: Option<String>,
    pub stroke_width: Option<f32>,
    pub dash: Option<DashStyle>,
}

pub fn parse(json: &str) -> Result<Vec<Action>> {
    serde_json::from_str(json).context("invalid action script")
}

/// Replay `actions` in order, stopping at the first failure.
pub fn replay<R: PdfEngine, M: DocumentMutator>(
    session: &mut EditorSession<R, M>,
    actions: &[Action],
) -> Result<()> {
    for (index, action) in actions.iter().enumerate() {
        apply(session, action).with_context(|| format!("action {} failed", index + 1))?;
    }
    Ok(())
}

fn apply<R: PdfEngine, M: DocumentMutator>(
    session: &mut EditorSession<R, M>,
    action: &Action,
) -> Result<()> {
    tracing::debug!(?action, "applying action");
    match action {
        Action::Gesture { page, tool, points, style } => {
            gesture(session, *page, *tool, points, style)?;
        }
        Action::Click { page, tool, x, y } => {
            gesture(session, *page, *tool, &[Point::new(*x, *y)], &StyleOverride::default())?;
        }
        Action::PlaceImage { page, rect, data_url } => {
            let (mime, data) = decode_data_url(data_url)?;
            let image =
                Annotation::new(*page, AnnotationKind::Image(ImageBox { rect: *rect, data, mime }));
            let id = session.add_annotation(image)?;
            session.select(Some(id));
        }
        Action::InsertPage { after } => {
            session.insert_page(*after)?;
        }
        Action::DeletePage { page } => session.delete_page(*page)?,
        Action::ReorderPage { from, to } => session.reorder_page(*from, *to)?,
        Action::ApplyCrop { page } => {
            let crop = session
                .snapshot()
                .annotations_on(*page)
                .find(|annotation| annotation.is_crop())
                .map(|annotation| annotation.id)
                .ok_or_else(|| anyhow!("page {page} has no crop region"))?;
            session.apply_crop(crop)?;
        }
        Action::DeleteSelected => {
            if !session.delete_selected()? {
                tracing::warn!("delete_selected with nothing selected");
            }
        }
        Action::SetText { text } => {
            let id = selected(session)?;
            session.set_text(id, text.clone())?;
        }
        Action::SetColor { color } => {
            let id = selected(session)?;
            session.set_color(id, Color::from_hex(color)?)?;
        }
        Action::SetOpacity { opacity } => {
            let id = selected(session)?;
            session.set_opacity(id, *opacity)?;
        }
        Action::SetFont { family, size, bold, italic } => {
            let id = selected(session)?;
            let font =
                FontSpec { family: family.clone(), size: *size, bold: *bold, italic: *italic };
            session.set_font(id, font)?;
        }
        Action::Zoom { scale } => session.set_scale(*scale)?,
        Action::Rotate { degrees } => {
            let rotation = Rotation::from_degrees(*degrees).ok_or_else(|| {
                anyhow!("rotation must be a multiple of 90 degrees, got {degrees}")
            })?;
            session.set_rotation(rotation);
        }
        Action::Undo => {
            session.undo();
        }
        Action::Redo => {
            session.redo();
        }
    }
    Ok(())
}

fn gesture<R: PdfEngine, M: DocumentMutator>(
    session: &mut EditorSession<R, M>,
    page: u32,
    tool: Tool,
    points: &[Point],
    style: &StyleOverride,
) -> Result<()> {
    let (first, rest) =
        points.split_first().ok_or_else(|| anyhow!("gesture needs at least one point"))?;

    let mut interaction = session.interaction(page);
    interaction.set_tool(tool);
    let mut tool_style = interaction.style().clone();
    if let Some(color) = &style.color {
        tool_style.color = Color::from_hex(color)?;
    }
    if let Some(width) = style.stroke_width {
        tool_style.stroke_width = width;
    }
    if let Some(dash) = style.dash {
        tool_style.dash = dash;
    }
    interaction.set_style(tool_style);

    interaction.pointer_down(session, *first)?;
    for point in rest {
        interaction.pointer_move(session, *point)?;
    }
    interaction.pointer_up(session)?;
    Ok(())
}

fn selected<R: PdfEngine, M: DocumentMutator>(
    session: &EditorSession<R, M>,
) -> Result<AnnotationId> {
    session
        .selected()
        .map(|annotation| annotation.id)
        .ok_or_else(|| anyhow!("no annotation is selected"))
}

/// Split a `data:<mime>;base64,<payload>` URL into image format and bytes.
fn decode_data_url(url: &str) -> Result<(ImageMime, Vec<u8>)> {
    let rest = url.strip_prefix("data:").ok_or_else(|| anyhow!("image must be a data: URL"))?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| anyhow!("malformed data URL"))?;
    let Some(mime) = header.strip_suffix(";base64") else {
        bail!("data URL must be base64 encoded");
    };
    let mime =
        ImageMime::from_mime_type(mime).ok_or_else(|| anyhow!("unsupported image type {mime}"))?;
    let data = STANDARD.decode(payload.trim()).context("invalid base64 image payload")?;
    Ok((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_actions() {
        let actions = parse(
            r##"[
                {"action": "gesture", "page": 1, "tool": "edit_text",
                 "points": [{"x": 1, "y": 2}, {"x": 30, "y": 40}],
                 "style": {"color": "#00ff00", "dash": "dashed"}},
                {"action": "insert_page", "after": 0},
                {"action": "undo"}
            ]"##,
        )
        .unwrap();

        assert_eq!(actions.len(), 3);
        assert!(matches!(
            &actions[0],
            Action::Gesture { tool: Tool::EditText, points, style, .. }
                if points.len() == 2 && style.dash == Some(DashStyle::Dashed)
        ));
        assert_eq!(actions[1], Action::InsertPage { after: 0 });
        assert_eq!(actions[2], Action::Undo);
    }

    #[test]
    fn unknown_actions_are_rejected() {
        assert!(parse(r#"[{"action": "explode"}]"#).is_err());
    }

    #[test]
    fn decodes_png_data_url() {
        let (mime, data) = decode_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(mime, ImageMime::Png);
        assert_eq!(&data[1..4], b"PNG");
    }

    #[test]
    fn rejects_unsupported_data_urls() {
        assert!(decode_data_url("https://example.com/a.png").is_err());
        assert!(decode_data_url("data:image/gif;base64,R0lGOD").is_err());
        assert!(decode_data_url("data:image/png,raw").is_err());
    }
}
