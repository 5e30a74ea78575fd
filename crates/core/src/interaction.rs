//! Pointer interaction state machine
//!
//! One [`PageInteraction`] per displayed page turns pointer-down/move/up
//! sequences into annotation creation, selection, drag and resize. The active
//! tool's [`Gesture`] decides what a pointer-down starts; everything a
//! gesture needs lives inside the current [`InteractionState`] and is gone
//! once the machine is back at `Idle`.
//!
//! Intermediate frames only touch the preview or call
//! [`AnnotationStore::update_annotation`]; a finished gesture produces
//! exactly one history-pushing call.

use crate::config::EditorConfig;
use crate::session::SessionError;
use doc_model::{
    Annotation, AnnotationId, AnnotationKind, BoxShape, Color, DashStyle, EllipseShape, FontSpec,
    Freehand, Gesture, Point, Rect, Segment, ShapeTool, StampKind, StampShape, Stroke,
    TextBackground, TextBox, Tool,
};

/// Annotation storage the state machine edits through.
pub trait AnnotationStore {
    /// Annotations on a 1-based page, in paint order.
    fn annotations_on(&self, page: u32) -> Vec<Annotation>;
    fn selected_id(&self) -> Option<AnnotationId>;
    /// Add a finished annotation and push history.
    fn add_annotation(&mut self, annotation: Annotation) -> Result<AnnotationId, SessionError>;
    /// Replace an annotation without pushing history.
    fn update_annotation(&mut self, annotation: Annotation) -> Result<(), SessionError>;
    /// Replace an annotation and push history.
    fn commit_annotation(&mut self, annotation: Annotation) -> Result<(), SessionError>;
    fn select(&mut self, id: Option<AnnotationId>);
}

/// Style applied to newly created annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolStyle {
    pub color: Color,
    pub stroke_width: f32,
    pub dash: DashStyle,
    pub highlight: Color,
    pub font: FontSpec,
}

impl ToolStyle {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            color: Color::RED,
            stroke_width: config.stroke_width,
            dash: DashStyle::Solid,
            highlight: Color::YELLOW,
            font: FontSpec::new(config.font_family.clone(), config.font_size),
        }
    }
}

impl Default for ToolStyle {
    fn default() -> Self {
        Self::from_config(&EditorConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    /// A shape or path being drawn; `preview` is never stored.
    Drawing { shape: DrawKind, origin: Point, preview: Annotation },
    /// Moving a selected annotation. `offset` is pointer minus origin of
    /// `base`, the annotation as it was when the gesture started.
    Dragging { offset: Point, base: Annotation, annotation: Annotation },
    /// Dragging the bottom-right handle. Every frame is derived from `base`.
    Resizing { base: Annotation, annotation: Annotation },
}

/// What a `Drawing` gesture produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Shape(ShapeTool),
    Path,
}

/// Per-page pointer state machine.
#[derive(Debug, Clone)]
pub struct PageInteraction {
    page: u32,
    tool: Tool,
    style: ToolStyle,
    config: EditorConfig,
    state: InteractionState,
}

impl PageInteraction {
    pub fn new(page: u32, config: &EditorConfig) -> Self {
        Self {
            page,
            tool: Tool::Select,
            style: ToolStyle::from_config(config),
            config: config.clone(),
            state: InteractionState::Idle,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switch tools. An unfinished gesture is abandoned.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.state = InteractionState::Idle;
    }

    pub fn style(&self) -> &ToolStyle {
        &self.style
    }

    pub fn set_style(&mut self, style: ToolStyle) {
        self.style = style;
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, InteractionState::Idle)
    }

    /// Transient shape to paint over the page while drawing.
    pub fn preview(&self) -> Option<&Annotation> {
        match &self.state {
            InteractionState::Drawing { preview, .. } => Some(preview),
            _ => None,
        }
    }

    pub fn pointer_down<S: AnnotationStore>(
        &mut self,
        store: &mut S,
        point: Point,
    ) -> Result<(), SessionError> {
        if !self.is_idle() {
            // A lost pointer-up; finish the previous gesture first.
            self.pointer_up(store)?;
        }

        match self.tool.gesture() {
            Gesture::Select => {
                if !self.grab(store, point, false) {
                    store.select(None);
                }
            }
            Gesture::CropSelect => {
                if !self.grab(store, point, true) {
                    store.select(None);
                    self.begin_drawing(DrawKind::Shape(ShapeTool::Crop), point);
                }
            }
            Gesture::Stamp(kind) => {
                let stamp = self.stamp(kind, point);
                store.add_annotation(stamp)?;
            }
            Gesture::PlaceText => {
                let text = self.text(point, None);
                let id = store.add_annotation(text)?;
                store.select(Some(id));
            }
            Gesture::DrawShape(shape) => self.begin_drawing(DrawKind::Shape(shape), point),
            Gesture::DrawPath => self.begin_drawing(DrawKind::Path, point),
        }
        Ok(())
    }

    pub fn pointer_move<S: AnnotationStore>(
        &mut self,
        store: &mut S,
        point: Point,
    ) -> Result<(), SessionError> {
        match &mut self.state {
            InteractionState::Idle => Ok(()),
            InteractionState::Drawing { shape: DrawKind::Path, preview, .. } => {
                if let AnnotationKind::FreehandPath(path) = &mut preview.kind {
                    path.points.push(point);
                }
                Ok(())
            }
            InteractionState::Drawing { origin, preview, .. } => {
                preview.resize_to(point.x - origin.x, point.y - origin.y);
                Ok(())
            }
            InteractionState::Dragging { offset, base, annotation } => {
                let mut frame = base.clone();
                frame.move_to(Point::new(point.x - offset.x, point.y - offset.y));
                update_frame(store, annotation, frame)
            }
            InteractionState::Resizing { base, annotation } => {
                let origin = base.origin();
                let mut frame = base.clone();
                frame.resize_to(point.x - origin.x, point.y - origin.y);
                update_frame(store, annotation, frame)
            }
        }
    }

    pub fn pointer_up<S: AnnotationStore>(&mut self, store: &mut S) -> Result<(), SessionError> {
        match std::mem::replace(&mut self.state, InteractionState::Idle) {
            InteractionState::Idle => Ok(()),
            InteractionState::Dragging { base, annotation, .. }
            | InteractionState::Resizing { base, annotation } => {
                if annotation != base {
                    store.commit_annotation(annotation)?;
                }
                Ok(())
            }
            InteractionState::Drawing { shape, preview, .. } => {
                self.finish_drawing(store, shape, preview)
            }
        }
    }

    /// Leaving the surface ends the gesture like a pointer-up.
    pub fn pointer_leave<S: AnnotationStore>(&mut self, store: &mut S) -> Result<(), SessionError> {
        self.pointer_up(store)
    }

    /// Select the annotation under `point`, or start resizing the selection
    /// when its handle is hit. Returns whether anything was grabbed.
    fn grab<S: AnnotationStore>(&mut self, store: &mut S, point: Point, crops_only: bool) -> bool {
        let candidates: Vec<Annotation> = store
            .annotations_on(self.page)
            .into_iter()
            .filter(|annotation| !crops_only || annotation.is_crop())
            .collect();

        if let Some(selected) = store
            .selected_id()
            .and_then(|id| candidates.iter().find(|annotation| annotation.id == id))
        {
            let reach = self.config.handle_size + self.config.hit_tolerance;
            if selected.resize_handle().distance_to(&point) <= reach {
                tracing::debug!(id = %selected.id, "resize started");
                self.state = InteractionState::Resizing {
                    base: selected.clone(),
                    annotation: selected.clone(),
                };
                return true;
            }
        }

        // Topmost first.
        let Some(hit) = candidates
            .into_iter()
            .rev()
            .find(|annotation| annotation.hit_test(&point, self.config.hit_tolerance))
        else {
            return false;
        };

        let origin = hit.origin();
        store.select(Some(hit.id));
        tracing::debug!(id = %hit.id, kind = hit.kind_name(), "drag started");
        self.state = InteractionState::Dragging {
            offset: Point::new(point.x - origin.x, point.y - origin.y),
            base: hit.clone(),
            annotation: hit,
        };
        true
    }

    fn begin_drawing(&mut self, shape: DrawKind, point: Point) {
        let kind = match shape {
            DrawKind::Path => AnnotationKind::FreehandPath(Freehand {
                points: vec![point],
                stroke: self.stroke(),
            }),
            DrawKind::Shape(tool) => self.shape_kind(tool, Rect::new(point.x, point.y, 0.0, 0.0)),
        };
        self.state = InteractionState::Drawing {
            shape,
            origin: point,
            preview: Annotation::new(self.page, kind),
        };
    }

    fn finish_drawing<S: AnnotationStore>(
        &mut self,
        store: &mut S,
        shape: DrawKind,
        preview: Annotation,
    ) -> Result<(), SessionError> {
        let drawn = preview.normalized();
        if drawn.is_degenerate(self.config.min_shape_size) {
            tracing::debug!(kind = drawn.kind_name(), "discarded degenerate drawing");
            return Ok(());
        }

        match shape {
            DrawKind::Shape(ShapeTool::EditText) => {
                let rect = drawn.bounds();
                let background = TextBackground {
                    color: Color::WHITE,
                    padding: self.config.text_padding,
                    min_width: rect.width,
                };
                let anchor = Point::new(rect.x, rect.y + rect.height / 2.0);
                let text = self.text(anchor, Some(background));
                let id = store.add_annotation(text)?;
                store.select(Some(id));
            }
            DrawKind::Shape(ShapeTool::Crop) => {
                let id = store.add_annotation(drawn)?;
                store.select(Some(id));
            }
            _ => {
                store.add_annotation(drawn)?;
            }
        }
        Ok(())
    }

    fn stroke(&self) -> Stroke {
        Stroke::new(self.style.color, self.style.stroke_width)
    }

    fn shape_kind(&self, tool: ShapeTool, rect: Rect) -> AnnotationKind {
        let outlined = |fill: Option<Color>, stroke: Stroke, dash: DashStyle| BoxShape {
            rect,
            fill,
            stroke,
            dash,
        };
        match tool {
            ShapeTool::Rectangle => {
                AnnotationKind::Rectangle(outlined(None, self.stroke(), self.style.dash))
            }
            ShapeTool::Highlight => AnnotationKind::Highlight(outlined(
                Some(self.style.highlight),
                Stroke::none(),
                DashStyle::Solid,
            )),
            ShapeTool::Whiteout => AnnotationKind::Whiteout(outlined(
                Some(Color::WHITE),
                Stroke::none(),
                DashStyle::Solid,
            )),
            // Only the drawn box matters; it becomes a text annotation.
            ShapeTool::EditText => AnnotationKind::Rectangle(outlined(
                Some(Color::WHITE),
                Stroke::new(Color::BLUE, 1.0),
                DashStyle::Dashed,
            )),
            ShapeTool::Crop => AnnotationKind::Crop(outlined(
                None,
                Stroke::new(Color::BLUE, 1.0),
                DashStyle::Dashed,
            )),
            ShapeTool::Circle => {
                AnnotationKind::Circle(EllipseShape { rect, stroke: self.stroke() })
            }
            ShapeTool::Line => AnnotationKind::Line(Segment {
                start: rect.origin(),
                end: rect.origin(),
                stroke: self.stroke(),
            }),
            ShapeTool::Arrow => AnnotationKind::Arrow(Segment {
                start: rect.origin(),
                end: rect.origin(),
                stroke: self.stroke(),
            }),
        }
    }

    fn stamp(&self, kind: StampKind, center: Point) -> Annotation {
        Annotation::new(
            self.page,
            AnnotationKind::Stamp(StampShape {
                kind,
                rect: Rect::centered(center, self.config.stamp_size),
                color: self.style.color,
            }),
        )
    }

    fn text(&self, origin: Point, background: Option<TextBackground>) -> Annotation {
        Annotation::new(
            self.page,
            AnnotationKind::Text(TextBox {
                origin,
                text: self.config.text_placeholder.clone(),
                font: self.style.font.clone(),
                color: Color::BLACK,
                background,
            }),
        )
    }
}

/// Publish a transient gesture frame unless it repeats the last one.
fn update_frame<S: AnnotationStore>(
    store: &mut S,
    current: &mut Annotation,
    frame: Annotation,
) -> Result<(), SessionError> {
    if *current == frame {
        return Ok(());
    }
    *current = frame;
    store.update_annotation(current.clone())
}
