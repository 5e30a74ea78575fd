//! Pagemark Core Library
//!
//! Editing session, pointer interaction, coordinate mapping and the export
//! pipeline for the annotation editor.

pub mod config;
pub mod export;
pub mod fonts;
pub mod interaction;
pub mod session;
pub mod transform;

pub use config::{ConfigError, EditorConfig};
pub use export::{export_snapshot, ExportError, ExportOptions};
pub use fonts::{resolve_font, FontFamily};
pub use interaction::{AnnotationStore, DrawKind, InteractionState, PageInteraction, ToolStyle};
pub use session::{EditorSession, SelectionStyle, SessionError};
pub use transform::PageTransform;
