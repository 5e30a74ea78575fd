//! Editor configuration: gesture thresholds, stamp and handle sizes, text
//! defaults and the size of inserted blank pages.
//!
//! Configuration can be loaded from a `key = value` file, from `PAGEMARK_*`
//! environment variables, or built programmatically.

use doc_model::{Size, BLANK_PAGE_SIZE};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Tunables shared by the interaction layer, the session and the exporter.
///
/// Lengths are in device pixels at the active zoom scale, except
/// `blank_page_size` which is in document points.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Drawings smaller than this in both dimensions are discarded
    pub min_shape_size: f32,
    /// Side of the square committed by the check, cross and dot tools
    pub stamp_size: f32,
    /// Hit radius of the resize handle
    pub handle_size: f32,
    /// Slack added around annotations when hit testing
    pub hit_tolerance: f32,
    /// Content of freshly placed text annotations
    pub text_placeholder: String,
    pub font_family: String,
    pub font_size: f32,
    /// Padding of the background painted behind edit-text boxes
    pub text_padding: f32,
    pub stroke_width: f32,
    pub blank_page_size: Size,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            min_shape_size: 5.0,
            stamp_size: 24.0,
            handle_size: 8.0,
            hit_tolerance: 4.0,
            text_placeholder: "Text".to_string(),
            font_family: "Helvetica".to_string(),
            font_size: 16.0,
            text_padding: 2.0,
            stroke_width: 2.0,
            blank_page_size: BLANK_PAGE_SIZE,
        }
    }
}

impl EditorConfig {
    /// Sets the minimum committed shape size.
    pub fn with_min_shape_size(mut self, size: f32) -> Self {
        self.min_shape_size = size;
        self
    }

    /// Sets the stamp side length.
    pub fn with_stamp_size(mut self, size: f32) -> Self {
        self.stamp_size = size;
        self
    }

    pub fn with_handle_size(mut self, size: f32) -> Self {
        self.handle_size = size;
        self
    }

    pub fn with_hit_tolerance(mut self, tolerance: f32) -> Self {
        self.hit_tolerance = tolerance;
        self
    }

    pub fn with_text_placeholder(mut self, text: impl Into<String>) -> Self {
        self.text_placeholder = text.into();
        self
    }

    /// Sets the font used by new text annotations.
    pub fn with_font(mut self, family: impl Into<String>, size: f32) -> Self {
        self.font_family = family.into();
        self.font_size = size;
        self
    }

    pub fn with_text_padding(mut self, padding: f32) -> Self {
        self.text_padding = padding;
        self
    }

    pub fn with_stroke_width(mut self, width: f32) -> Self {
        self.stroke_width = width;
        self
    }

    pub fn with_blank_page_size(mut self, size: Size) -> Self {
        self.blank_page_size = size;
        self
    }

    /// Loads configuration from environment variables, starting from the
    /// defaults.
    ///
    /// Environment variables:
    /// - `PAGEMARK_MIN_SHAPE_SIZE`
    /// - `PAGEMARK_STAMP_SIZE`
    /// - `PAGEMARK_HANDLE_SIZE`
    /// - `PAGEMARK_HIT_TOLERANCE`
    /// - `PAGEMARK_TEXT_PLACEHOLDER`
    /// - `PAGEMARK_FONT_FAMILY`
    /// - `PAGEMARK_FONT_SIZE`
    /// - `PAGEMARK_TEXT_PADDING`
    /// - `PAGEMARK_STROKE_WIDTH`
    /// - `PAGEMARK_BLANK_PAGE_SIZE` (`WIDTHxHEIGHT` in points)
    ///
    /// # Errors
    /// Returns an error if any variable holds a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for key in KEYS {
            let var = format!("PAGEMARK_{}", key.to_ascii_uppercase());
            if let Ok(value) = std::env::var(&var) {
                config.apply(key, &value).map_err(|_| ConfigError::InvalidValue(var))?;
            }
        }

        Ok(config)
    }

    /// Loads configuration from a `key = value` file.
    ///
    /// Expected file format:
    /// ```text
    /// # comments and blank lines are ignored
    /// min_shape_size = 5
    /// stamp_size = 24
    /// font_family = "Times New Roman"
    /// blank_page_size = 612x792
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a known key has an
    /// invalid value. Unknown keys are ignored.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');
                if KEYS.contains(&key) {
                    config
                        .apply(key, value)
                        .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
                }
            }
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ()> {
        match key {
            "min_shape_size" => self.min_shape_size = parse_length(value)?,
            "stamp_size" => self.stamp_size = parse_length(value)?,
            "handle_size" => self.handle_size = parse_length(value)?,
            "hit_tolerance" => self.hit_tolerance = parse_length(value)?,
            "text_placeholder" => self.text_placeholder = value.to_string(),
            "font_family" if !value.is_empty() => self.font_family = value.to_string(),
            "font_size" => self.font_size = parse_length(value)?,
            "text_padding" => self.text_padding = parse_length(value)?,
            "stroke_width" => self.stroke_width = parse_length(value)?,
            "blank_page_size" => {
                let (width, height) = value.split_once(['x', 'X']).ok_or(())?;
                self.blank_page_size = Size::new(parse_length(width)?, parse_length(height)?);
            }
            _ => return Err(()),
        }
        Ok(())
    }
}

const KEYS: [&str; 10] = [
    "min_shape_size",
    "stamp_size",
    "handle_size",
    "hit_tolerance",
    "text_placeholder",
    "font_family",
    "font_size",
    "text_padding",
    "stroke_width",
    "blank_page_size",
];

/// Finite, non-negative number.
fn parse_length(value: &str) -> Result<f32, ()> {
    match f32::from_str(value.trim()) {
        Ok(number) if number.is_finite() && number >= 0.0 => Ok(number),
        _ => Err(()),
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
