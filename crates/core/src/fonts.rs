//! Font resolution and text metrics for the standard Type1 fonts.
//!
//! Requested family names are mapped onto one of the standard families, then
//! onto the bold/italic member of that family. Widths come from the Adobe
//! font metrics of the base fonts, in 1/1000 em.

use pdf_engine::StandardFont;

/// Standard family a requested font name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFamily {
    Helvetica,
    Times,
    Courier,
}

impl FontFamily {
    /// Family for a free-form name; unknown names fall back to Helvetica.
    pub fn for_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if ["times", "georgia", "garamond"].iter().any(|needle| name.contains(needle)) {
            FontFamily::Times
        } else if ["courier", "mono"].iter().any(|needle| name.contains(needle)) {
            FontFamily::Courier
        } else {
            FontFamily::Helvetica
        }
    }

    fn member(self, bold: bool, italic: bool) -> StandardFont {
        use StandardFont::*;
        match (self, bold, italic) {
            (FontFamily::Helvetica, false, false) => Helvetica,
            (FontFamily::Helvetica, true, false) => HelveticaBold,
            (FontFamily::Helvetica, false, true) => HelveticaOblique,
            (FontFamily::Helvetica, true, true) => HelveticaBoldOblique,
            (FontFamily::Times, false, false) => TimesRoman,
            (FontFamily::Times, true, false) => TimesBold,
            (FontFamily::Times, false, true) => TimesItalic,
            (FontFamily::Times, true, true) => TimesBoldItalic,
            (FontFamily::Courier, false, false) => Courier,
            (FontFamily::Courier, true, false) => CourierBold,
            (FontFamily::Courier, false, true) => CourierOblique,
            (FontFamily::Courier, true, true) => CourierBoldOblique,
        }
    }
}

/// Standard font for a requested family name and style.
pub fn resolve_font(family: &str, bold: bool, italic: bool) -> StandardFont {
    FontFamily::for_name(family).member(bold, italic)
}

struct Metrics {
    /// Advance widths of ASCII 32..=126; `None` for fixed pitch.
    widths: Option<&'static [u16; 95]>,
    /// Width of characters outside the table.
    default_width: u16,
    ascent: i16,
    descent: i16,
}

fn metrics(font: StandardFont) -> Metrics {
    use StandardFont::*;
    match font {
        Helvetica | HelveticaOblique => Metrics {
            widths: Some(&HELVETICA),
            default_width: 556,
            ascent: 718,
            descent: -207,
        },
        HelveticaBold | HelveticaBoldOblique => Metrics {
            widths: Some(&HELVETICA_BOLD),
            default_width: 611,
            ascent: 718,
            descent: -207,
        },
        // Italic widths differ slightly; the upright tables are close enough
        // for sizing a background fill.
        TimesRoman | TimesItalic => Metrics {
            widths: Some(&TIMES_ROMAN),
            default_width: 500,
            ascent: 683,
            descent: -217,
        },
        TimesBold | TimesBoldItalic => Metrics {
            widths: Some(&TIMES_BOLD),
            default_width: 500,
            ascent: 683,
            descent: -217,
        },
        Courier | CourierBold | CourierOblique | CourierBoldOblique => Metrics {
            widths: None,
            default_width: 600,
            ascent: 629,
            descent: -157,
        },
    }
}

/// Advance width of `text` at `size` points.
pub fn text_width(font: StandardFont, text: &str, size: f32) -> f32 {
    let metrics = metrics(font);
    let units: u32 = text
        .chars()
        .map(|c| {
            let code = c as u32;
            match metrics.widths {
                Some(widths) if (32..=126).contains(&code) => widths[(code - 32) as usize],
                _ => metrics.default_width,
            }
        })
        .map(u32::from)
        .sum();
    units as f32 * size / 1000.0
}

/// Height above the baseline, in points.
pub fn ascent(font: StandardFont, size: f32) -> f32 {
    metrics(font).ascent as f32 * size / 1000.0
}

/// Depth below the baseline, in points (negative).
pub fn descent(font: StandardFont, size: f32) -> f32 {
    metrics(font).descent as f32 * size / 1000.0
}

pub fn line_height(font: StandardFont, size: f32) -> f32 {
    ascent(font, size) - descent(font, size)
}

#[rustfmt::skip]
static HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
static HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
static TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
static TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];
