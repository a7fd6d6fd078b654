//! Color expression parsing for VIA RGB control.
//!
//! Every supported expression resolves to a VIA `(hue, saturation)` pair where
//! hue is a cyclic 0..=255 unit and saturation is always full. Accepted forms:
//!
//! - Named: `"red"`, `"yellow"`, `"green"`, `"cyan"`, `"blue"`, `"purple"`
//! - Hex: `"#RRGGBB"` (leading `#` optional), converted via HSV
//! - Direct hue: `"hsv:<H>"` where `H` is a 0..=255 unit or a 256..=360 degree value

use std::fmt;

/// All expressions map to a fully saturated hue.
pub const FULL_SATURATION: u8 = 255;

/// Named colors with fixed positions on the VIA hue wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedColor {
    Red,
    Yellow,
    Green,
    Cyan,
    Blue,
    Purple,
}

impl NamedColor {
    /// Hue unit on the 0..=255 wheel.
    pub fn hue(self) -> u8 {
        match self {
            NamedColor::Red => 0,
            NamedColor::Yellow => 42,
            NamedColor::Green => 85,
            NamedColor::Cyan => 128,
            NamedColor::Blue => 170,
            NamedColor::Purple => 213,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NamedColor::Red => "red",
            NamedColor::Yellow => "yellow",
            NamedColor::Green => "green",
            NamedColor::Cyan => "cyan",
            NamedColor::Blue => "blue",
            NamedColor::Purple => "purple",
        }
    }

    fn lookup(name: &str) -> Option<NamedColor> {
        match name {
            "red" => Some(NamedColor::Red),
            "yellow" => Some(NamedColor::Yellow),
            "green" => Some(NamedColor::Green),
            "cyan" => Some(NamedColor::Cyan),
            "blue" => Some(NamedColor::Blue),
            "purple" => Some(NamedColor::Purple),
            _ => None,
        }
    }
}

/// A parsed color expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Color {
    Named(NamedColor),
    Hex(u8, u8, u8),
    HsvUnit(u8),
}

/// Color parsing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    /// Expression does not match any accepted form.
    Format(String),
    /// Numeric value outside the accepted range.
    Range(String),
}

impl fmt::Display for ColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorError::Format(e) => write!(f, "{e}"),
            ColorError::Range(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ColorError {}

impl Color {
    /// Parse a color expression. Case-insensitive, surrounding whitespace ignored.
    pub fn parse(text: &str) -> Result<Color, ColorError> {
        let s = text.trim().to_lowercase();

        if let Some(named) = NamedColor::lookup(&s) {
            return Ok(Color::Named(named));
        }

        if let Some(value) = s.strip_prefix("hsv:") {
            return parse_hsv(value);
        }

        let hex = s.strip_prefix('#').unwrap_or(&s);
        if hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            // Validated above, from_str_radix cannot fail here.
            let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
            let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
            let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
            return Ok(Color::Hex(r, g, b));
        }

        Err(ColorError::Format(format!(
            "unknown color format: {} (use a color name, #RRGGBB or hsv:<H>)",
            text.trim()
        )))
    }

    /// Resolve to the VIA `(hue, saturation)` pair.
    pub fn hsv(&self) -> (u8, u8) {
        (self.hue(), FULL_SATURATION)
    }

    /// Target hue unit on the 0..=255 wheel.
    pub fn hue(&self) -> u8 {
        match self {
            Color::Named(named) => named.hue(),
            Color::Hex(r, g, b) => rgb_to_hue(*r as i32, *g as i32, *b as i32),
            Color::HsvUnit(h) => *h,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Named(named) => write!(f, "{}", named.as_str()),
            Color::Hex(r, g, b) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
            Color::HsvUnit(h) => write!(f, "hsv:{h}"),
        }
    }
}

fn parse_hsv(value: &str) -> Result<Color, ColorError> {
    let h: f64 = value
        .trim()
        .parse()
        .map_err(|_| ColorError::Format(format!("invalid hsv value: {value}")))?;

    if !h.is_finite() {
        return Err(ColorError::Format(format!("invalid hsv value: {value}")));
    }
    if h < 0.0 {
        return Err(ColorError::Range(format!("hsv hue value {h} is negative")));
    }
    if h > 360.0 {
        return Err(ColorError::Range(format!(
            "hsv hue value {h} is out of range (0..255 units or 0..360 degrees)"
        )));
    }
    if h > 255.0 {
        // Degree form. Multiply before dividing so exact thirds stay exact;
        // 360 wraps to 0.
        let unit = ((h % 360.0) * 255.0 / 360.0).trunc() as u16 % 256;
        return Ok(Color::HsvUnit(unit as u8));
    }
    Ok(Color::HsvUnit(h.trunc() as u16 as u8))
}

/// Convert an RGB triple to a hue unit on the 0..=255 wheel.
///
/// Channels are clamped to `[0, 255]` before conversion. Achromatic inputs
/// (zero delta) map to hue 0.
pub fn rgb_to_hue(r: i32, g: i32, b: i32) -> u8 {
    let r = r.clamp(0, 255) as f64;
    let g = g.clamp(0, 255) as f64;
    let b = b.clamp(0, 255) as f64;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return 0;
    }

    let degrees = if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    ((degrees * 255.0 / 360.0).trunc() as u16 % 256) as u8
}
