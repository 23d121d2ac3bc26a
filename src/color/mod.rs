//! Color model for decoded output
//!
//! Fragments carry color *references* (`MudColor`), not resolved colors, so
//! the same fragment stream can be rendered under different palettes. This
//! module provides the reference types, the 16-slot ANSI palette with its
//! default table, the xterm 256-color formula, and the named-color table
//! used by MXP `<color>` attributes.

mod named;

pub use named::{NamedColorIter, named_color};

use serde::{Deserialize, Serialize};

/// A concrete 24-bit color
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Whether this color is pure black.
    ///
    /// Pure black backgrounds are treated as transparent by the consumer
    /// rather than painted ("black-background suppression").
    pub const fn is_black(self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0
    }

    /// Parse a `#rrggbb` or `rrggbb` hex string
    pub fn from_hex(code: &str) -> Option<Self> {
        let hex = code.strip_prefix('#').unwrap_or(code);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let parse = |s: &str| u8::from_str_radix(s, 16).ok();
        Some(Self {
            r: parse(&hex[0..2])?,
            g: parse(&hex[2..4])?,
            b: parse(&hex[4..6])?,
        })
    }

    /// Parse either a hex code or a named color, as MXP allows both
    pub fn parse(value: &str) -> Option<Self> {
        if value.starts_with('#') {
            Self::from_hex(value)
        } else {
            named_color(value).or_else(|| Self::from_hex(value))
        }
    }

    /// Resolve an xterm 256-color index to RGB
    ///
    /// Indices 0-15 use the standard palette defaults, 16-231 the 6x6x6
    /// color cube, 232-255 the grayscale ramp.
    pub fn xterm(index: u8) -> Self {
        match index {
            0..=15 => DEFAULT_ANSI[index as usize],
            16..=231 => {
                let n = index - 16;
                let to_channel = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
                Self {
                    r: to_channel(n / 36),
                    g: to_channel((n % 36) / 6),
                    b: to_channel(n % 6),
                }
            }
            232..=255 => {
                let gray = 8 + (index - 232) * 10;
                Self::rgb(gray, gray, gray)
            }
        }
    }
}

/// An unresolved color reference carried on a text fragment
///
/// `Ansi` indices resolve through the active palette at render time; `Hex`
/// is palette-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MudColor {
    /// Index into the 16-slot ANSI palette (0-15)
    Ansi(u8),
    /// Literal RGB, bypassing the palette
    Hex(RgbColor),
}

impl MudColor {
    pub const ANSI_BLACK: Self = Self::Ansi(0);
    pub const ANSI_WHITE: Self = Self::Ansi(7);

    pub const fn is_black(self) -> bool {
        match self {
            Self::Ansi(code) => code == 0,
            Self::Hex(color) => color.is_black(),
        }
    }
}

/// An optional color, used where "unset" is meaningful (echo colors,
/// custom link color). Modeled as an explicit option rather than a
/// sentinel color value, so "unset" and "set to black" stay distinct.
pub type ColorOption = Option<RgbColor>;

/// The fixed default 16-color ANSI table
pub const DEFAULT_ANSI: [RgbColor; 16] = [
    RgbColor::rgb(0, 0, 0),       // black
    RgbColor::rgb(128, 0, 0),     // red
    RgbColor::rgb(0, 128, 0),     // green
    RgbColor::rgb(128, 128, 0),   // yellow
    RgbColor::rgb(0, 0, 128),     // blue
    RgbColor::rgb(128, 0, 128),   // purple
    RgbColor::rgb(0, 128, 128),   // cyan
    RgbColor::rgb(192, 192, 192), // white
    RgbColor::rgb(128, 128, 128), // bright black
    RgbColor::rgb(255, 0, 0),     // bright red
    RgbColor::rgb(0, 255, 0),     // bright green
    RgbColor::rgb(255, 255, 0),   // bright yellow
    RgbColor::rgb(0, 0, 255),     // bright blue
    RgbColor::rgb(255, 0, 255),   // bright purple
    RgbColor::rgb(0, 255, 255),   // bright cyan
    RgbColor::rgb(255, 255, 255), // bright white
];

/// A 16-slot ANSI palette
///
/// Either the fixed default table or a world-customized table substituted
/// wholesale. Resolution is a direct indexed lookup so it can run once per
/// fragment on a large stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    colors: [RgbColor; 16],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_ANSI,
        }
    }
}

impl Palette {
    /// Build a palette from a custom table; short tables fall back to the
    /// defaults for the missing slots
    pub fn custom(colors: &[RgbColor]) -> Self {
        let mut table = DEFAULT_ANSI;
        for (slot, color) in table.iter_mut().zip(colors) {
            *slot = *color;
        }
        Self { colors: table }
    }

    /// Resolve a color reference to a concrete color
    pub fn resolve(&self, color: MudColor) -> RgbColor {
        match color {
            MudColor::Ansi(code) => self.colors[usize::from(code) % 16],
            MudColor::Hex(color) => color,
        }
    }

    /// Resolve a background reference, suppressing pure black
    ///
    /// A background that resolves to black is "no background" so the
    /// renderer does not paint a black rectangle over its own canvas.
    pub fn visible_background(&self, color: MudColor) -> ColorOption {
        let resolved = self.resolve(color);
        if resolved.is_black() {
            None
        } else {
            Some(resolved)
        }
    }
}
