//! Text style flags and the font resolver
//!
//! Style flags travel on every text fragment; fonts are resolved once per
//! world-configuration change into exactly four concrete handles so the
//! per-fragment path is a branch, never a font construction.

use serde::{Deserialize, Serialize};

/// Style attributes of a text run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikeout: bool,
    pub inverse: bool,
    pub blink: bool,
    /// MXP `<high>` emphasis
    pub highlight: bool,
}

impl TextStyle {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

/// The four concrete font variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontVariant {
    Plain,
    Bold,
    Italic,
    BoldItalic,
}

impl FontVariant {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (true, true) => Self::BoldItalic,
            (true, false) => Self::Bold,
            (false, true) => Self::Italic,
            (false, false) => Self::Plain,
        }
    }
}

/// Precomputed font handles for the four variants
///
/// `F` is whatever handle the presentation layer uses. The derivation
/// closure runs once per variant at construction; `provide` never builds a
/// font. When the world disables bold or italic display the corresponding
/// slot degrades to the plain handle, so downstream attribute application
/// stays uniform.
#[derive(Debug, Clone)]
pub struct OutputFonts<F> {
    plain: F,
    bold: F,
    italic: F,
    bold_italic: F,
}

impl<F: Clone> OutputFonts<F> {
    pub fn new(base: F, show_bold: bool, show_italic: bool, derive: impl Fn(&F, FontVariant) -> F) -> Self {
        let bold = if show_bold {
            derive(&base, FontVariant::Bold)
        } else {
            base.clone()
        };
        let italic = if show_italic {
            derive(&base, FontVariant::Italic)
        } else {
            base.clone()
        };
        let bold_italic = match (show_bold, show_italic) {
            (true, true) => derive(&base, FontVariant::BoldItalic),
            (true, false) => bold.clone(),
            (false, true) => italic.clone(),
            (false, false) => base.clone(),
        };
        Self {
            plain: base,
            bold,
            italic,
            bold_italic,
        }
    }

    /// Select the precomputed handle for a flag pair
    pub fn provide(&self, bold: bool, italic: bool) -> &F {
        match FontVariant::from_flags(bold, italic) {
            FontVariant::Plain => &self.plain,
            FontVariant::Bold => &self.bold,
            FontVariant::Italic => &self.italic,
            FontVariant::BoldItalic => &self.bold_italic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(base: &String, variant: FontVariant) -> String {
        format!("{base}-{variant:?}")
    }

    #[test]
    fn test_four_variants_precomputed() {
        let fonts = OutputFonts::new("mono".to_string(), true, true, label);
        assert_eq!(fonts.provide(false, false), "mono");
        assert_eq!(fonts.provide(true, false), "mono-Bold");
        assert_eq!(fonts.provide(false, true), "mono-Italic");
        assert_eq!(fonts.provide(true, true), "mono-BoldItalic");
    }

    #[test]
    fn test_disabled_bold_degrades_to_plain() {
        let fonts = OutputFonts::new("mono".to_string(), false, true, label);
        assert_eq!(fonts.provide(true, false), "mono");
        assert_eq!(fonts.provide(true, true), "mono-Italic");
    }

    #[test]
    fn test_disabled_both_degrades_to_plain() {
        let fonts = OutputFonts::new("mono".to_string(), false, false, label);
        assert_eq!(fonts.provide(true, true), "mono");
    }
}
