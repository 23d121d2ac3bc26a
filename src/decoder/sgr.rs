//! ANSI SGR (Select Graphic Rendition) handling
//!
//! Maps SGR parameter lists onto the decoder's active style context.
//! Parameters 0-107 follow the classic table; 38/48 consume extended
//! 256-color or truecolor arguments. Unrecognized codes are ignored
//! without an error, per the recovery policy.

use crate::color::{MudColor, RgbColor};
use crate::style::TextStyle;

/// The style context a text run is flushed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleContext {
    pub foreground: MudColor,
    pub background: MudColor,
    pub flags: TextStyle,
}

impl Default for StyleContext {
    fn default() -> Self {
        Self {
            foreground: MudColor::ANSI_WHITE,
            background: MudColor::ANSI_BLACK,
            flags: TextStyle::default(),
        }
    }
}

impl StyleContext {
    /// Foreground as carried on an emitted fragment: bold brightens the
    /// eight base palette slots to their bright counterparts
    pub fn effective_foreground(&self) -> MudColor {
        match self.foreground {
            MudColor::Ansi(code) if self.flags.bold && code < 8 => MudColor::Ansi(code + 8),
            other => other,
        }
    }
}

/// Apply an SGR parameter list to the context
pub fn apply_sgr(context: &mut StyleContext, params: &[u16]) {
    // ESC[m with no parameters means reset
    if params.is_empty() {
        *context = StyleContext::default();
        return;
    }

    let mut iter = params.iter().copied();
    while let Some(param) = iter.next() {
        match param {
            0 => *context = StyleContext::default(),
            1 => context.flags.bold = true,
            3 => context.flags.italic = true,
            4 => context.flags.underline = true,
            5 | 6 => context.flags.blink = true,
            7 => context.flags.inverse = true,
            9 => context.flags.strikeout = true,
            22 => context.flags.bold = false,
            23 => context.flags.italic = false,
            24 => context.flags.underline = false,
            25 => context.flags.blink = false,
            27 => context.flags.inverse = false,
            29 => context.flags.strikeout = false,
            30..=37 => context.foreground = MudColor::Ansi((param - 30) as u8),
            38 => {
                if let Some(color) = extended_color(&mut iter) {
                    context.foreground = color;
                }
            }
            39 => context.foreground = MudColor::ANSI_WHITE,
            40..=47 => context.background = MudColor::Ansi((param - 40) as u8),
            48 => {
                if let Some(color) = extended_color(&mut iter) {
                    context.background = color;
                }
            }
            49 => context.background = MudColor::ANSI_BLACK,
            90..=97 => context.foreground = MudColor::Ansi((param - 90 + 8) as u8),
            100..=107 => context.background = MudColor::Ansi((param - 100 + 8) as u8),
            _ => tracing::debug!(param, "ignoring unrecognized SGR code"),
        }
    }
}

/// Consume a `5;n` (xterm 256) or `2;r;g;b` (truecolor) argument tail
///
/// Both forms bypass the palette and map directly to `Hex`. A malformed
/// tail consumes what it can and yields no color change.
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<MudColor> {
    match iter.next()? {
        5 => {
            let index = iter.next()?;
            if index > 255 {
                return None;
            }
            Some(MudColor::Hex(RgbColor::xterm(index as u8)))
        }
        2 => {
            let r = iter.next()?;
            let g = iter.next()?;
            let b = iter.next()?;
            if r > 255 || g > 255 || b > 255 {
                return None;
            }
            Some(MudColor::Hex(RgbColor::rgb(r as u8, g as u8, b as u8)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(params: &[u16]) -> StyleContext {
        let mut context = StyleContext::default();
        apply_sgr(&mut context, params);
        context
    }

    #[test]
    fn test_basic_colors() {
        assert_eq!(applied(&[31]).foreground, MudColor::Ansi(1));
        assert_eq!(applied(&[44]).background, MudColor::Ansi(4));
        assert_eq!(applied(&[94]).foreground, MudColor::Ansi(12));
        assert_eq!(applied(&[101]).background, MudColor::Ansi(9));
    }

    #[test]
    fn test_reset() {
        let mut context = applied(&[1, 4, 31]);
        assert!(context.flags.bold);
        apply_sgr(&mut context, &[0]);
        assert_eq!(context, StyleContext::default());
        // Empty parameter list is also a reset
        let mut context = applied(&[31]);
        apply_sgr(&mut context, &[]);
        assert_eq!(context, StyleContext::default());
    }

    #[test]
    fn test_256_color() {
        assert_eq!(
            applied(&[38, 5, 196]).foreground,
            MudColor::Hex(RgbColor::xterm(196))
        );
        assert_eq!(
            applied(&[48, 5, 232]).background,
            MudColor::Hex(RgbColor::rgb(8, 8, 8))
        );
    }

    #[test]
    fn test_truecolor() {
        assert_eq!(
            applied(&[38, 2, 255, 128, 0]).foreground,
            MudColor::Hex(RgbColor::rgb(255, 128, 0))
        );
    }

    #[test]
    fn test_bold_brightens_base_foreground() {
        let context = applied(&[1, 31]);
        assert_eq!(context.effective_foreground(), MudColor::Ansi(9));
        // Already-bright and hex colors are untouched
        let context = applied(&[1, 91]);
        assert_eq!(context.effective_foreground(), MudColor::Ansi(9));
        let context = applied(&[1, 38, 2, 1, 2, 3]);
        assert_eq!(
            context.effective_foreground(),
            MudColor::Hex(RgbColor::rgb(1, 2, 3))
        );
    }

    #[test]
    fn test_unknown_codes_ignored() {
        let context = applied(&[31, 51, 73]);
        assert_eq!(context.foreground, MudColor::Ansi(1));
        assert_eq!(context.flags, TextStyle::default());
    }

    #[test]
    fn test_flag_toggles() {
        let mut context = applied(&[1, 3, 4, 7, 9]);
        assert!(context.flags.bold && context.flags.italic);
        apply_sgr(&mut context, &[22, 23, 24, 27, 29]);
        assert_eq!(context.flags, TextStyle::default());
    }
}
