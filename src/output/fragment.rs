//! Output fragment types
//!
//! These represent the semantic units produced by the decoder: text runs
//! under one style context, control effects, break markers, and protocol
//! metadata events.

use serde::{Deserialize, Serialize};

use crate::color::MudColor;
use crate::output::link::MxpLink;
use crate::output::send::SendRequest;
use crate::style::TextStyle;

/// One decoded unit of output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFragment {
    /// A run of characters sharing one style context
    Text(TextFragment),
    /// A control effect applied to the output buffer
    Effect(EffectFragment),
    /// Deferred newline; materialized lazily by the consumer
    LineBreak,
    /// Page break; consumers without paging treat it as a line break
    PageBreak,
    /// Horizontal rule marker
    Hr,
    /// Inline image reference
    Image(String),
    /// Sound cue reference
    Sound(String),
    /// Decoded telnet event, opaque to the consumer beyond dispatch
    Telnet(TelnetFragment),
    /// Server- or plugin-originated send instruction
    Send(SendRequest),
    /// MXP entity or variable definition
    MxpEntitySet {
        name: String,
        value: String,
        publish: bool,
        is_variable: bool,
    },
    /// MXP entity or variable removal
    MxpEntityUnset { name: String, is_variable: bool },
    /// Non-fatal decode-time diagnostic
    MxpError(String),
}

/// Control effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectFragment {
    Backspace,
    Beep,
    CarriageReturn,
    EraseCharacter,
    EraseLine,
}

/// Telnet direction for negotiation events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelnetSource {
    Client,
    Server,
}

/// Telnet negotiation verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelnetVerb {
    Do,
    Dont,
    Will,
    Wont,
}

/// Decoded telnet events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelnetFragment {
    /// IAC GA or IAC EOR, when not converted to a line break
    IacGa,
    /// MXP mode negotiated on or off
    Mxp { enabled: bool },
    /// Server asked for window-size reports
    Naws,
    /// An option negotiation passed through for observers
    Negotiation {
        source: TelnetSource,
        verb: TelnetVerb,
        code: u8,
    },
    /// Server toggled local echo
    SetEcho { should_echo: bool },
    /// Sub-negotiation payload, IAC escapes removed
    Subnegotiation { code: u8, data: Vec<u8> },
}

/// MXP heading level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heading {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

/// A text run under one style context
///
/// Colors are palette references, not resolved colors; resolution is
/// deferred to the consumer so one fragment stream renders under any
/// palette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub foreground: MudColor,
    pub background: MudColor,
    pub flags: TextStyle,
    /// Hyperlink/action metadata, attached to exactly this fragment
    pub link: Option<MxpLink>,
    pub heading: Option<Heading>,
}

impl TextFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            foreground: MudColor::ANSI_WHITE,
            background: MudColor::ANSI_BLACK,
            flags: TextStyle::default(),
            link: None,
            heading: None,
        }
    }

    pub fn is_bold(&self) -> bool {
        self.flags.bold
    }

    pub fn is_italic(&self) -> bool {
        self.flags.italic
    }

    pub fn is_underline(&self) -> bool {
        self.flags.underline
    }

    pub fn is_strikeout(&self) -> bool {
        self.flags.strikeout
    }

    pub fn is_inverse(&self) -> bool {
        self.flags.inverse
    }
}

impl OutputFragment {
    /// Whether this fragment can produce visible output at the consumer
    pub fn is_visual(&self) -> bool {
        matches!(
            self,
            Self::Text(_) | Self::Effect(_) | Self::LineBreak | Self::PageBreak | Self::Hr | Self::Image(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_serialization() {
        let fragment = OutputFragment::Text(TextFragment::new("hello"));
        let json = serde_json::to_string(&fragment).unwrap();
        let restored: OutputFragment = serde_json::from_str(&json).unwrap();
        assert_eq!(fragment, restored);
    }

    #[test]
    fn test_metadata_is_not_visual() {
        assert!(!OutputFragment::Telnet(TelnetFragment::IacGa).is_visual());
        assert!(!OutputFragment::Sound("alert.wav".into()).is_visual());
        assert!(OutputFragment::LineBreak.is_visual());
    }
}
