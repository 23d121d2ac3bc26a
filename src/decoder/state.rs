//! Telnet/MXP decoder state machine
//!
//! Consumes a raw server byte stream and emits typed output fragments in
//! stream order. The decoder is driven byte-by-byte and buffers every
//! multi-byte construct (UTF-8 code points, telnet commands and
//! sub-negotiations, SGR sequences, MXP tags and entity references), so a
//! read boundary may fall anywhere without changing the decoded stream.
//!
//! Recovery policy: malformed MXP constructs degrade to literal text plus
//! one `MxpError` fragment; unrecognized SGR codes and telnet commands are
//! swallowed with a trace log; nothing a server sends can abort decoding.

use std::mem;

use crate::color::RgbColor;
use crate::decoder::mxp::{self, EntityMap, Tag};
use crate::decoder::sgr::{apply_sgr, StyleContext};
use crate::decoder::telnet;
use crate::output::{
    EffectFragment, Heading, MxpLink, OutputFragment, SendTo, TelnetFragment, TelnetSource,
    TelnetVerb, TextFragment,
};
use crate::world::{UseMxp, World};

/// Collected sub-negotiation payloads are capped so a server that never
/// sends the terminator cannot grow memory without bound.
const SUBNEGOTIATION_CAP: usize = 64 * 1024;
/// Longest accepted MXP tag body.
const TAG_CAP: usize = 4096;
/// Longest accepted entity reference name.
const ENTITY_CAP: usize = 64;

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Normal text processing
    Ground,
    /// Saw a bare CR, awaiting the byte that decides its meaning
    Cr,
    /// Saw ESC, awaiting the introducer
    Esc,
    /// Collecting CSI parameters until the final byte
    Csi,
    /// Saw IAC, awaiting the command byte
    Iac,
    /// Saw IAC WILL/WONT/DO/DONT, awaiting the option code
    Negotiate(u8),
    /// Collecting sub-negotiation payload until IAC SE
    Subnegotiation,
    /// Saw IAC within a sub-negotiation payload
    SubnegotiationIac,
    /// Inside `<...>` with MXP mode active
    MxpTag,
    /// Inside `&...;` with MXP mode active
    MxpEntity,
}

/// What an open MXP tag does when its closing tag arrives
#[derive(Debug, Clone)]
enum FrameKind {
    /// Formatting only; closing restores the snapshot
    Plain,
    /// `<send>`: enclosed text may become the link action
    Send { captured: String },
    /// `<var>`: enclosed text becomes the entity value
    Var { name: String, captured: String },
}

/// Saved state for one open MXP tag
#[derive(Debug, Clone)]
struct TagFrame {
    name: &'static str,
    context: StyleContext,
    link: Option<MxpLink>,
    heading: Option<Heading>,
    kind: FrameKind,
}

/// The streaming telnet/MXP decoder
///
/// One instance per connection; decoder state is discarded on disconnect
/// and freshly initialized on reconnect.
#[derive(Debug)]
pub struct Decoder {
    state: State,

    // World-derived options, copied at construction
    convert_ga_to_newline: bool,
    no_echo_off: bool,
    naws: bool,
    utf8: bool,
    mxp_permitted: bool,
    ignore_mxp_colour_changes: bool,
    terminal_identification: String,

    // Active style context and the coalescing run
    context: StyleContext,
    text: String,
    link: Option<MxpLink>,
    heading: Option<Heading>,

    // UTF-8 buffering
    utf8_buffer: Vec<u8>,
    utf8_remaining: u8,

    // CSI parameters
    params: Vec<u16>,
    current_param: u16,
    param_has_digit: bool,

    // Telnet sub-negotiation
    subnegotiation_code: Option<u8>,
    subnegotiation_data: Vec<u8>,

    // MXP
    mxp_active: bool,
    tag_buffer: String,
    tag_quote: Option<char>,
    entity_buffer: String,
    tag_stack: Vec<TagFrame>,
    entities: EntityMap,

    // Negotiation replies awaiting transmission
    responses: Vec<u8>,
}

impl Decoder {
    /// Create a decoder configured for one world
    pub fn new(world: &World) -> Self {
        Self {
            state: State::Ground,
            convert_ga_to_newline: world.convert_ga_to_newline,
            no_echo_off: world.no_echo_off,
            naws: world.naws,
            utf8: world.utf_8,
            mxp_permitted: world.mxp_permitted(),
            ignore_mxp_colour_changes: world.ignore_mxp_colour_changes,
            terminal_identification: world.terminal_identification.clone(),
            context: StyleContext::default(),
            text: String::new(),
            link: None,
            heading: None,
            utf8_buffer: Vec::with_capacity(4),
            utf8_remaining: 0,
            params: Vec::with_capacity(16),
            current_param: 0,
            param_has_digit: false,
            subnegotiation_code: None,
            subnegotiation_data: Vec::with_capacity(64),
            mxp_active: world.use_mxp == UseMxp::Always,
            tag_buffer: String::new(),
            tag_quote: None,
            entity_buffer: String::new(),
            tag_stack: Vec::new(),
            entities: EntityMap::new(),
            responses: Vec::new(),
        }
    }

    /// Whether MXP markup is currently honored
    pub fn mxp_active(&self) -> bool {
        self.mxp_active
    }

    /// Process a chunk of bytes, appending completed fragments
    ///
    /// A trailing text run stays buffered for coalescing; call [`flush`]
    /// when the chunk batch is handed to a consumer.
    ///
    /// [`flush`]: Self::flush
    pub fn receive(&mut self, data: &[u8], out: &mut Vec<OutputFragment>) {
        for &byte in data {
            self.process_byte(byte, out);
        }
    }

    /// Flush the pending coalesced text run, if any
    pub fn flush(&mut self, out: &mut Vec<OutputFragment>) {
        self.flush_text(out);
    }

    /// Take the negotiation replies produced so far
    ///
    /// The session writes these back to the server after each receive.
    pub fn drain_responses(&mut self) -> Vec<u8> {
        mem::take(&mut self.responses)
    }

    fn process_byte(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        match self.state {
            State::Ground => self.process_ground(byte, out),
            State::Cr => self.process_cr(byte, out),
            State::Esc => self.process_esc(byte),
            State::Csi => self.process_csi(byte, out),
            State::Iac => self.process_iac(byte, out),
            State::Negotiate(verb) => {
                self.state = State::Ground;
                self.handle_negotiation(verb, byte, out);
            }
            State::Subnegotiation => self.process_subnegotiation(byte),
            State::SubnegotiationIac => self.process_subnegotiation_iac(byte, out),
            State::MxpTag => self.process_mxp_tag(byte, out),
            State::MxpEntity => self.process_mxp_entity(byte, out),
        }
    }

    // ------------------------------------------------------------------
    // Ground and line handling
    // ------------------------------------------------------------------

    fn process_ground(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        if self.utf8_remaining > 0 {
            self.process_utf8_continuation(byte, out);
            return;
        }
        match byte {
            telnet::IAC => self.state = State::Iac,
            b'\r' => self.state = State::Cr,
            b'\n' => {
                self.flush_text(out);
                out.push(OutputFragment::LineBreak);
            }
            0x08 => {
                self.flush_text(out);
                out.push(OutputFragment::Effect(EffectFragment::Backspace));
            }
            0x07 => {
                self.flush_text(out);
                out.push(OutputFragment::Effect(EffectFragment::Beep));
            }
            0x1B => self.state = State::Esc,
            b'<' if self.mxp_active => {
                self.tag_buffer.clear();
                self.tag_quote = None;
                self.state = State::MxpTag;
            }
            b'&' if self.mxp_active => {
                self.entity_buffer.clear();
                self.state = State::MxpEntity;
            }
            0x00..=0x1F => {
                tracing::debug!(byte, "ignoring C0 control");
            }
            0x20..=0x7E => self.push_text_char(byte as char),
            0x7F => {}
            0x80..=0xFF => {
                if self.utf8 {
                    self.start_utf8(byte);
                } else {
                    // Latin-1 fallback for worlds that opt out of UTF-8
                    self.push_text_char(char::from(byte));
                }
            }
        }
    }

    fn process_cr(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        self.state = State::Ground;
        if byte == b'\n' {
            self.flush_text(out);
            out.push(OutputFragment::LineBreak);
        } else {
            // Bare CR: the consumer decides whether it erases or appends
            self.flush_text(out);
            out.push(OutputFragment::Effect(EffectFragment::CarriageReturn));
            self.process_byte(byte, out);
        }
    }

    // ------------------------------------------------------------------
    // UTF-8
    // ------------------------------------------------------------------

    fn start_utf8(&mut self, byte: u8) {
        self.utf8_buffer.clear();
        self.utf8_buffer.push(byte);
        self.utf8_remaining = match byte {
            0xC0..=0xDF => 1,
            0xE0..=0xEF => 2,
            0xF0..=0xF7 => 3,
            _ => {
                // Invalid start byte
                self.utf8_buffer.clear();
                self.push_text_char('\u{FFFD}');
                return;
            }
        };
    }

    fn process_utf8_continuation(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        if (0x80..=0xBF).contains(&byte) {
            self.utf8_buffer.push(byte);
            self.utf8_remaining -= 1;
            if self.utf8_remaining == 0 {
                match std::str::from_utf8(&self.utf8_buffer) {
                    Ok(s) => {
                        let c = s.chars().next().unwrap_or('\u{FFFD}');
                        self.push_text_char(c);
                    }
                    Err(_) => self.push_text_char('\u{FFFD}'),
                }
                self.utf8_buffer.clear();
            }
        } else {
            // Truncated sequence: replace it and reprocess this byte
            self.utf8_buffer.clear();
            self.utf8_remaining = 0;
            self.push_text_char('\u{FFFD}');
            self.process_byte(byte, out);
        }
    }

    // ------------------------------------------------------------------
    // ANSI escape sequences
    // ------------------------------------------------------------------

    fn process_esc(&mut self, byte: u8) {
        match byte {
            b'[' => {
                self.clear_params();
                self.state = State::Csi;
            }
            _ => {
                tracing::debug!(byte, "ignoring non-CSI escape sequence");
                self.state = State::Ground;
            }
        }
    }

    fn clear_params(&mut self) {
        self.params.clear();
        self.current_param = 0;
        self.param_has_digit = false;
    }

    fn finish_params(&mut self) {
        if self.param_has_digit || !self.params.is_empty() {
            self.params.push(self.current_param);
        }
    }

    fn process_csi(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        match byte {
            b'0'..=b'9' => {
                self.current_param = self
                    .current_param
                    .saturating_mul(10)
                    .saturating_add(u16::from(byte - b'0'));
                self.param_has_digit = true;
            }
            b';' => {
                self.params.push(self.current_param);
                self.current_param = 0;
                self.param_has_digit = false;
            }
            b'm' => {
                self.finish_params();
                let params = mem::take(&mut self.params);
                // A no-op SGR (reset while already at defaults) must not
                // split the coalesced text run
                let mut next = self.context;
                apply_sgr(&mut next, &params);
                if next != self.context {
                    self.flush_text(out);
                    self.context = next;
                }
                self.state = State::Ground;
            }
            b'z' => {
                self.finish_params();
                let mode = self.params.first().copied().unwrap_or(0);
                self.handle_mxp_line_mode(mode, out);
                self.state = State::Ground;
            }
            0x40..=0x7E => {
                // Cursor movement and friends have no meaning in a MUD
                // output stream
                self.finish_params();
                tracing::debug!(final_byte = byte, "ignoring CSI sequence");
                self.state = State::Ground;
            }
            0x18 | 0x1A => self.state = State::Ground,
            0x1B => self.state = State::Esc,
            _ => {
                // Intermediate and private-marker bytes are collected
                // nowhere; MUD servers do not send them meaningfully
            }
        }
    }

    /// `ESC[<n>z`, the MXP line-security tag
    fn handle_mxp_line_mode(&mut self, mode: u16, out: &mut Vec<OutputFragment>) {
        if !self.mxp_permitted {
            return;
        }
        match mode {
            // Open, secure and locked lines, plus their lock variants,
            // all imply the server is speaking MXP
            0 | 1 | 2 | 5 | 6 | 7 => self.mxp_active = true,
            3 => self.close_all_tags(out),
            _ => tracing::debug!(mode, "ignoring MXP line mode"),
        }
    }

    // ------------------------------------------------------------------
    // Telnet
    // ------------------------------------------------------------------

    fn process_iac(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        self.state = State::Ground;
        match byte {
            telnet::IAC => {
                // Escaped data byte; never valid UTF-8
                let c = if self.utf8 { '\u{FFFD}' } else { char::from(0xFF) };
                self.push_text_char(c);
            }
            telnet::GA | telnet::EOR => {
                self.flush_text(out);
                if self.convert_ga_to_newline {
                    out.push(OutputFragment::LineBreak);
                } else {
                    out.push(OutputFragment::Telnet(TelnetFragment::IacGa));
                }
            }
            telnet::EC => {
                self.flush_text(out);
                out.push(OutputFragment::Effect(EffectFragment::EraseCharacter));
            }
            telnet::EL => {
                self.flush_text(out);
                out.push(OutputFragment::Effect(EffectFragment::EraseLine));
            }
            telnet::SB => {
                self.subnegotiation_code = None;
                self.subnegotiation_data.clear();
                self.state = State::Subnegotiation;
            }
            telnet::WILL | telnet::WONT | telnet::DO | telnet::DONT => {
                self.state = State::Negotiate(byte);
            }
            telnet::NOP => {}
            _ => tracing::debug!(command = byte, "ignoring telnet command"),
        }
    }

    fn handle_negotiation(&mut self, verb: u8, code: u8, out: &mut Vec<OutputFragment>) {
        self.flush_text(out);
        out.push(OutputFragment::Telnet(TelnetFragment::Negotiation {
            source: TelnetSource::Server,
            verb: verb_enum(verb),
            code,
        }));
        tracing::debug!(
            verb = ?verb_enum(verb),
            option = telnet::option_name(code),
            "server negotiation"
        );

        match verb {
            telnet::WILL => match code {
                telnet::ECHO => {
                    self.respond(telnet::DO, code, out);
                    out.push(OutputFragment::Telnet(TelnetFragment::SetEcho {
                        should_echo: false,
                    }));
                }
                telnet::SUPPRESS_GO_AHEAD | telnet::EOR_OPTION => {
                    self.respond(telnet::DO, code, out);
                }
                telnet::MXP if self.mxp_permitted => {
                    self.respond(telnet::DO, code, out);
                    self.enable_mxp(out);
                }
                _ => self.respond(telnet::DONT, code, out),
            },
            telnet::WONT => {
                if code == telnet::ECHO && !self.no_echo_off {
                    out.push(OutputFragment::Telnet(TelnetFragment::SetEcho {
                        should_echo: true,
                    }));
                }
                if code == telnet::MXP {
                    self.disable_mxp(out);
                }
                self.respond(telnet::DONT, code, out);
            }
            telnet::DO => match code {
                telnet::TERMINAL_TYPE | telnet::SUPPRESS_GO_AHEAD => {
                    self.respond(telnet::WILL, code, out);
                }
                telnet::NAWS if self.naws => {
                    self.respond(telnet::WILL, code, out);
                    out.push(OutputFragment::Telnet(TelnetFragment::Naws));
                }
                telnet::MXP if self.mxp_permitted => {
                    self.respond(telnet::WILL, code, out);
                    self.enable_mxp(out);
                }
                _ => self.respond(telnet::WONT, code, out),
            },
            _ => {
                // DONT
                if code == telnet::MXP {
                    self.disable_mxp(out);
                }
                self.respond(telnet::WONT, code, out);
            }
        }
    }

    fn respond(&mut self, verb: u8, code: u8, out: &mut Vec<OutputFragment>) {
        telnet::write_negotiation(&mut self.responses, verb, code);
        out.push(OutputFragment::Telnet(TelnetFragment::Negotiation {
            source: TelnetSource::Client,
            verb: verb_enum(verb),
            code,
        }));
    }

    fn enable_mxp(&mut self, out: &mut Vec<OutputFragment>) {
        if !self.mxp_active {
            self.mxp_active = true;
            out.push(OutputFragment::Telnet(TelnetFragment::Mxp { enabled: true }));
        }
    }

    fn disable_mxp(&mut self, out: &mut Vec<OutputFragment>) {
        if self.mxp_active {
            self.close_all_tags(out);
            self.mxp_active = false;
            out.push(OutputFragment::Telnet(TelnetFragment::Mxp { enabled: false }));
        }
    }

    fn process_subnegotiation(&mut self, byte: u8) {
        if self.subnegotiation_code.is_none() {
            self.subnegotiation_code = Some(byte);
            return;
        }
        if byte == telnet::IAC {
            self.state = State::SubnegotiationIac;
            return;
        }
        self.subnegotiation_data.push(byte);
        if self.subnegotiation_data.len() > SUBNEGOTIATION_CAP {
            tracing::warn!(
                code = self.subnegotiation_code,
                "sub-negotiation exceeded cap; flushing as text"
            );
            let data = mem::take(&mut self.subnegotiation_data);
            for c in String::from_utf8_lossy(&data).chars() {
                self.push_text_char(c);
            }
            self.state = State::Ground;
        }
    }

    fn process_subnegotiation_iac(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        match byte {
            telnet::SE => {
                self.state = State::Ground;
                self.finish_subnegotiation(out);
            }
            telnet::IAC => {
                // Escaped 0xFF data byte
                self.subnegotiation_data.push(telnet::IAC);
                self.state = State::Subnegotiation;
            }
            _ => {
                tracing::debug!(byte, "stray IAC inside sub-negotiation");
                self.subnegotiation_data.push(telnet::IAC);
                self.subnegotiation_data.push(byte);
                self.state = State::Subnegotiation;
            }
        }
    }

    fn finish_subnegotiation(&mut self, out: &mut Vec<OutputFragment>) {
        let code = self.subnegotiation_code.take().unwrap_or(0);
        let data = mem::take(&mut self.subnegotiation_data);
        if code == telnet::TERMINAL_TYPE && data.first() == Some(&telnet::TTYPE_SEND) {
            telnet::write_terminal_type(&mut self.responses, &self.terminal_identification);
        }
        self.flush_text(out);
        out.push(OutputFragment::Telnet(TelnetFragment::Subnegotiation {
            code,
            data,
        }));
    }

    // ------------------------------------------------------------------
    // MXP tags
    // ------------------------------------------------------------------

    fn process_mxp_tag(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        let c = char::from(byte);
        match c {
            '>' if self.tag_quote.is_none() => {
                self.state = State::Ground;
                let body = mem::take(&mut self.tag_buffer);
                self.handle_mxp_tag(&body, out);
            }
            '\r' | '\n' => {
                self.mxp_tag_failed("MXP tag interrupted by line break", out);
                self.process_byte(byte, out);
            }
            '"' | '\'' => {
                match self.tag_quote {
                    None => self.tag_quote = Some(c),
                    Some(q) if q == c => self.tag_quote = None,
                    Some(_) => {}
                }
                self.tag_buffer.push(c);
            }
            _ => {
                self.tag_buffer.push(c);
                if self.tag_buffer.len() > TAG_CAP {
                    self.mxp_tag_failed("MXP tag exceeded length cap", out);
                }
            }
        }
    }

    /// Degrade the collected tag to literal text plus one error fragment
    fn mxp_tag_failed(&mut self, message: &str, out: &mut Vec<OutputFragment>) {
        self.state = State::Ground;
        self.tag_quote = None;
        let body = mem::take(&mut self.tag_buffer);
        self.flush_text(out);
        out.push(OutputFragment::MxpError(message.to_owned()));
        self.push_text_char('<');
        for c in body.chars() {
            self.push_text_char(c);
        }
    }

    fn handle_mxp_tag(&mut self, body: &str, out: &mut Vec<OutputFragment>) {
        let tag = match Tag::parse(body) {
            Ok(tag) => tag,
            Err(message) => {
                self.flush_text(out);
                out.push(OutputFragment::MxpError(message));
                self.push_text_char('<');
                for c in body.chars() {
                    self.push_text_char(c);
                }
                self.push_text_char('>');
                return;
            }
        };
        if tag.is_closing {
            self.close_tag(&tag.name, out);
        } else {
            self.open_tag(&tag, out);
        }
    }

    fn open_tag(&mut self, tag: &Tag, out: &mut Vec<OutputFragment>) {
        match tag.name.as_str() {
            "b" | "bold" | "strong" => {
                self.push_frame("b", FrameKind::Plain, out);
                self.context.flags.bold = true;
            }
            "i" | "italic" | "em" => {
                self.push_frame("i", FrameKind::Plain, out);
                self.context.flags.italic = true;
            }
            "u" | "underline" => {
                self.push_frame("u", FrameKind::Plain, out);
                self.context.flags.underline = true;
            }
            "s" | "strikeout" | "strike" => {
                self.push_frame("s", FrameKind::Plain, out);
                self.context.flags.strikeout = true;
            }
            "h" | "high" => {
                self.push_frame("h", FrameKind::Plain, out);
                self.context.flags.highlight = true;
            }
            "c" | "color" | "colour" => {
                self.push_frame("c", FrameKind::Plain, out);
                if !self.ignore_mxp_colour_changes {
                    let fore = tag.get("fore").or_else(|| tag.positional(0));
                    let back = tag.get("back").or_else(|| tag.positional(1));
                    self.apply_mxp_colors(fore, back);
                }
            }
            "font" => {
                self.push_frame("font", FrameKind::Plain, out);
                if !self.ignore_mxp_colour_changes {
                    let fore = tag.get("color").or_else(|| tag.get("fgcolor"));
                    let back = tag.get("back").or_else(|| tag.get("bgcolor"));
                    // FONT color may be a comma list; the first entry is
                    // the actual color
                    self.apply_mxp_colors(
                        fore.map(|v| v.split(',').next().unwrap_or(v)),
                        back,
                    );
                }
            }
            "a" => {
                self.push_frame("a", FrameKind::Plain, out);
                let href = tag
                    .get("href")
                    .or_else(|| tag.positional(0))
                    .unwrap_or_default();
                let mut link = MxpLink::new(href, SendTo::Internet);
                link.hint = tag.get("hint").map(str::to_owned);
                self.link = Some(link);
            }
            "send" => {
                let href = tag.get("href").or_else(|| tag.positional(0));
                let action = href.unwrap_or("&text;").to_owned();
                let sendto = if tag.has_flag("prompt") {
                    SendTo::Input
                } else {
                    SendTo::World
                };
                let mut link = MxpLink::new(action, sendto);
                if let Some(hint) = tag.get("hint") {
                    // hint="tooltip|menu caption|menu caption" carries the
                    // choice menu after the first entry
                    let mut parts = hint.split('|');
                    link.hint = parts.next().map(str::to_owned);
                    link.prompts = parts.map(str::to_owned).collect();
                }
                let kind = FrameKind::Send {
                    captured: String::new(),
                };
                self.push_frame("send", kind, out);
                self.link = Some(link);
            }
            "br" | "sbr" => {
                self.flush_text(out);
                out.push(OutputFragment::LineBreak);
            }
            "hr" => {
                self.flush_text(out);
                out.push(OutputFragment::Hr);
            }
            "p" => {
                self.push_frame("p", FrameKind::Plain, out);
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let (name, heading) = match tag.name.as_str() {
                    "h1" => ("h1", Heading::H1),
                    "h2" => ("h2", Heading::H2),
                    "h3" => ("h3", Heading::H3),
                    "h4" => ("h4", Heading::H4),
                    "h5" => ("h5", Heading::H5),
                    _ => ("h6", Heading::H6),
                };
                self.push_frame(name, FrameKind::Plain, out);
                self.heading = Some(heading);
            }
            "image" | "img" => {
                let url = tag.get("url").unwrap_or_default();
                let fname = tag
                    .get("fname")
                    .or_else(|| tag.positional(0))
                    .unwrap_or_default();
                self.flush_text(out);
                out.push(OutputFragment::Image(format!("{url}{fname}")));
            }
            "sound" | "music" => {
                let location = tag
                    .get("fname")
                    .or_else(|| tag.positional(0))
                    .unwrap_or_default();
                self.flush_text(out);
                out.push(OutputFragment::Sound(location.to_owned()));
            }
            "var" | "v" => {
                let name = tag
                    .get("name")
                    .or_else(|| tag.positional(0))
                    .unwrap_or_default()
                    .to_owned();
                self.push_frame("var", FrameKind::Var {
                    name,
                    captured: String::new(),
                }, out);
            }
            "!entity" | "!en" => self.handle_entity_definition(tag, out),
            "version" => {
                let reply = format!(
                    "<VERSION MXP=1.0 CLIENT=mudlark VERSION={}>\r\n",
                    env!("CARGO_PKG_VERSION")
                );
                self.responses.extend_from_slice(reply.as_bytes());
            }
            "support" => {
                let reply = "<SUPPORTS +b +i +u +s +h +color +font +a +send \
                             +br +sbr +hr +p +h1 +h2 +h3 +h4 +h5 +h6 +image \
                             +sound +var +version +support>\r\n";
                self.responses.extend_from_slice(reply.as_bytes());
            }
            name => tracing::debug!(name, "ignoring unsupported MXP tag"),
        }
    }

    fn apply_mxp_colors(&mut self, fore: Option<&str>, back: Option<&str>) {
        if let Some(color) = fore.and_then(RgbColor::parse) {
            self.context.foreground = crate::color::MudColor::Hex(color);
        }
        if let Some(color) = back.and_then(RgbColor::parse) {
            self.context.background = crate::color::MudColor::Hex(color);
        }
    }

    /// `<!ENTITY name value [PRIVATE|PUBLISH|DELETE]>`
    fn handle_entity_definition(&mut self, tag: &Tag, out: &mut Vec<OutputFragment>) {
        let Some(name) = tag.positional(0).map(str::to_owned) else {
            self.flush_text(out);
            out.push(OutputFragment::MxpError("!ENTITY without a name".to_owned()));
            return;
        };
        self.flush_text(out);
        if tag.has_flag("delete") || tag.has_flag("remove") {
            self.entities.unset(&name);
            out.push(OutputFragment::MxpEntityUnset {
                name,
                is_variable: false,
            });
            return;
        }
        let value = tag.positional(1).unwrap_or_default().to_owned();
        let publish = tag.has_flag("publish");
        self.entities.set(&name, &value);
        out.push(OutputFragment::MxpEntitySet {
            name,
            value,
            publish,
            is_variable: false,
        });
    }

    /// Snapshot the current context before a paired tag modifies it
    fn push_frame(&mut self, name: &'static str, kind: FrameKind, out: &mut Vec<OutputFragment>) {
        self.flush_text(out);
        self.tag_stack.push(TagFrame {
            name,
            context: self.context,
            link: self.link.clone(),
            heading: self.heading,
            kind,
        });
    }

    fn canonical_tag_name(name: &str) -> &str {
        match name {
            "bold" | "strong" => "b",
            "italic" | "em" => "i",
            "underline" => "u",
            "strikeout" | "strike" => "s",
            "high" => "h",
            "color" | "colour" => "c",
            "v" => "var",
            other => other,
        }
    }

    fn close_tag(&mut self, name: &str, out: &mut Vec<OutputFragment>) {
        let canonical = Self::canonical_tag_name(name);
        let Some(index) = self.tag_stack.iter().rposition(|f| f.name == canonical) else {
            tracing::debug!(name, "closing tag without matching open tag");
            return;
        };
        // Unclosed inner tags are discarded along with the matched frame
        let mut popped = self.tag_stack.split_off(index);
        let frame = popped.remove(0);

        match frame.kind {
            FrameKind::Plain => self.flush_text(out),
            FrameKind::Send { captured } => {
                if let Some(link) = &mut self.link {
                    if link.action.contains("&text;") {
                        link.action = link.action.replace("&text;", captured.trim());
                    }
                }
                self.flush_text(out);
            }
            FrameKind::Var { name, captured } => {
                self.flush_text(out);
                self.entities.set(&name, &captured);
                out.push(OutputFragment::MxpEntitySet {
                    name,
                    value: captured,
                    publish: false,
                    is_variable: true,
                });
            }
        }

        self.context = frame.context;
        self.link = frame.link;
        self.heading = frame.heading;
    }

    /// Pop every open tag, restoring the outermost snapshot
    fn close_all_tags(&mut self, out: &mut Vec<OutputFragment>) {
        if let Some(outermost) = self.tag_stack.first().cloned() {
            self.flush_text(out);
            self.context = outermost.context;
            self.link = outermost.link;
            self.heading = outermost.heading;
            self.tag_stack.clear();
        }
    }

    // ------------------------------------------------------------------
    // MXP entities
    // ------------------------------------------------------------------

    fn process_mxp_entity(&mut self, byte: u8, out: &mut Vec<OutputFragment>) {
        if byte == b';' {
            self.state = State::Ground;
            let name = mem::take(&mut self.entity_buffer);
            match self.entities.resolve(&name) {
                Some(value) => {
                    for c in value.chars() {
                        self.push_text_char(c);
                    }
                }
                None => {
                    self.flush_text(out);
                    out.push(OutputFragment::MxpError(format!("unknown entity &{name};")));
                    self.push_text_char('&');
                    for c in name.chars() {
                        self.push_text_char(c);
                    }
                    self.push_text_char(';');
                }
            }
            return;
        }
        if mxp::is_entity_byte(byte) && self.entity_buffer.len() < ENTITY_CAP {
            self.entity_buffer.push(char::from(byte));
            return;
        }
        // Not an entity after all; degrade to literal text
        self.state = State::Ground;
        let name = mem::take(&mut self.entity_buffer);
        self.push_text_char('&');
        for c in name.chars() {
            self.push_text_char(c);
        }
        self.process_byte(byte, out);
    }

    // ------------------------------------------------------------------
    // Text coalescing
    // ------------------------------------------------------------------

    fn push_text_char(&mut self, c: char) {
        self.text.push(c);
        for frame in &mut self.tag_stack {
            match &mut frame.kind {
                FrameKind::Send { captured } | FrameKind::Var { captured, .. } => {
                    captured.push(c);
                }
                FrameKind::Plain => {}
            }
        }
    }

    fn flush_text(&mut self, out: &mut Vec<OutputFragment>) {
        if self.text.is_empty() {
            return;
        }
        out.push(OutputFragment::Text(TextFragment {
            text: mem::take(&mut self.text),
            foreground: self.context.effective_foreground(),
            background: self.context.background,
            flags: self.context.flags,
            link: self.link.clone(),
            heading: self.heading,
        }));
    }
}

fn verb_enum(verb: u8) -> TelnetVerb {
    match verb {
        telnet::WILL => TelnetVerb::Will,
        telnet::WONT => TelnetVerb::Wont,
        telnet::DO => TelnetVerb::Do,
        _ => TelnetVerb::Dont,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::MudColor;
    use crate::world::World;

    fn mxp_world() -> World {
        World {
            use_mxp: UseMxp::Always,
            ..World::default()
        }
    }

    fn decode(world: &World, data: &[u8]) -> Vec<OutputFragment> {
        let mut decoder = Decoder::new(world);
        let mut out = Vec::new();
        decoder.receive(data, &mut out);
        decoder.flush(&mut out);
        out
    }

    fn text_of(fragment: &OutputFragment) -> &str {
        match fragment {
            OutputFragment::Text(t) => &t.text,
            other => panic!("expected text fragment, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_coalesces() {
        let fragments = decode(&World::default(), b"Hello, world");
        assert_eq!(fragments.len(), 1);
        assert_eq!(text_of(&fragments[0]), "Hello, world");
    }

    #[test]
    fn test_crlf_collapses_to_one_break() {
        let fragments = decode(&World::default(), b"one\r\ntwo");
        assert_eq!(fragments.len(), 3);
        assert_eq!(text_of(&fragments[0]), "one");
        assert_eq!(fragments[1], OutputFragment::LineBreak);
        assert_eq!(text_of(&fragments[2]), "two");
    }

    #[test]
    fn test_bare_cr_surfaces_as_effect() {
        let fragments = decode(&World::default(), b"one\rtwo");
        assert_eq!(
            fragments[1],
            OutputFragment::Effect(EffectFragment::CarriageReturn)
        );
        assert_eq!(text_of(&fragments[2]), "two");
    }

    #[test]
    fn test_sgr_forces_flush_and_recolors() {
        let fragments = decode(&World::default(), b"gray\x1b[31mred");
        assert_eq!(fragments.len(), 2);
        let red = match &fragments[1] {
            OutputFragment::Text(t) => t,
            other => panic!("{other:?}"),
        };
        assert_eq!(red.text, "red");
        assert_eq!(red.foreground, MudColor::Ansi(1));
    }

    #[test]
    fn test_sgr_identical_context_still_coalesces() {
        // A reset while already at defaults must not split the run
        let fragments = decode(&World::default(), b"a\x1b[0mb");
        assert_eq!(fragments.len(), 1);
        assert_eq!(text_of(&fragments[0]), "ab");
    }

    #[test]
    fn test_bold_brightens_at_flush() {
        let fragments = decode(&World::default(), b"\x1b[1;31mhot");
        let t = match &fragments[0] {
            OutputFragment::Text(t) => t,
            other => panic!("{other:?}"),
        };
        assert_eq!(t.foreground, MudColor::Ansi(9));
        assert!(t.flags.bold);
    }

    #[test]
    fn test_utf8_across_chunks() {
        let mut decoder = Decoder::new(&World::default());
        let mut out = Vec::new();
        decoder.receive(&[0xE4], &mut out);
        decoder.receive(&[0xB8], &mut out);
        decoder.receive(&[0x96], &mut out);
        decoder.flush(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(text_of(&out[0]), "\u{4E16}");
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let fragments = decode(&World::default(), &[0xE4, b'x']);
        assert_eq!(text_of(&fragments[0]), "\u{FFFD}x");
    }

    #[test]
    fn test_latin1_world() {
        let world = World {
            utf_8: false,
            ..World::default()
        };
        let fragments = decode(&world, &[b'a', 0xE9, b'b']);
        assert_eq!(text_of(&fragments[0]), "a\u{E9}b");
    }

    #[test]
    fn test_subnegotiation_event() {
        let fragments = decode(
            &World::default(),
            &[telnet::IAC, telnet::SB, 201, b'h', b'i', telnet::IAC, telnet::SE],
        );
        assert_eq!(
            fragments[0],
            OutputFragment::Telnet(TelnetFragment::Subnegotiation {
                code: 201,
                data: b"hi".to_vec(),
            })
        );
    }

    #[test]
    fn test_subnegotiation_iac_unescaping() {
        let fragments = decode(
            &World::default(),
            &[
                telnet::IAC,
                telnet::SB,
                201,
                telnet::IAC,
                telnet::IAC,
                7,
                telnet::IAC,
                telnet::SE,
            ],
        );
        assert_eq!(
            fragments[0],
            OutputFragment::Telnet(TelnetFragment::Subnegotiation {
                code: 201,
                data: vec![255, 7],
            })
        );
    }

    #[test]
    fn test_ga_conversion_toggle() {
        let ga = [telnet::IAC, telnet::GA];
        let fragments = decode(&World::default(), &ga);
        assert_eq!(fragments[0], OutputFragment::Telnet(TelnetFragment::IacGa));

        let world = World {
            convert_ga_to_newline: true,
            ..World::default()
        };
        let fragments = decode(&world, &ga);
        assert_eq!(fragments[0], OutputFragment::LineBreak);
    }

    #[test]
    fn test_echo_negotiation() {
        let fragments = decode(&World::default(), &[telnet::IAC, telnet::WILL, telnet::ECHO]);
        assert!(fragments.contains(&OutputFragment::Telnet(TelnetFragment::SetEcho {
            should_echo: false,
        })));
    }

    #[test]
    fn test_echo_off_suppressed_by_world() {
        let world = World {
            no_echo_off: true,
            ..World::default()
        };
        let fragments = decode(&world, &[telnet::IAC, telnet::WONT, telnet::ECHO]);
        assert!(!fragments
            .iter()
            .any(|f| matches!(f, OutputFragment::Telnet(TelnetFragment::SetEcho { .. }))));
    }

    #[test]
    fn test_mxp_negotiation_enables_markup() {
        let mut decoder = Decoder::new(&World::default());
        let mut out = Vec::new();
        decoder.receive(&[telnet::IAC, telnet::WILL, telnet::MXP], &mut out);
        assert!(decoder.mxp_active());
        assert!(out.contains(&OutputFragment::Telnet(TelnetFragment::Mxp { enabled: true })));
        let responses = decoder.drain_responses();
        assert_eq!(responses, [telnet::IAC, telnet::DO, telnet::MXP]);
    }

    #[test]
    fn test_mxp_refused_when_never() {
        let world = World {
            use_mxp: UseMxp::Never,
            ..World::default()
        };
        let mut decoder = Decoder::new(&world);
        let mut out = Vec::new();
        decoder.receive(&[telnet::IAC, telnet::WILL, telnet::MXP], &mut out);
        assert!(!decoder.mxp_active());
        assert_eq!(
            decoder.drain_responses(),
            [telnet::IAC, telnet::DONT, telnet::MXP]
        );
    }

    #[test]
    fn test_terminal_type_reply() {
        let mut decoder = Decoder::new(&World::default());
        let mut out = Vec::new();
        decoder.receive(
            &[
                telnet::IAC,
                telnet::SB,
                telnet::TERMINAL_TYPE,
                telnet::TTYPE_SEND,
                telnet::IAC,
                telnet::SE,
            ],
            &mut out,
        );
        let responses = decoder.drain_responses();
        assert!(responses.windows(7).any(|w| w == b"mudlark"));
    }

    #[test]
    fn test_mxp_bold_tag() {
        let fragments = decode(&mxp_world(), b"a<B>b</B>c");
        assert_eq!(fragments.len(), 3);
        assert!(matches!(&fragments[1], OutputFragment::Text(t) if t.flags.bold));
        assert!(matches!(&fragments[2], OutputFragment::Text(t) if !t.flags.bold));
    }

    #[test]
    fn test_mxp_color_tag() {
        let fragments = decode(&mxp_world(), b"<COLOR red>r</COLOR>");
        let t = match &fragments[0] {
            OutputFragment::Text(t) => t,
            other => panic!("{other:?}"),
        };
        assert_eq!(t.foreground, MudColor::Hex(RgbColor::rgb(255, 0, 0)));
    }

    #[test]
    fn test_mxp_color_changes_ignored_by_world() {
        let world = World {
            use_mxp: UseMxp::Always,
            ignore_mxp_colour_changes: true,
            ..World::default()
        };
        let fragments = decode(&world, b"<COLOR red>r</COLOR>");
        let t = match &fragments[0] {
            OutputFragment::Text(t) => t,
            other => panic!("{other:?}"),
        };
        assert_eq!(t.foreground, MudColor::ANSI_WHITE);
    }

    #[test]
    fn test_mxp_send_link_with_href() {
        let fragments = decode(
            &mxp_world(),
            br#"<SEND href="buy bread" hint="Buy|bread|cake">bakery</SEND>"#,
        );
        let t = match &fragments[0] {
            OutputFragment::Text(t) => t,
            other => panic!("{other:?}"),
        };
        assert_eq!(t.text, "bakery");
        let link = t.link.as_ref().unwrap();
        assert_eq!(link.action, "buy bread");
        assert_eq!(link.hint.as_deref(), Some("Buy"));
        assert_eq!(link.prompts, ["bread", "cake"]);
        assert_eq!(link.sendto, SendTo::World);
    }

    #[test]
    fn test_mxp_send_link_captures_text() {
        let fragments = decode(&mxp_world(), b"<SEND>north</SEND>");
        let t = match &fragments[0] {
            OutputFragment::Text(t) => t,
            other => panic!("{other:?}"),
        };
        assert_eq!(t.link.as_ref().unwrap().action, "north");
    }

    #[test]
    fn test_mxp_entity_expansion() {
        let fragments = decode(&mxp_world(), b"fish &amp; chips");
        assert_eq!(text_of(&fragments[0]), "fish & chips");
    }

    #[test]
    fn test_mxp_unknown_entity_degrades() {
        let fragments = decode(&mxp_world(), b"&bogus;");
        assert!(matches!(&fragments[0], OutputFragment::MxpError(_)));
        assert_eq!(text_of(&fragments[1]), "&bogus;");
    }

    #[test]
    fn test_mxp_entity_definition_events() {
        let fragments = decode(&mxp_world(), br#"<!ENTITY weather "light rain" PUBLISH>"#);
        assert_eq!(
            fragments[0],
            OutputFragment::MxpEntitySet {
                name: "weather".to_owned(),
                value: "light rain".to_owned(),
                publish: true,
                is_variable: false,
            }
        );
        let fragments = decode(&mxp_world(), b"<!ENTITY weather DELETE>");
        assert_eq!(
            fragments[0],
            OutputFragment::MxpEntityUnset {
                name: "weather".to_owned(),
                is_variable: false,
            }
        );
    }

    #[test]
    fn test_mxp_var_sets_variable() {
        let fragments = decode(&mxp_world(), b"<VAR hp>42</VAR>");
        assert_eq!(text_of(&fragments[0]), "42");
        assert_eq!(
            fragments[1],
            OutputFragment::MxpEntitySet {
                name: "hp".to_owned(),
                value: "42".to_owned(),
                publish: false,
                is_variable: true,
            }
        );
    }

    #[test]
    fn test_mxp_malformed_tag_degrades() {
        let fragments = decode(&mxp_world(), b"a<>b");
        assert_eq!(text_of(&fragments[0]), "a");
        assert!(matches!(&fragments[1], OutputFragment::MxpError(_)));
        assert_eq!(text_of(&fragments[2]), "<>b");
    }

    #[test]
    fn test_mxp_hr_and_sound() {
        let fragments = decode(&mxp_world(), b"<HR><SOUND alarm.wav>");
        assert_eq!(fragments[0], OutputFragment::Hr);
        assert_eq!(fragments[1], OutputFragment::Sound("alarm.wav".to_owned()));
    }

    #[test]
    fn test_mxp_inactive_without_negotiation() {
        // Markup is literal text until the server negotiates MXP
        let fragments = decode(&World::default(), b"<B>x</B>");
        assert_eq!(fragments.len(), 1);
        assert_eq!(text_of(&fragments[0]), "<B>x</B>");
    }

    #[test]
    fn test_mxp_line_mode_enables() {
        let world = World::default();
        let mut decoder = Decoder::new(&world);
        let mut out = Vec::new();
        decoder.receive(b"\x1b[1z<B>x</B>", &mut out);
        decoder.flush(&mut out);
        assert!(decoder.mxp_active());
        assert!(matches!(&out[0], OutputFragment::Text(t) if t.flags.bold));
    }

    #[test]
    fn test_unclosed_inner_tag_discarded() {
        let fragments = decode(&mxp_world(), b"<B><I>x</B>y");
        assert!(matches!(&fragments[0], OutputFragment::Text(t) if t.flags.bold && t.flags.italic));
        assert!(matches!(&fragments[1], OutputFragment::Text(t) if t.flags.is_plain()));
    }

    #[test]
    fn test_heading_carried_on_fragment() {
        let fragments = decode(&mxp_world(), b"<H1>Title</H1>");
        assert!(matches!(
            &fragments[0],
            OutputFragment::Text(t) if t.heading == Some(Heading::H1)
        ));
    }

    #[test]
    fn test_end_to_end_ordering() {
        let mut bytes = vec![telnet::IAC, telnet::SB, 201, b'x', telnet::IAC, telnet::SE];
        bytes.extend_from_slice(b"Hello\r\nWorld");
        let fragments = decode(&World::default(), &bytes);
        assert_eq!(fragments.len(), 4);
        assert!(matches!(&fragments[0], OutputFragment::Telnet(_)));
        assert_eq!(text_of(&fragments[1]), "Hello");
        assert_eq!(fragments[2], OutputFragment::LineBreak);
        assert_eq!(text_of(&fragments[3]), "World");
    }
}
