//! Fragment consumption and the lazy line-break contract
//!
//! A [`LineBreak`] fragment never appends a newline immediately. It arms a
//! latch, and the newline materializes just before the next visible
//! content. A prompt line therefore stays "last" while effects such as
//! [`EraseLine`] rewrite it, which is how servers repaint status bars and
//! countdowns in place.
//!
//! [`LineBreak`]: OutputFragment::LineBreak
//! [`EraseLine`]: EffectFragment::EraseLine

use unicode_segmentation::UnicodeSegmentation;

use crate::output::{EffectFragment, OutputFragment, SendTarget};
use crate::world::World;

/// Rendered in place of an MXP horizontal rule
const HR_RULE: &str = "--------------------";

/// Where consumed text lands
///
/// Implementations only need tail access: fragments append at the end and
/// effects erase from the end, never from the middle.
pub trait DisplaySurface {
    /// Append text at the end of the surface
    fn append(&mut self, text: &str);

    /// Remove the final `bytes` bytes
    ///
    /// Callers guarantee the count lies on a character boundary of the
    /// current content.
    fn delete_tail(&mut self, bytes: usize);

    /// The content after the last newline, empty if the surface ends with
    /// one
    fn last_line(&self) -> &str;

    /// A bell arrived; surfaces without a notion of attention ignore it
    fn request_attention(&mut self) {}
}

/// Plain in-memory surface
///
/// Backs the headless renderer and the tests; GUI front-ends implement
/// [`DisplaySurface`] over their own text storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    content: String,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

impl DisplaySurface for TextBuffer {
    fn append(&mut self, text: &str) {
        self.content.push_str(text);
    }

    fn delete_tail(&mut self, bytes: usize) {
        let len = self.content.len().saturating_sub(bytes);
        self.content.truncate(len);
    }

    fn last_line(&self) -> &str {
        match self.content.rfind('\n') {
            Some(index) => &self.content[index + 1..],
            None => &self.content,
        }
    }
}

/// Applies a fragment stream to a surface, honoring the break latch
#[derive(Debug)]
pub struct OutputConsumer<S> {
    surface: S,
    will_break: bool,
    carriage_return_clears_line: bool,
}

impl<S: DisplaySurface> OutputConsumer<S> {
    pub fn new(surface: S, world: &World) -> Self {
        Self {
            surface,
            will_break: false,
            carriage_return_clears_line: world.carriage_return_clears_line,
        }
    }

    /// Whether a line break is latched but not yet materialized
    pub fn will_break(&self) -> bool {
        self.will_break
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Apply one fragment
    pub fn fragment(&mut self, fragment: &OutputFragment) {
        match fragment {
            OutputFragment::Text(text) => self.append(&text.text),
            OutputFragment::Effect(effect) => self.effect(*effect),
            // Materialize any pending break first, so consecutive breaks
            // produce blank lines instead of collapsing
            OutputFragment::LineBreak | OutputFragment::PageBreak => {
                self.materialize_break();
                self.will_break = true;
            }
            // The rule carries its own surrounding breaks; a pending
            // latch is absorbed by the leading one
            OutputFragment::Hr => {
                self.will_break = false;
                self.surface.append("\n");
                self.surface.append(HR_RULE);
                self.surface.append("\n");
            }
            // Server-pushed text destined for the output window lands
            // through the same latch path as decoded text
            OutputFragment::Send(request) if request.send_to == SendTarget::Output => {
                self.append(&request.text);
            }
            OutputFragment::Send(_)
            | OutputFragment::Telnet(_)
            | OutputFragment::Image(_)
            | OutputFragment::Sound(_)
            | OutputFragment::MxpEntitySet { .. }
            | OutputFragment::MxpEntityUnset { .. }
            | OutputFragment::MxpError(_) => {}
        }
    }

    /// Apply a whole batch in order
    pub fn consume<'a, I: IntoIterator<Item = &'a OutputFragment>>(&mut self, fragments: I) {
        for fragment in fragments {
            self.fragment(fragment);
        }
    }

    fn materialize_break(&mut self) {
        if self.will_break {
            self.will_break = false;
            self.surface.append("\n");
        }
    }

    fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.materialize_break();
        self.surface.append(text);
    }

    fn effect(&mut self, effect: EffectFragment) {
        match effect {
            EffectFragment::Beep => self.surface.request_attention(),
            // A latched break absorbs the erase: the newline it would
            // have produced is the character being deleted
            EffectFragment::Backspace | EffectFragment::EraseCharacter => {
                if self.will_break {
                    self.will_break = false;
                    return;
                }
                // Remove one grapheme cluster, never a partial code point
                let tail = self
                    .surface
                    .last_line()
                    .graphemes(true)
                    .next_back()
                    .map_or(0, str::len);
                if tail > 0 {
                    self.surface.delete_tail(tail);
                }
            }
            EffectFragment::EraseLine => {
                self.erase_last_line();
                self.will_break = true;
            }
            EffectFragment::CarriageReturn => {
                if self.carriage_return_clears_line {
                    // Text after the return overwrites the line in place,
                    // so the latch stays clear
                    self.erase_last_line();
                } else {
                    self.surface.append("\r");
                }
            }
        }
    }

    /// Erase the last displayed line, leaving its line break in place
    fn erase_last_line(&mut self) {
        let len = self.surface.last_line().len();
        if len > 0 {
            self.surface.delete_tail(len);
        }
    }
}
