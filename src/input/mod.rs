//! Local input handling
//!
//! One typed line passes through four stages: alias evaluation (supplied
//! by the embedder), history recording, input echo, and command-stack
//! splitting. [`process_input`] runs them in that order and dispatches the
//! alias-produced send requests before the raw line is forwarded, so an
//! alias that rewrites a command observes the world state it expects.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::color::MudColor;
use crate::dispatch::{self, Dispatched};
use crate::output::{OutputFragment, SendRequest, TextFragment};
use crate::world::World;

/// The echo of one typed command, ready to feed to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoFragment {
    fragments: Vec<OutputFragment>,
}

impl EchoFragment {
    pub fn fragments(&self) -> &[OutputFragment] {
        &self.fragments
    }

    pub fn into_fragments(self) -> Vec<OutputFragment> {
        self.fragments
    }
}

/// Formats typed commands for display in the output window
#[derive(Debug, Clone)]
pub struct InputFormatter {
    display_input: bool,
    same_line: bool,
    foreground: MudColor,
    background: MudColor,
}

impl InputFormatter {
    pub fn new(world: &World) -> Self {
        Self {
            display_input: world.display_my_input,
            same_line: world.keep_commands_on_same_line,
            foreground: world
                .echo_colors
                .foreground
                .map_or(MudColor::ANSI_WHITE, MudColor::Hex),
            background: world
                .echo_colors
                .background
                .map_or(MudColor::ANSI_BLACK, MudColor::Hex),
        }
    }

    /// Build the echo for one command, or `None` if echo is disabled
    pub fn format(&self, line: &str) -> Option<EchoFragment> {
        if !self.display_input {
            return None;
        }
        let mut text = TextFragment::new(line);
        text.foreground = self.foreground;
        text.background = self.background;
        let text = OutputFragment::Text(text);
        let fragments = if self.same_line {
            vec![text, OutputFragment::LineBreak]
        } else {
            vec![OutputFragment::LineBreak, text, OutputFragment::LineBreak]
        };
        Some(EchoFragment { fragments })
    }
}

/// Bounded ring of previously typed commands, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    limit: usize,
}

impl CommandHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    /// Record a command; repeats of the last entry are not duplicated
    pub fn push(&mut self, line: &str) {
        if line.is_empty() || self.entries.back().is_some_and(|last| last == line) {
            return;
        }
        self.entries.push_back(line.to_owned());
        self.trim();
    }

    /// Shrink the cap, evicting oldest entries if needed
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.trim();
    }

    fn trim(&mut self) {
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// Ordered send requests produced by alias evaluation; drained once
#[derive(Debug, Default)]
pub struct SendStream {
    requests: VecDeque<SendRequest>,
}

impl SendStream {
    pub fn push(&mut self, request: SendRequest) {
        self.requests.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Iterator for SendStream {
    type Item = SendRequest;

    fn next(&mut self) -> Option<SendRequest> {
        self.requests.pop_front()
    }
}

impl FromIterator<SendRequest> for SendStream {
    fn from_iter<I: IntoIterator<Item = SendRequest>>(iter: I) -> Self {
        Self {
            requests: iter.into_iter().collect(),
        }
    }
}

/// What alias evaluation decided about one typed line
#[derive(Debug)]
pub struct AliasOutcome {
    /// Record the line in command history
    pub remember: bool,
    /// Echo the line to the output window
    pub display: bool,
    /// Forward the raw line to the server
    pub forward: bool,
    /// Requests to dispatch before the line is forwarded
    pub send: SendStream,
}

impl Default for AliasOutcome {
    fn default() -> Self {
        Self {
            remember: true,
            display: true,
            forward: true,
            send: SendStream::default(),
        }
    }
}

/// Result of running one line through the pipeline
#[derive(Debug)]
pub struct ProcessedInput {
    /// Echo fragments for the consumer, if echo applies
    pub echo: Option<EchoFragment>,
    /// Dispatch results for the alias send stream, in order
    pub dispatched: Vec<Dispatched>,
    /// Lines to transmit, after command-stack splitting; empty if an
    /// alias consumed the input
    pub forward: Vec<String>,
}

/// Run one line of local input through the pipeline
///
/// `alias` is the embedder's alias/trigger evaluator; pass
/// `|_| AliasOutcome::default()` when none is installed. Programmatic
/// input (`from_user` false) skips aliases, history, and echo.
pub fn process_input(
    line: &str,
    from_user: bool,
    world: &World,
    history: &mut CommandHistory,
    alias: impl FnOnce(&str) -> AliasOutcome,
) -> ProcessedInput {
    if !from_user {
        return ProcessedInput {
            echo: None,
            dispatched: Vec::new(),
            forward: vec![line.to_owned()],
        };
    }

    let outcome = alias(line);
    if outcome.remember {
        history.push(line);
    }
    let echo = if outcome.display {
        InputFormatter::new(world).format(line)
    } else {
        None
    };
    let dispatched = outcome.send.map(dispatch::dispatch).collect();
    let forward = if outcome.forward {
        split_command_stack(line, world)
    } else {
        Vec::new()
    };
    ProcessedInput {
        echo,
        dispatched,
        forward,
    }
}

/// Split a typed line on the command-stack character
///
/// A doubled stack character escapes to a literal one. Disabled worlds
/// forward the line unchanged.
fn split_command_stack(line: &str, world: &World) -> Vec<String> {
    if !world.enable_command_stack {
        return vec![line.to_owned()];
    }
    let stack = world.command_stack_character;
    let mut commands = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != stack {
            current.push(c);
            continue;
        }
        if chars.peek() == Some(&stack) {
            chars.next();
            current.push(stack);
        } else {
            commands.push(std::mem::take(&mut current));
        }
    }
    commands.push(current);
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RgbColor;
    use crate::output::SendTarget;
    use crate::world::ColorPair;

    #[test]
    fn test_history_dedup_is_adjacent_only() {
        let mut history = CommandHistory::new(10);
        history.push("north");
        history.push("north");
        assert_eq!(history.len(), 1);
        history.push("look");
        history.push("north");
        assert_eq!(history.iter().collect::<Vec<_>>(), ["north", "look", "north"]);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = CommandHistory::new(2);
        history.push("a");
        history.push("b");
        history.push("c");
        assert_eq!(history.iter().collect::<Vec<_>>(), ["b", "c"]);
    }

    #[test]
    fn test_history_limit_shrink() {
        let mut history = CommandHistory::new(5);
        for line in ["a", "b", "c", "d"] {
            history.push(line);
        }
        history.set_limit(2);
        assert_eq!(history.iter().collect::<Vec<_>>(), ["c", "d"]);
    }

    #[test]
    fn test_echo_uses_configured_colors() {
        let world = World {
            echo_colors: ColorPair {
                foreground: Some(RgbColor::rgb(0, 255, 0)),
                background: None,
            },
            ..World::default()
        };
        let echo = InputFormatter::new(&world).format("say hi").unwrap();
        let OutputFragment::Text(text) = &echo.fragments()[1] else {
            panic!("expected leading break then text");
        };
        assert_eq!(text.foreground, MudColor::Hex(RgbColor::rgb(0, 255, 0)));
        assert_eq!(text.background, MudColor::ANSI_BLACK);
    }

    #[test]
    fn test_same_line_echo_has_no_leading_break() {
        let world = World {
            keep_commands_on_same_line: true,
            ..World::default()
        };
        let echo = InputFormatter::new(&world).format("go").unwrap();
        assert!(matches!(echo.fragments()[0], OutputFragment::Text(_)));
    }

    #[test]
    fn test_echo_suppressed() {
        let world = World {
            display_my_input: false,
            ..World::default()
        };
        assert!(InputFormatter::new(&world).format("secret").is_none());
    }

    #[test]
    fn test_alias_sends_dispatch_before_forwarding() {
        let world = World::default();
        let mut history = CommandHistory::new(10);
        let result = process_input("kill rat", true, &world, &mut history, |_| AliasOutcome {
            send: [SendRequest::new(SendTarget::World, "wield sword")]
                .into_iter()
                .collect(),
            ..AliasOutcome::default()
        });
        assert_eq!(
            result.dispatched,
            [Dispatched::World {
                text: "wield sword".to_owned(),
                delayed: false,
            }]
        );
        assert_eq!(result.forward, ["kill rat"]);
        assert_eq!(history.last(), Some("kill rat"));
    }

    #[test]
    fn test_alias_may_consume_input() {
        let world = World::default();
        let mut history = CommandHistory::new(10);
        let result = process_input("n", true, &world, &mut history, |_| AliasOutcome {
            forward: false,
            remember: false,
            display: false,
            ..AliasOutcome::default()
        });
        assert!(result.forward.is_empty());
        assert!(result.echo.is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn test_programmatic_input_skips_echo_and_history() {
        let world = World::default();
        let mut history = CommandHistory::new(10);
        let result = process_input("tick", false, &world, &mut history, |_| {
            panic!("aliases must not see programmatic input")
        });
        assert!(result.echo.is_none());
        assert_eq!(result.forward, ["tick"]);
        assert!(history.is_empty());
    }

    #[test]
    fn test_command_stack_splits_and_escapes() {
        let world = World {
            enable_command_stack: true,
            ..World::default()
        };
        let mut history = CommandHistory::new(10);
        let result = process_input("n;;e;look", true, &world, &mut history, |_| {
            AliasOutcome::default()
        });
        assert_eq!(result.forward, ["n;e", "look"]);
    }
}
