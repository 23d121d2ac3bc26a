//! Send requests
//!
//! A `SendRequest` is a transient instruction to emit text somewhere:
//! produced by the decoder for MXP `<send>` activations, by alias/trigger
//! evaluation, or by plugins, and consumed exactly once by dispatch.

use serde::{Deserialize, Serialize};

/// Destination of a send request
///
/// The core dispatch handles the first block; the rest belong to external
/// collaborators (scripting engine, notepad windows, logger) subscribed to
/// the same stream and are accepted-but-ignored by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendTarget {
    /// Forward to the game server
    World,
    /// Forward to the game server, after the transport's delay policy
    WorldDelay,
    /// Forward to the game server, skipping queued commands
    WorldImmediate,
    /// Replace the input box text
    Command,
    /// Append to the output window as a literal line
    Output,
    /// Update the status/plugin-message slot
    Status,
    NotepadNew,
    NotepadAppend,
    NotepadReplace,
    Log,
    Variable,
    Script,
}

impl SendTarget {
    /// Whether the core dispatch consumes this target itself
    pub fn is_core(self) -> bool {
        matches!(
            self,
            Self::World
                | Self::WorldDelay
                | Self::WorldImmediate
                | Self::Command
                | Self::Output
                | Self::Status
        )
    }
}

/// A one-shot instruction to emit text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub send_to: SendTarget,
    pub text: String,
}

impl SendRequest {
    pub fn new(send_to: SendTarget, text: impl Into<String>) -> Self {
        Self {
            send_to,
            text: text.into(),
        }
    }
}
