//! Decoded output model
//!
//! One `OutputFragment` per decoded unit, emitted in stream order. The
//! fragment set is expected to grow; consumers must treat unknown fragments
//! as no-ops, never as errors.

mod fragment;
mod link;
mod send;

pub use fragment::{EffectFragment, Heading, OutputFragment, TelnetFragment, TelnetSource, TelnetVerb, TextFragment};
pub use link::{deserialize_action_url, serialize_action_url, InternalSendTo, MxpLink, SendTo};
pub use send::{SendRequest, SendTarget};
