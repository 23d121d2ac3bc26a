//! Mudlark MUD Client Core Library
//!
//! The protocol and presentation pipeline of a MUD client, independent of
//! any GUI toolkit. This crate provides:
//!
//! - `decoder`: streaming telnet/ANSI/MXP decoder producing typed fragments
//! - `output`: the fragment data model (text runs, effects, telnet events, links)
//! - `consumer`: the fragment-to-display state machine with the lazy-break latch
//! - `color`, `style`: palette resolution and font/style derivation
//! - `input`, `dispatch`: the typed-command pipeline and send-request routing
//! - `world`: the flat per-world configuration record
//! - `session`: the connection facade tying transport and decoder together

pub mod color;
pub mod consumer;
pub mod decoder;
pub mod dispatch;
pub mod input;
pub mod output;
pub mod session;
pub mod style;
pub mod world;
