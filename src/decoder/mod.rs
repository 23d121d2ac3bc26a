//! Server stream decoding
//!
//! [`Decoder`] is the entry point: feed it raw socket bytes and it emits
//! [`OutputFragment`]s. The submodules hold the pieces it is built from:
//! telnet constants and reply encoding, the SGR color/attribute mapping,
//! and the MXP tag and entity machinery.
//!
//! [`OutputFragment`]: crate::output::OutputFragment

pub mod mxp;
pub mod sgr;
pub mod telnet;

mod state;

pub use sgr::{apply_sgr, StyleContext};
pub use state::Decoder;
