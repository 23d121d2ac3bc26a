//! Telnet protocol bytes
//!
//! Command and option constants used by the decoder, plus helpers for
//! building negotiation replies.

/// Interpret As Command
pub const IAC: u8 = 255;

// Commands following IAC
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const GA: u8 = 249;
pub const EL: u8 = 248;
pub const EC: u8 = 247;
pub const SE: u8 = 240;
/// End Of Record, sent in place of GA when the EOR option is active
pub const EOR: u8 = 239;
pub const NOP: u8 = 241;

// Options
pub const ECHO: u8 = 1;
pub const SUPPRESS_GO_AHEAD: u8 = 3;
pub const TERMINAL_TYPE: u8 = 24;
pub const EOR_OPTION: u8 = 25;
pub const NAWS: u8 = 31;
pub const CHARSET: u8 = 42;
pub const MXP: u8 = 91;

// TERMINAL-TYPE subnegotiation qualifiers
pub const TTYPE_IS: u8 = 0;
pub const TTYPE_SEND: u8 = 1;

/// Append `IAC <verb> <code>` to a response buffer
pub fn write_negotiation(buf: &mut Vec<u8>, verb: u8, code: u8) {
    buf.extend_from_slice(&[IAC, verb, code]);
}

/// Append a TERMINAL-TYPE IS reply carrying the client identification
pub fn write_terminal_type(buf: &mut Vec<u8>, name: &str) {
    buf.extend_from_slice(&[IAC, SB, TERMINAL_TYPE, TTYPE_IS]);
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(&[IAC, SE]);
}

/// Option name for trace logging
pub fn option_name(code: u8) -> &'static str {
    match code {
        ECHO => "ECHO",
        SUPPRESS_GO_AHEAD => "SUPPRESS-GO-AHEAD",
        TERMINAL_TYPE => "TERMINAL-TYPE",
        EOR_OPTION => "END-OF-RECORD",
        NAWS => "NAWS",
        CHARSET => "CHARSET",
        MXP => "MXP",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_negotiation() {
        let mut buf = Vec::new();
        write_negotiation(&mut buf, DO, ECHO);
        assert_eq!(buf, [255, 253, 1]);
    }

    #[test]
    fn test_write_terminal_type() {
        let mut buf = Vec::new();
        write_terminal_type(&mut buf, "mudlark");
        assert_eq!(&buf[..4], [IAC, SB, TERMINAL_TYPE, TTYPE_IS]);
        assert_eq!(&buf[buf.len() - 2..], [IAC, SE]);
    }
}
