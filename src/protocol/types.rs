//! AT Reply Vocabulary
//!
//! Every command response is zero or more informational lines followed by
//! exactly one terminal token. The host-side clients of this protocol match
//! on these bytes literally, so the tokens below are reproduced exactly.
//!
//! ## Protocol Format
//!
//! ```text
//! AT+CIPMUX?\r\n            <- command line from the host
//! +CIPMUX:1\r\n             <- informational line
//! \r\nOK\r\n                <- terminal token
//! ```
//!
//! A handful of commands use their own terminal forms (the `> ` send prompt,
//! `OK\r\n` after `AT+GMR`). Those are written through [`Reply::raw`].

use bytes::{BufMut, BytesMut};
use std::fmt;

/// Line terminator used by every informational line
pub const CRLF: &[u8] = b"\r\n";

/// Canonical success token
pub const MSG_OK: &[u8] = b"\r\nOK\r\n";

/// Canonical failure token
pub const MSG_ERROR: &[u8] = b"\r\nERROR\r\n";

/// Reply to any command line received while a background operation is outstanding
pub const MSG_BUSY: &[u8] = b"busy p...\r\n";

/// Prompt written after an accepted `AT+CIPSEND`
pub const SEND_PROMPT: &[u8] = b"OK\r\n> ";

/// Prompt written after an accepted bare `AT+CIPSSLCERT`
pub const CERT_PROMPT: &[u8] = b"\r\nOK\r\n>";

/// Accumulates the bytes of one response.
///
/// Handlers push informational lines; the dispatcher appends the terminal
/// token. The buffer is handed to the transport as a single write.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reply {
    buf: BytesMut,
}

impl Reply {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    /// Writes `text` followed by CRLF.
    pub fn line(&mut self, text: impl AsRef<[u8]>) -> &mut Self {
        self.buf.put_slice(text.as_ref());
        self.buf.put_slice(CRLF);
        self
    }

    /// Writes bytes verbatim, without a terminator.
    pub fn raw(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        self.buf.put_slice(bytes.as_ref());
        self
    }

    /// Writes formatted text verbatim, without a terminator.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> &mut Self {
        // BytesMut implements fmt::Write and never fails.
        let _ = fmt::Write::write_fmt(&mut self.buf, args);
        self
    }

    pub fn ok(&mut self) -> &mut Self {
        self.raw(MSG_OK)
    }

    pub fn error(&mut self) -> &mut Self {
        self.raw(MSG_ERROR)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.buf))
    }
}

/// Finds the position of the first CRLF in `buf`.
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Formats a MAC address the way the firmware prints it.
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_ok() {
        let mut reply = Reply::new();
        reply.line("+CIPMUX:1").ok();
        assert_eq!(reply.as_bytes(), b"+CIPMUX:1\r\n\r\nOK\r\n");
    }

    #[test]
    fn test_formatted_line() {
        let mut reply = Reply::new();
        write!(reply, "{},CLOSED\r\n", 3);
        assert_eq!(reply.as_bytes(), b"3,CLOSED\r\n");
    }

    #[test]
    fn test_raw_prompt() {
        let mut reply = Reply::new();
        reply.raw(SEND_PROMPT);
        assert_eq!(reply.as_bytes(), b"OK\r\n> ");
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"AT\r\n"), Some(2));
        assert_eq!(find_crlf(b"AT\r"), None);
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b""), None);
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(
            format_mac(&[0x5c, 0xcf, 0x7f, 0x00, 0x0a, 0xff]),
            "5c:cf:7f:00:0a:ff"
        );
    }
}
