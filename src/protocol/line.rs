//! Host Line Transport
//!
//! Frames the host byte stream into units the dispatcher understands. The
//! reader is always in exactly one of three modes:
//!
//! ```text
//!            AT+CIPSEND=5                 5 raw bytes read
//!   ┌──────┐ ───────────────> ┌───────┐ ──────────────────> ┌──────┐
//!   │ Line │                  │  Raw  │                     │ Line │
//!   └──────┘ <─────────────── └───────┘                     └──────┘
//!      │      END CERTIFICATE
//!      │ AT+CIPSSLCERT        ┌───────┐
//!      └────────────────────> │  Pem  │ ── END CERTIFICATE / overflow ──> Line
//!                             └───────┘
//! ```
//!
//! Leaving `Raw` or `Pem` happens inside [`LineReader::next_frame`] before the
//! frame is returned, so the reader is back in line mode whatever the
//! caller does with the payload.

use super::types::find_crlf;
use bytes::{Bytes, BytesMut};

/// Maximum length of one command line, terminator included
pub const MAX_LINE_LEN: usize = 100;

/// Maximum length of a PEM certificate upload
pub const MAX_PEM_LEN: usize = 4096;

/// Marker that completes a PEM certificate upload
pub const PEM_END_MARKER: &[u8] = b"-----END CERTIFICATE-----";

/// Sizes enforced by the line transport.
#[derive(Debug, Clone, Copy)]
pub struct LineConfig {
    /// Longest accepted command line
    pub max_line: usize,
    /// Longest accepted PEM upload
    pub max_pem: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line: MAX_LINE_LEN,
            max_pem: MAX_PEM_LEN,
        }
    }
}

/// The current framing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    /// CRLF-terminated command lines
    Line,
    /// Exactly `remaining` bytes of payload for `link`
    Raw { link: usize, remaining: usize },
    /// A PEM certificate ending with [`PEM_END_MARKER`]
    Pem,
}

/// One unit produced by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete command line including its CRLF
    Line(Bytes),
    /// Bytes discarded because no CRLF arrived within the line limit
    Overflow,
    /// Send payload for a link
    Payload { link: usize, data: Bytes },
    /// A complete PEM certificate
    Pem(Bytes),
    /// PEM upload exceeded its limit without an end marker
    PemOverflow,
}

/// Splits the host stream into frames according to the current mode.
#[derive(Debug)]
pub struct LineReader {
    mode: ReaderMode,
    config: LineConfig,
}

impl LineReader {
    pub fn new(config: LineConfig) -> Self {
        Self {
            mode: ReaderMode::Line,
            config,
        }
    }

    pub fn mode(&self) -> ReaderMode {
        self.mode
    }

    /// Switches to raw mode for a send of `len` bytes.
    pub fn expect_payload(&mut self, link: usize, len: usize) {
        self.mode = ReaderMode::Raw {
            link,
            remaining: len,
        };
    }

    /// Switches to PEM collection.
    pub fn expect_pem(&mut self) {
        self.mode = ReaderMode::Pem;
    }

    /// Extracts the next complete frame from `buf`, if any.
    pub fn next_frame(&mut self, buf: &mut BytesMut) -> Option<Frame> {
        match self.mode {
            ReaderMode::Line => self.next_line(buf),
            ReaderMode::Raw { link, remaining } => {
                if remaining == 0 {
                    self.mode = ReaderMode::Line;
                    return Some(Frame::Payload {
                        link,
                        data: Bytes::new(),
                    });
                }
                if buf.len() < remaining {
                    return None;
                }
                self.mode = ReaderMode::Line;
                Some(Frame::Payload {
                    link,
                    data: buf.split_to(remaining).freeze(),
                })
            }
            ReaderMode::Pem => self.next_pem(buf),
        }
    }

    fn next_line(&mut self, buf: &mut BytesMut) -> Option<Frame> {
        match find_crlf(buf) {
            Some(pos) if pos + 2 <= self.config.max_line => {
                Some(Frame::Line(buf.split_to(pos + 2).freeze()))
            }
            Some(pos) => {
                let _ = buf.split_to(pos + 2);
                Some(Frame::Overflow)
            }
            None if buf.len() >= self.config.max_line => {
                // Keep a trailing CR so a CRLF split across reads still terminates.
                let keep = usize::from(buf.last() == Some(&b'\r'));
                let _ = buf.split_to(buf.len() - keep);
                Some(Frame::Overflow)
            }
            None => None,
        }
    }

    fn next_pem(&mut self, buf: &mut BytesMut) -> Option<Frame> {
        let marker = buf
            .windows(PEM_END_MARKER.len())
            .position(|w| w == PEM_END_MARKER);

        match marker {
            Some(pos) => {
                let mut end = pos + PEM_END_MARKER.len();
                // The marker line's terminator belongs to the upload.
                match buf.get(end) {
                    Some(b'\r') => match buf.get(end + 1) {
                        Some(b'\n') => end += 2,
                        Some(_) => end += 1,
                        None => return None,
                    },
                    Some(b'\n') => end += 1,
                    Some(_) => {}
                    None => return None,
                }
                self.mode = ReaderMode::Line;
                if end > self.config.max_pem {
                    let _ = buf.split_to(end);
                    return Some(Frame::PemOverflow);
                }
                Some(Frame::Pem(buf.split_to(end).freeze()))
            }
            None if buf.len() > self.config.max_pem => {
                self.mode = ReaderMode::Line;
                buf.clear();
                Some(Frame::PemOverflow)
            }
            None => None,
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(LineConfig::default())
    }
}
