//! Cursor-Based Parameter Decoder
//!
//! AT command arguments are decoded in place from the command line. A
//! [`Cursor`] walks the line from left to right; each reader either consumes
//! a complete value and leaves the cursor on the first unconsumed byte, or
//! fails and the whole command is rejected as a syntax error.
//!
//! ## Argument Shapes
//!
//! ```text
//! AT+CIPSTART=1,"TCP","example.com",80\r\n
//!             │ │     │             │
//!             │ │     │             └─ read_number()
//!             │ │     └─ read_string()
//!             │ └─ read_string()
//!             └─ read_link_id()
//! ```
//!
//! Readers never write into caller state before they succeed; a value is
//! returned only once the whole field has been validated.

use bytes::Bytes;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors that can occur while decoding command arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Expected at least one ASCII digit
    #[error("expected a number at offset {0}")]
    ExpectedNumber(usize),

    /// A specific delimiter byte was expected
    #[error("expected {expected:?} at offset {at}")]
    Expected { expected: char, at: usize },

    /// A quoted string was not closed before a control byte or the line end
    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),

    /// A quoted string exceeded the maximum length
    #[error("string longer than {max} bytes")]
    StringTooLong { max: usize },

    /// An empty string where a value is required
    #[error("empty string at offset {0}")]
    EmptyString(usize),

    /// Malformed dotted-quad address
    #[error("invalid IPv4 address at offset {0}")]
    InvalidIpv4(usize),

    /// Malformed hex digit sequence
    #[error("invalid hex sequence at offset {0}")]
    InvalidHex(usize),

    /// A numeric argument was outside its accepted range
    #[error("value {0} out of range")]
    OutOfRange(u32),

    /// Unconsumed bytes before the line terminator
    #[error("trailing data at offset {0}")]
    TrailingData(usize),
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Maximum length of a decoded string argument
pub const MAX_STRING_LEN: usize = 200;

/// A position over an immutable command line.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor over `buf` starting at `pos`.
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// The bytes not yet consumed, terminator included.
    pub fn remaining(&self) -> &'a [u8] {
        self.buf.get(self.pos..).unwrap_or(&[])
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.pos + offset).copied()
    }

    /// Consumes `byte` if it is next. Returns whether it did.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes `byte` or fails.
    pub fn expect(&mut self, byte: u8) -> DecodeResult<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(DecodeError::Expected {
                expected: byte as char,
                at: self.pos,
            })
        }
    }

    /// Consumes `text` if the remaining bytes start with it.
    pub fn eat_slice(&mut self, text: &[u8]) -> bool {
        if self.remaining().starts_with(text) {
            self.pos += text.len();
            true
        } else {
            false
        }
    }

    /// True when only the CRLF terminator is left.
    pub fn at_end(&self) -> bool {
        self.remaining() == b"\r\n"
    }

    /// Fails unless only the CRLF terminator is left.
    pub fn finish(&self) -> DecodeResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(DecodeError::TrailingData(self.pos))
        }
    }

    /// Skips consecutive ASCII digits and returns how many there were.
    pub fn skip_digits(&mut self) -> usize {
        let n = self
            .remaining()
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        self.pos += n;
        n
    }

    /// Reads consecutive ASCII digits as an unsigned 32-bit value.
    ///
    /// Accumulation wraps at the integer width; callers range-check. On
    /// failure the cursor does not move.
    pub fn read_number(&mut self) -> DecodeResult<u32> {
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            value = value.wrapping_mul(10).wrapping_add(u32::from(c - b'0'));
            self.pos += 1;
        }
        if self.pos == start {
            return Err(DecodeError::ExpectedNumber(start));
        }
        Ok(value)
    }

    /// Reads a number and checks it against an inclusive range.
    pub fn read_number_in(&mut self, range: std::ops::RangeInclusive<u32>) -> DecodeResult<u32> {
        let value = self.read_number()?;
        if range.contains(&value) {
            Ok(value)
        } else {
            Err(DecodeError::OutOfRange(value))
        }
    }

    /// Reads a double-quoted string.
    ///
    /// With `escaping`, a backslash takes the next byte verbatim. The string
    /// ends at the first unescaped `"`; a control byte before that is a
    /// failure. `allow_empty` decides whether `""` is a valid value.
    pub fn read_string(&mut self, escaping: bool, allow_empty: bool) -> DecodeResult<Bytes> {
        let start = self.pos;
        let mut pos = self.pos;
        if self.buf.get(pos) != Some(&b'"') {
            return Err(DecodeError::Expected {
                expected: '"',
                at: pos,
            });
        }
        pos += 1;

        let mut out = Vec::new();
        loop {
            let c = match self.buf.get(pos) {
                Some(&c) if c >= b' ' => c,
                _ => return Err(DecodeError::UnterminatedString(start)),
            };
            pos += 1;
            if c == b'"' {
                break;
            }
            let c = if escaping && c == b'\\' {
                match self.buf.get(pos) {
                    Some(&next) if next >= b' ' => {
                        pos += 1;
                        next
                    }
                    _ => return Err(DecodeError::UnterminatedString(start)),
                }
            } else {
                c
            };
            if out.len() == MAX_STRING_LEN {
                return Err(DecodeError::StringTooLong {
                    max: MAX_STRING_LEN,
                });
            }
            out.push(c);
        }

        if out.is_empty() && !allow_empty {
            return Err(DecodeError::EmptyString(start));
        }
        self.pos = pos;
        Ok(Bytes::from(out))
    }

    /// Reads a quoted dotted-quad address such as `"192.168.1.1"`.
    pub fn read_ipv4(&mut self) -> DecodeResult<Ipv4Addr> {
        let start = self.pos;
        let mut ahead = self.clone();
        let invalid = |_| DecodeError::InvalidIpv4(start);

        ahead.expect(b'"').map_err(invalid)?;
        let mut octets = [0u8; 4];
        for (i, octet) in octets.iter_mut().enumerate() {
            if i > 0 {
                ahead.expect(b'.').map_err(invalid)?;
            }
            let digits = ahead.position();
            let value = ahead.read_number().map_err(invalid)?;
            if value > 255 || ahead.position() - digits > 3 {
                return Err(DecodeError::InvalidIpv4(start));
            }
            *octet = value as u8;
        }
        ahead.expect(b'"').map_err(invalid)?;

        self.pos = ahead.pos;
        Ok(Ipv4Addr::from(octets))
    }

    /// Reads exactly `N` hex pairs, case-insensitive.
    ///
    /// With `separator`, pairs must be separated by that byte (and only
    /// between pairs).
    pub fn read_hex_bytes<const N: usize>(&mut self, separator: Option<u8>) -> DecodeResult<[u8; N]> {
        let start = self.pos;
        let mut pos = self.pos;
        let mut out = [0u8; N];
        for (i, byte) in out.iter_mut().enumerate() {
            if i > 0 {
                if let Some(sep) = separator {
                    if self.buf.get(pos) != Some(&sep) {
                        return Err(DecodeError::InvalidHex(start));
                    }
                    pos += 1;
                }
            }
            let hi = self.buf.get(pos).and_then(|c| hex_value(*c));
            let lo = self.buf.get(pos + 1).and_then(|c| hex_value(*c));
            match (hi, lo) {
                (Some(hi), Some(lo)) => *byte = (hi << 4) | lo,
                _ => return Err(DecodeError::InvalidHex(start)),
            }
            pos += 2;
        }
        self.pos = pos;
        Ok(out)
    }

    /// Reads a quoted SHA-1 fingerprint in compact (`"a1b2..."`) or
    /// colon-separated (`"a1:b2:..."`) form.
    pub fn read_fingerprint(&mut self) -> DecodeResult<[u8; 20]> {
        let mut ahead = self.clone();
        ahead.expect(b'"')?;
        let separator = if ahead.peek_at(2) == Some(b':') {
            Some(b':')
        } else {
            None
        };
        let fp = ahead.read_hex_bytes::<20>(separator)?;
        ahead.expect(b'"')?;
        self.pos = ahead.pos;
        Ok(fp)
    }

    /// Reads a quoted `xx:xx:xx:xx:xx:xx` hardware address.
    pub fn read_mac(&mut self) -> DecodeResult<[u8; 6]> {
        let mut ahead = self.clone();
        ahead.expect(b'"')?;
        let mac = ahead.read_hex_bytes::<6>(Some(b':'))?;
        ahead.expect(b'"')?;
        self.pos = ahead.pos;
        Ok(mac)
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(line: &[u8]) -> Cursor<'_> {
        Cursor::new(line, 0)
    }

    #[test]
    fn test_read_number() {
        let mut c = cursor(b"1234,5\r\n");
        assert_eq!(c.read_number(), Ok(1234));
        assert_eq!(c.position(), 4);
        assert!(c.eat(b','));
        assert_eq!(c.read_number(), Ok(5));
        assert!(c.at_end());
    }

    #[test]
    fn test_read_number_requires_digit() {
        let mut c = cursor(b",5\r\n");
        assert_eq!(c.read_number(), Err(DecodeError::ExpectedNumber(0)));
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn test_read_number_wraps() {
        let mut c = cursor(b"4294967296\r\n");
        assert_eq!(c.read_number(), Ok(0));
    }

    #[test]
    fn test_skip_digits() {
        let mut c = cursor(b"7200x\r\n");
        assert_eq!(c.skip_digits(), 4);
        assert_eq!(c.peek(), Some(b'x'));
        assert_eq!(c.skip_digits(), 0);
        assert_eq!(c.position(), 4);
    }

    #[test]
    fn test_read_number_in_range() {
        assert_eq!(cursor(b"7200").read_number_in(0..=7200), Ok(7200));
        assert_eq!(
            cursor(b"7201").read_number_in(0..=7200),
            Err(DecodeError::OutOfRange(7201))
        );
    }

    #[test]
    fn test_read_string() {
        let mut c = cursor(b"\"my network\",\"pw\"\r\n");
        assert_eq!(c.read_string(false, false).unwrap(), "my network");
        assert!(c.eat(b','));
        assert_eq!(c.read_string(false, false).unwrap(), "pw");
        assert!(c.at_end());
    }

    #[test]
    fn test_read_string_round_trip() {
        let original = "plain-text_value 123";
        let line = format!("\"{}\"\r\n", original);
        let mut c = cursor(line.as_bytes());
        assert_eq!(c.read_string(true, false).unwrap(), original.as_bytes());
        assert!(c.at_end());
    }

    #[test]
    fn test_read_string_escaped() {
        let mut c = cursor(b"\"a\\\"b\\\\c\"\r\n");
        assert_eq!(c.read_string(true, false).unwrap(), "a\"b\\c");
        assert!(c.at_end());
    }

    #[test]
    fn test_read_string_without_escaping_stops_at_quote() {
        let mut c = cursor(b"\"a\\\"b\"\r\n");
        assert_eq!(c.read_string(false, false).unwrap(), "a\\");
        assert_eq!(c.peek(), Some(b'b'));
    }

    #[test]
    fn test_read_string_unterminated() {
        let mut c = cursor(b"\"abc\r\n");
        assert_eq!(
            c.read_string(true, true),
            Err(DecodeError::UnterminatedString(0))
        );
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn test_read_string_escaped_control_byte() {
        let mut c = cursor(b"\"abc\\\r\n");
        assert!(c.read_string(true, true).is_err());
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn test_read_string_empty() {
        assert!(cursor(b"\"\"\r\n").read_string(false, true).unwrap().is_empty());
        assert_eq!(
            cursor(b"\"\"\r\n").read_string(false, false),
            Err(DecodeError::EmptyString(0))
        );
    }

    #[test]
    fn test_read_string_too_long() {
        let line = format!("\"{}\"\r\n", "x".repeat(MAX_STRING_LEN + 1));
        assert!(matches!(
            cursor(line.as_bytes()).read_string(false, false),
            Err(DecodeError::StringTooLong { .. })
        ));

        let line = format!("\"{}\"\r\n", "x".repeat(MAX_STRING_LEN));
        assert_eq!(
            cursor(line.as_bytes()).read_string(false, false).unwrap().len(),
            MAX_STRING_LEN
        );
    }

    #[test]
    fn test_read_ipv4() {
        let mut c = cursor(b"\"192.168.1.1\"\r\n");
        assert_eq!(c.read_ipv4(), Ok(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(c.at_end());
    }

    #[test]
    fn test_read_ipv4_rejects_malformed() {
        for line in [
            &b"\"192.168.1.256\"\r\n"[..],
            b"\"192.168.1\"\r\n",
            b"192.168.1.1\r\n",
            b"\"192.168.1.1\r\n",
            b"\"192..1.1\"\r\n",
            b"\"0192.168.1.1\"\r\n",
        ] {
            let mut c = cursor(line);
            assert_eq!(c.read_ipv4(), Err(DecodeError::InvalidIpv4(0)), "{:?}", line);
            assert_eq!(c.position(), 0);
        }
    }

    #[test]
    fn test_read_hex_bytes() {
        let mut c = cursor(b"0aFF10\r\n");
        assert_eq!(c.read_hex_bytes::<3>(None), Ok([0x0a, 0xff, 0x10]));
        assert!(c.at_end());

        let mut c = cursor(b"0a:ff:10\r\n");
        assert_eq!(c.read_hex_bytes::<3>(Some(b':')), Ok([0x0a, 0xff, 0x10]));
    }

    #[test]
    fn test_read_hex_bytes_rejects_bad_digits() {
        assert!(cursor(b"0g").read_hex_bytes::<1>(None).is_err());
        assert!(cursor(b"0").read_hex_bytes::<1>(None).is_err());
        assert!(cursor(b"0a:f:f1").read_hex_bytes::<3>(Some(b':')).is_err());
        assert!(cursor(b"0aff").read_hex_bytes::<2>(Some(b':')).is_err());
    }

    #[test]
    fn test_read_fingerprint_forms() {
        let compact = b"\"00112233445566778899aabbccddeeff00112233\"\r\n";
        let colon = b"\"00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF:00:11:22:33\"\r\n";

        let mut c = cursor(compact);
        let a = c.read_fingerprint().unwrap();
        assert!(c.at_end());

        let mut c = cursor(colon);
        let b = c.read_fingerprint().unwrap();
        assert!(c.at_end());

        assert_eq!(a, b);
        assert_eq!(a[0], 0x00);
        assert_eq!(a[19], 0x33);
    }

    #[test]
    fn test_read_fingerprint_rejects_malformed() {
        // odd digit count
        assert!(cursor(b"\"00112233445566778899aabbccddeeff0011223\"\r\n")
            .read_fingerprint()
            .is_err());
        // non-hex character
        assert!(cursor(b"\"0011223344556677889zaabbccddeeff00112233\"\r\n")
            .read_fingerprint()
            .is_err());
        // colon in the wrong place
        assert!(cursor(b"\"00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF:00:11:2:233\"\r\n")
            .read_fingerprint()
            .is_err());
        // too long
        assert!(cursor(b"\"00112233445566778899aabbccddeeff0011223344\"\r\n")
            .read_fingerprint()
            .is_err());
    }

    #[test]
    fn test_read_mac() {
        let mut c = cursor(b"\"aa:bb:cc:dd:ee:ff\"\r\n");
        assert_eq!(c.read_mac(), Ok([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
        assert!(c.at_end());
    }

    #[test]
    fn test_finish() {
        assert!(cursor(b"\r\n").finish().is_ok());
        assert_eq!(cursor(b"x\r\n").finish(), Err(DecodeError::TrailingData(0)));
    }
}
