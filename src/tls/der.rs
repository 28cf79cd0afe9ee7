//! Minimal DER Scanner
//!
//! Just enough DER to pull the Common Name out of a certificate for display.
//! The scanner understands one primitive, [`read_header`], and walks a fixed
//! path through the certificate with it:
//!
//! ```text
//! Certificate            SEQUENCE
//! └─ TBSCertificate      SEQUENCE
//!    ├─ version          [0]        (skipped)
//!    ├─ serialNumber     INTEGER    (skipped)
//!    ├─ signature        SEQUENCE   (skipped)
//!    └─ issuer           SEQUENCE
//!       └─ RDN           SET        (iterated)
//!          └─ AVA        SEQUENCE
//!             ├─ type    OID        == 55 04 03 ?
//!             └─ value   PrintableString / UTF8String
//! ```
//!
//! Nothing here is security relevant: trust decisions are made by rustls on
//! the same bytes. Any deviation from the expected shape yields `None`.

/// SEQUENCE
pub const TAG_SEQUENCE: u8 = 0x30;
/// SET
pub const TAG_SET: u8 = 0x31;
/// INTEGER
pub const TAG_INTEGER: u8 = 0x02;
/// OBJECT IDENTIFIER
pub const TAG_OID: u8 = 0x06;
/// PrintableString
pub const TAG_PRINTABLE_STRING: u8 = 0x13;
/// UTF8String
pub const TAG_UTF8_STRING: u8 = 0x0c;
/// Context-specific constructed [0]
pub const TAG_CONTEXT_0: u8 = 0xa0;

/// Encoded commonName attribute type (2.5.4.3)
pub const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];

/// A decoded element header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: u8,
    /// Payload length in bytes
    pub len: usize,
    /// Offset of the first payload byte
    pub data_start: usize,
}

impl Header {
    /// Offset one past the last payload byte.
    pub fn data_end(&self) -> usize {
        self.data_start + self.len
    }
}

/// Reads the element header at `*pos`.
///
/// Supports short-form lengths and the two-byte long form (`0x82 hi lo`).
/// The whole element must end at or before `limit`. On success `*pos`
/// moves past the element; on failure it is left alone.
pub fn read_header(buf: &[u8], pos: &mut usize, limit: usize) -> Option<Header> {
    let limit = limit.min(buf.len());
    let start = *pos;
    let tag = *buf.get(start..limit)?.first()?;
    let first = *buf.get(start + 1..limit)?.first()?;

    let (len, header_len) = match first {
        l if l < 0x80 => (usize::from(l), 2),
        0x82 => {
            let bytes = buf.get(start + 2..start + 4)?;
            if start + 4 > limit {
                return None;
            }
            ((usize::from(bytes[0]) << 8) | usize::from(bytes[1]), 4)
        }
        _ => return None,
    };

    let header = Header {
        tag,
        len,
        data_start: start + header_len,
    };
    if header.data_end() > limit {
        return None;
    }
    *pos = header.data_end();
    Some(header)
}

/// Reads a header and requires `tag`.
fn expect(buf: &[u8], pos: &mut usize, limit: usize, tag: u8) -> Option<Header> {
    let mut ahead = *pos;
    let header = read_header(buf, &mut ahead, limit)?;
    if header.tag != tag {
        return None;
    }
    *pos = ahead;
    Some(header)
}

/// Returns the issuer Common Name of a DER certificate, borrowed from `der`.
pub fn common_name(der: &[u8]) -> Option<&[u8]> {
    let mut pos = 0;
    let cert = expect(der, &mut pos, der.len(), TAG_SEQUENCE)?;

    pos = cert.data_start;
    let tbs = expect(der, &mut pos, cert.data_end(), TAG_SEQUENCE)?;

    pos = tbs.data_start;
    let limit = tbs.data_end();
    expect(der, &mut pos, limit, TAG_CONTEXT_0)?;
    expect(der, &mut pos, limit, TAG_INTEGER)?;
    expect(der, &mut pos, limit, TAG_SEQUENCE)?;
    let issuer = expect(der, &mut pos, limit, TAG_SEQUENCE)?;

    pos = issuer.data_start;
    while pos < issuer.data_end() {
        let rdn = expect(der, &mut pos, issuer.data_end(), TAG_SET)?;

        let mut inner = rdn.data_start;
        let ava = expect(der, &mut inner, rdn.data_end(), TAG_SEQUENCE)?;

        inner = ava.data_start;
        let oid = expect(der, &mut inner, ava.data_end(), TAG_OID)?;
        if &der[oid.data_start..oid.data_end()] != OID_COMMON_NAME {
            continue;
        }

        let value = read_header(der, &mut inner, ava.data_end())?;
        if value.tag != TAG_PRINTABLE_STRING && value.tag != TAG_UTF8_STRING {
            return None;
        }
        return Some(&der[value.data_start..value.data_end()]);
    }

    None
}
