//! AT Protocol Implementation
//!
//! This module provides the byte-level pieces of the AT command protocol.
//!
//! ## Overview
//!
//! The host sends single CRLF-terminated text lines starting with `AT` and
//! the device answers with informational lines plus one terminal token.
//! Two sub-protocols temporarily replace line framing: raw payload bytes
//! after `AT+CIPSEND`, and a PEM certificate after `AT+CIPSSLCERT`.
//!
//! ## Modules
//!
//! - `types`: Reply tokens and the `Reply` builder
//! - `parser`: Cursor-based argument decoder
//! - `line`: Host stream framing (line, raw and PEM modes)
//!
//! ## Example
//!
//! ```ignore
//! use atmod::protocol::{Cursor, Reply};
//!
//! let line = b"AT+CIPSTO=30\r\n";
//! let mut cursor = Cursor::new(line, 10);
//! let timeout = cursor.read_number_in(0..=7200)?;
//! cursor.finish()?;
//!
//! let mut reply = Reply::new();
//! reply.ok();
//! ```

pub mod line;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use line::{Frame, LineConfig, LineReader, ReaderMode};
pub use parser::{Cursor, DecodeError, DecodeResult};
pub use types::{Reply, MSG_ERROR, MSG_OK};
