//! Command Handler Module
//!
//! This module implements the command processing layer: it resolves a
//! complete `AT` line to a table entry, runs the handler against the device
//! state and produces the exact reply bytes the host expects.
//!
//! ## Architecture
//!
//! ```text
//! Host Line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Command Table  │  (table)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (handler, tcpip, ssl, system)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Device      │  links, listeners, trust, settings, radio
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Basic
//! - `AT`, `AT+RST`, `AT+GMR`, `ATE0`/`ATE1`, `AT+RESTORE`
//! - `AT+UART`, `AT+UART_CUR`, `AT+UART_DEF`
//! - `AT+SYSRAM?`, `AT+SYSCPUFREQ`, `AT+RFMODE`
//!
//! ### Wi-Fi
//! - `AT+CWMODE`, `AT+CWJAP`, `AT+CWLAP`, `AT+CWQAP`
//! - `AT+CWDHCP`, `AT+CIPSTA`, `AT+CWHOSTNAME`, `AT+CIPDNS`
//! - `AT+CWAUTOCONN`, `AT+CIPSTAMAC`, `AT+CIPAPMAC`
//!
//! ### TCP/IP
//! - `AT+CIPSTATUS`, `AT+CIPSTART`, `AT+CIPSEND`, `AT+CIPCLOSE`, `AT+CIPCLOSEMODE`
//! - `AT+CIFSR`, `AT+CIPMUX`, `AT+CIPDINFO`
//! - `AT+CIPSERVER`, `AT+CIPSERVERMAXCONN`, `AT+CIPSTO`
//! - `AT+CIPRECVMODE`, `AT+CIPRECVDATA`, `AT+CIPRECVLEN`
//! - `AT+CIPSNTPCFG`, `AT+CIPSNTPTIME?`, `AT+SNTPTIME?`
//!
//! ### TLS
//! - `AT+CIPSSLSIZE`, `AT+CIPSSLAUTH`, `AT+CIPSSLFP`
//! - `AT+CIPSSLCERTMAX`, `AT+CIPSSLCERT`

pub mod error;
pub mod handler;
mod ssl;
mod system;
pub mod table;
mod tcpip;

// Re-export the main command handler
pub use error::{CommandError, CommandResult};
pub use handler::{CommandHandler, Completion, Next, Outcome};
pub use table::{find_command, CommandId, Form, MatchError, Matched, Scope, COMMANDS};
