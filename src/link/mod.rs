//! Link Layer
//!
//! Network connections the host opens with `AT+CIPSTART` or accepts through
//! `AT+CIPSERVER`, and the engine that moves their data back to the host.
//!
//! ```text
//!   ServerPool ──accept──┐
//!                        ▼
//!   CIPSTART ──open──> Registry [0][1][2][3][4] ──fill──> Transfer::pump ──> host
//!                        ▲                                      │
//!   CIPSEND ────send─────┘                 +IPD / CONNECT / CLOSED
//! ```

pub mod registry;
pub mod server;
pub mod socket;
pub mod transfer;

pub use registry::{read_link_prefix, MuxMode, Registry, RegistryError, ALL_LINKS, MAX_LINKS};
pub use server::{ServerConfig, ServerError, ServerPool, DEFAULT_SERVER_PORT, SERVERS_COUNT};
pub use socket::{resolve, Link, LinkType, OpenError, Origin, DNS_TIMEOUT};
pub use transfer::{RecvMode, Transfer, TransferError, MAX_TRANSFER};
