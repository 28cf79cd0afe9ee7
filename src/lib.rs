//! # atmod - An AT Command Network Front-End
//!
//! atmod speaks the ESP8266 AT command set over a byte stream and carries
//! out the network work behind it: TCP, UDP and TLS links, listening
//! sockets, push or pull delivery of received data, and a small trust
//! store for verifying TLS servers. A host that drives an ESP8266 modem
//! through its UART can drive atmod through a socket instead.
//!
//! ## Features
//!
//! - **AT Compatible**: Exact response texts and prompts of the 1.7 AT firmware
//! - **Up to Five Links**: Single or multiplexed mode, client or server side
//! - **TLS**: Fingerprint pinning or CA bundle verification through rustls
//! - **Persistent Settings**: Checksummed record that survives restarts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               atmod                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (host side) │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                     ┌──────┴──────┐           ▼                         │
//! │                     │ LineReader  │    ┌─────────────────────────────┐  │
//! │                     │   Cursor    │    │           Device            │  │
//! │                     └─────────────┘    │ ┌────────┐ ┌──────────────┐ │  │
//! │                                        │ │Registry│ │ TrustManager │ │  │
//! │                                        │ │ 0..4   │ └──────────────┘ │  │
//! │                                        │ └────────┘ ┌──────────────┐ │  │
//! │                                        │ ┌────────┐ │SettingsStore │ │  │
//! │                                        │ │Servers │ └──────────────┘ │  │
//! │                                        │ └────────┘ ┌──────────────┐ │  │
//! │                                        │ ┌────────┐ │  WifiDriver  │ │  │
//! │                                        │ │Transfer│ └──────────────┘ │  │
//! │                                        │ └────────┘                  │  │
//! │                                        └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use atmod::commands::CommandHandler;
//! use atmod::connection::{handle_connection, ConnectionStats, SessionConfig};
//! use atmod::device::Device;
//! use atmod::storage::SettingsStore;
//! use atmod::wifi::{SimNetwork, SimulatedWifi};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::Mutex;
//!
//! #[tokio::main]
//! async fn main() {
//!     let wifi = SimulatedWifi::new(vec![SimNetwork::new("atmod", "atmod1234")]);
//!     let device = Device::new(SettingsStore::open("atmod-settings.bin"), Box::new(wifi));
//!     let device = Arc::new(Mutex::new(CommandHandler::new(device)));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:2323").await.unwrap();
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let device = Arc::clone(&device);
//!         let stats = Arc::clone(&stats);
//!         tokio::spawn(handle_connection(stream, addr, device, SessionConfig::default(), stats));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Reply vocabulary, argument decoder and line framing
//! - [`commands`]: Command table, dispatcher and handlers
//! - [`device`]: The state every command operates on
//! - [`link`]: Link registry, sockets, listeners and the transfer engine
//! - [`tls`]: Trust configuration, certificate verifiers and the DER scanner
//! - [`storage`]: Persisted settings
//! - [`wifi`]: Radio driver interface and the simulated radio
//! - [`connection`]: Host session management
//!
//! ## Design Highlights
//!
//! ### One Owner
//!
//! All mutable state sits in a single [`device::Device`] owned by the
//! command handler. Rules that span several pieces, such as refusing a
//! multiplex change while links are open, are checked where that state is
//! reachable as a whole.
//!
//! ### Run to Completion
//!
//! A command is fully executed and answered before the next line is read.
//! Background work (joining an access point, scanning) marks the device
//! busy; the completion event clears the flag and finishes the response.

pub mod commands;
pub mod connection;
pub mod device;
pub mod link;
pub mod protocol;
pub mod storage;
pub mod tls;
pub mod wifi;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats, SessionConfig};
pub use device::Device;
pub use protocol::{Cursor, DecodeError, LineReader, Reply};
pub use storage::{Settings, SettingsStore};

/// The default port the host session listens on
pub const DEFAULT_PORT: u16 = 2323;

/// The default host the session listener binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of atmod
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
