//! Host Session Module
//!
//! The host talks to the device over a byte stream that stands in for the
//! UART. This module runs that stream: it frames incoming bytes, hands
//! command lines to the [`CommandHandler`](crate::commands::CommandHandler)
//! and writes replies and unsolicited output back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept(), one host at a time
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ LineReader  │───>│ Execute cmd │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │         ▲                                     ▼             │
//! │  ┌─────────────┐                       ┌─────────────┐      │
//! │  │ Poll tick   │──── +IPD / events ───>│ Send reply  │      │
//! │  └─────────────┘                       └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use atmod::connection::{handle_connection, ConnectionStats, SessionConfig};
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! let device = Arc::new(Mutex::new(command_handler));
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! handle_connection(stream, addr, device, SessionConfig::default(), stats).await;
//! ```

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, SessionConfig,
    DEFAULT_POLL_INTERVAL,
};
