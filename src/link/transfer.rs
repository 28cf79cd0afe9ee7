//! Data Transfer Engine
//!
//! Moves received bytes from the links to the host. Runs between commands
//! and after each one:
//!
//! 1. accept waiting server connections into free slots (`<id>,CONNECT`)
//! 2. pull ready bytes from every socket into its buffer
//! 3. deliver them, pushed as `+IPD` frames in active mode or announced
//!    with a length notification in passive mode
//! 4. report links the peer closed once nothing is left to deliver, and
//!    close server links that sat idle past the timeout

use super::registry::Registry;
use super::server::ServerPool;
use super::socket::{Link, Origin};
use crate::protocol::Reply;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};

/// Largest `AT+CIPSEND` / `AT+CIPRECVDATA` size
pub const MAX_TRANSFER: usize = 2048;

/// Receive delivery mode (`AT+CIPRECVMODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecvMode {
    #[default]
    Active,
    Passive,
}

impl RecvMode {
    pub fn code(self) -> u8 {
        match self {
            RecvMode::Active => 0,
            RecvMode::Passive => 1,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("link {0} is not open")]
    NotOpen(usize),

    #[error("no data buffered")]
    Empty,
}

/// Delivery settings shared by every link.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transfer {
    mode: RecvMode,
    /// Append the remote address to `+IPD` frames (`AT+CIPDINFO`)
    pub show_remote: bool,
}

impl Transfer {
    pub fn mode(&self) -> RecvMode {
        self.mode
    }

    /// Changes the delivery mode.
    ///
    /// Leaving passive mode marks links that still hold bytes so the next
    /// pass delivers what is left and then closes them.
    pub fn set_mode(&mut self, mode: RecvMode, registry: &mut Registry) {
        if self.mode == RecvMode::Passive && mode == RecvMode::Active {
            for id in registry.open_ids() {
                if let Some(link) = registry.get_mut(id) {
                    if link.available() > 0 {
                        link.drain_then_close = true;
                    }
                }
            }
        }
        self.mode = mode;
    }

    /// Runs one engine pass, appending unsolicited output to `out`.
    pub async fn pump(&self, registry: &mut Registry, servers: &mut ServerPool, out: &mut Reply) {
        self.accept(registry, servers, out).await;

        let idle_timeout = servers.config.idle_timeout;
        for id in registry.open_ids() {
            let prefix = registry.prefix(id);
            let Some(link) = registry.get_mut(id) else {
                continue;
            };

            link.fill().await;

            match self.mode {
                RecvMode::Active => {
                    while link.available() > 0 {
                        let data = link.take(MAX_TRANSFER);
                        push_frame(out, &prefix, &data, self.show_remote.then(|| link.remote()));
                    }
                    if link.drain_then_close {
                        close(registry, id, out, &prefix).await;
                        continue;
                    }
                }
                RecvMode::Passive => {
                    let available = link.available();
                    if available > link.last_available {
                        write!(out, "+IPD,{}{}\r\n", prefix, available);
                    }
                    link.last_available = available;
                }
            }

            if !link.is_connected() {
                debug!(link = id, "Peer closed link");
                close(registry, id, out, &prefix).await;
                continue;
            }

            if matches!(link.origin(), Origin::Server(_))
                && !idle_timeout.is_zero()
                && link.last_activity.elapsed() > idle_timeout
            {
                info!(link = id, "Server link idle, closing");
                close(registry, id, out, &prefix).await;
            }
        }
    }

    async fn accept(&self, registry: &mut Registry, servers: &mut ServerPool, out: &mut Reply) {
        for (stream, addr, port) in servers.accept_ready().await {
            let slot = registry
                .lowest_free()
                .filter(|_| registry.server_links() < servers.config.max_connections);
            match slot {
                Some(id) => {
                    if registry.insert(id, Link::accepted(stream, addr, port)).is_ok() {
                        write!(out, "{},CONNECT\r\n", id);
                    }
                }
                None => debug!(client = %addr, "No free link for accepted connection"),
            }
        }
    }

    /// Takes up to `size` buffered bytes for `AT+CIPRECVDATA`.
    ///
    /// In active mode a successful pull also closes the link.
    pub async fn pull(
        &self,
        registry: &mut Registry,
        id: usize,
        size: usize,
    ) -> Result<Bytes, TransferError> {
        let link = registry.get_mut(id).ok_or(TransferError::NotOpen(id))?;
        link.fill().await;

        let data = link.take(size.min(MAX_TRANSFER));
        if data.is_empty() {
            return Err(TransferError::Empty);
        }
        link.last_available = link.last_available.saturating_sub(data.len());

        if self.mode == RecvMode::Active {
            if let Some(mut link) = registry.remove(id) {
                link.stop().await;
            }
        }
        Ok(data)
    }
}

/// Appends one `+IPD` frame carrying `data`.
pub fn push_frame(out: &mut Reply, prefix: &str, data: &[u8], remote: Option<std::net::SocketAddr>) {
    write!(out, "\r\n+IPD,{}{}", prefix, data.len());
    if let Some(addr) = remote {
        write!(out, ",\"{}\",{}", addr.ip(), addr.port());
    }
    out.raw(":").raw(data);
}

async fn close(registry: &mut Registry, id: usize, out: &mut Reply, prefix: &str) {
    if let Some(mut link) = registry.remove(id) {
        link.stop().await;
    }
    write!(out, "{}CLOSED\r\n", prefix);
}
