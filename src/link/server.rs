//! Listening servers (`AT+CIPSERVER`).

use std::future::poll_fn;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::task::Poll;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Number of listeners that can run at once
pub const SERVERS_COUNT: usize = 2;

/// Port used by `AT+CIPSERVER=1` without an explicit port
pub const DEFAULT_SERVER_PORT: u16 = 333;

/// Limits applied to accepted connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum simultaneously open server-originated links
    pub max_connections: usize,
    /// Idle time after which a server link is closed; zero disables
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            idle_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no listener on that port")]
    NotRunning,

    #[error("port {0} already listening")]
    AlreadyRunning(u16),

    #[error("all listener slots in use")]
    NoFreeSlot,

    #[error("cannot listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
struct Listener {
    /// Port the host asked for; the link's local port
    port: u16,
    socket: TcpListener,
}

/// The listener slots.
#[derive(Debug)]
pub struct ServerPool {
    listeners: [Option<Listener>; SERVERS_COUNT],
    bind_ip: IpAddr,
    pub config: ServerConfig,
}

impl Default for ServerPool {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

impl ServerPool {
    /// A pool binding its listeners on `bind_ip`.
    pub fn new(bind_ip: IpAddr) -> Self {
        Self {
            listeners: Default::default(),
            bind_ip,
            config: ServerConfig::default(),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listeners.iter().any(Option::is_some)
    }

    /// Ports currently listening.
    pub fn ports(&self) -> Vec<u16> {
        self.listeners.iter().flatten().map(|l| l.port).collect()
    }

    /// Starts a listener on `port`.
    pub async fn start(&mut self, port: u16) -> Result<(), ServerError> {
        if self.ports().contains(&port) {
            return Err(ServerError::AlreadyRunning(port));
        }
        let slot = self
            .listeners
            .iter_mut()
            .find(|l| l.is_none())
            .ok_or(ServerError::NoFreeSlot)?;

        let socket = TcpListener::bind(SocketAddr::new(self.bind_ip, port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        info!(port, "Server listening");
        *slot = Some(Listener { port, socket });
        Ok(())
    }

    /// Stops the listener on `port`, or the first one when `port` is zero.
    pub fn stop(&mut self, port: u16) -> Result<u16, ServerError> {
        let slot = self
            .listeners
            .iter_mut()
            .find(|l| matches!(l, Some(l) if port == 0 || l.port == port))
            .ok_or(ServerError::NotRunning)?;
        let stopped = slot.take().map(|l| l.port).unwrap_or(port);
        info!(port = stopped, "Server stopped");
        Ok(stopped)
    }

    /// Actual bound address of the listener started for `port`.
    pub fn local_addr(&self, port: u16) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .flatten()
            .find(|l| l.port == port)
            .and_then(|l| l.socket.local_addr().ok())
    }

    /// Collects every connection waiting on any listener without blocking.
    ///
    /// Each entry carries the listening port it arrived on.
    pub async fn accept_ready(&mut self) -> Vec<(TcpStream, SocketAddr, u16)> {
        let mut accepted = Vec::new();
        for listener in self.listeners.iter_mut().flatten() {
            loop {
                let polled = poll_fn(|cx| match listener.socket.poll_accept(cx) {
                    Poll::Ready(result) => Poll::Ready(Some(result)),
                    Poll::Pending => Poll::Ready(None),
                })
                .await;

                match polled {
                    Some(Ok((stream, addr))) => {
                        debug!(port = listener.port, client = %addr, "Accepted connection");
                        accepted.push((stream, addr, listener.port));
                    }
                    Some(Err(e)) => {
                        warn!(port = listener.port, error = %e, "Accept failed");
                        break;
                    }
                    None => break,
                }
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_pool() -> ServerPool {
        ServerPool::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_start_stop() {
        let mut pool = local_pool();
        let port = free_port();

        pool.start(port).await.unwrap();
        assert!(pool.is_listening());
        assert!(matches!(
            pool.start(port).await,
            Err(ServerError::AlreadyRunning(p)) if p == port
        ));

        assert_eq!(pool.stop(port).unwrap(), port);
        assert!(!pool.is_listening());
        assert!(matches!(pool.stop(port), Err(ServerError::NotRunning)));
    }

    #[tokio::test]
    async fn test_slot_limit_and_stop_any() {
        let mut pool = local_pool();
        pool.start(free_port()).await.unwrap();
        pool.start(free_port()).await.unwrap();
        assert!(matches!(
            pool.start(free_port()).await,
            Err(ServerError::NoFreeSlot)
        ));

        pool.stop(0).unwrap();
        pool.stop(0).unwrap();
        assert!(matches!(pool.stop(0), Err(ServerError::NotRunning)));
    }

    #[tokio::test]
    async fn test_accept_ready() {
        let mut pool = local_pool();
        let port = free_port();
        pool.start(port).await.unwrap();
        assert!(pool.accept_ready().await.is_empty());

        let addr = pool.local_addr(port).unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let accepted = pool.accept_ready().await;
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].2, port);
    }
}
