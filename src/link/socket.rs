//! Link sockets
//!
//! A [`Link`] owns one physical TCP, UDP or TLS socket plus the receive
//! buffer the Data Transfer Engine drains. Reading is never blocking:
//! [`Link::fill`] moves whatever the socket has ready into the buffer and
//! returns immediately.

use crate::tls::server_name_for;
use bytes::{Bytes, BytesMut};
use rustls::ClientConfig;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::{timeout, Instant};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Upper bound on name resolution
pub const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes buffered per link before the socket is left to apply backpressure
pub const RX_LIMIT: usize = 8 * 1024;

const READ_CHUNK: usize = 2048;

/// Link protocol, as written in `AT+CIPSTART` and `AT+CIPSTATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Tcp,
    Udp,
    Ssl,
}

impl LinkType {
    pub fn parse(text: &[u8]) -> Option<Self> {
        match text {
            b"TCP" => Some(LinkType::Tcp),
            b"UDP" => Some(LinkType::Udp),
            b"SSL" => Some(LinkType::Ssl),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Tcp => "TCP",
            LinkType::Udp => "UDP",
            LinkType::Ssl => "SSL",
        }
    }
}

/// Who initiated the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Opened by `AT+CIPSTART`
    Client,
    /// Accepted by a listener on the given port
    Server(u16),
}

/// Errors while opening a link.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("cannot resolve {0}")]
    Dns(String),

    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("invalid TLS server name {0:?}")]
    ServerName(String),

    #[error("SSL link requested without a TLS configuration")]
    MissingTlsConfig,
}

enum Transport {
    Tcp(TcpStream),
    Udp(UdpSocket),
    Tls(Box<TlsStream<TcpStream>>),
}

/// One open link: the socket and its bookkeeping.
pub struct Link {
    transport: Transport,
    kind: LinkType,
    origin: Origin,
    remote: SocketAddr,
    local_port: u16,
    rx: BytesMut,
    peer_closed: bool,
    /// Assigned by the registry on insert; distinguishes reuses of a slot
    pub(super) serial: u64,
    /// Bytes announced by `AT+CIPSEND` and not yet delivered
    pub pending_send: usize,
    /// Available count last reported to the host in passive mode
    pub last_available: usize,
    pub last_activity: Instant,
    /// Set when switching to active mode with bytes still buffered
    pub drain_then_close: bool,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .field("remote", &self.remote)
            .field("local_port", &self.local_port)
            .field("buffered", &self.rx.len())
            .field("peer_closed", &self.peer_closed)
            .finish()
    }
}

/// Resolves `host` with the fixed lookup timeout, preferring IPv4.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, OpenError> {
    let addrs = match timeout(DNS_TIMEOUT, lookup_host((host, port))).await {
        Ok(Ok(addrs)) => addrs.collect::<Vec<_>>(),
        Ok(Err(e)) => {
            debug!(host, error = %e, "Name resolution failed");
            return Err(OpenError::Dns(host.to_string()));
        }
        Err(_) => {
            debug!(host, "Name resolution timed out");
            return Err(OpenError::Dns(host.to_string()));
        }
    };
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| OpenError::Dns(host.to_string()))
}

impl Link {
    /// Opens an outgoing link to an already resolved address.
    ///
    /// `host` is used as the TLS server name for SSL links.
    pub async fn open(
        kind: LinkType,
        host: &str,
        addr: SocketAddr,
        tls: Option<Arc<ClientConfig>>,
    ) -> Result<Self, OpenError> {
        let transport = match kind {
            LinkType::Tcp => Transport::Tcp(TcpStream::connect(addr).await.map_err(OpenError::Connect)?),
            LinkType::Udp => {
                let bind: SocketAddr = if addr.is_ipv4() {
                    SocketAddr::from(([0, 0, 0, 0], 0))
                } else {
                    SocketAddr::from(([0u16; 8], 0))
                };
                let socket = UdpSocket::bind(bind).await.map_err(OpenError::Connect)?;
                socket.connect(addr).await.map_err(OpenError::Connect)?;
                Transport::Udp(socket)
            }
            LinkType::Ssl => {
                let config = tls.ok_or(OpenError::MissingTlsConfig)?;
                let name = server_name_for(host).ok_or_else(|| OpenError::ServerName(host.to_string()))?;
                let tcp = TcpStream::connect(addr).await.map_err(OpenError::Connect)?;
                let stream = TlsConnector::from(config)
                    .connect(name, tcp)
                    .await
                    .map_err(OpenError::Handshake)?;
                Transport::Tls(Box::new(stream))
            }
        };

        let local_port = match &transport {
            Transport::Tcp(s) => s.local_addr(),
            Transport::Udp(s) => s.local_addr(),
            Transport::Tls(s) => s.get_ref().0.local_addr(),
        }
        .map(|a| a.port())
        .unwrap_or(0);

        debug!(kind = kind.as_str(), remote = %addr, local_port, "Link opened");
        Ok(Self::new(transport, kind, Origin::Client, addr, local_port))
    }

    /// Wraps a connection accepted by a listener on `port`.
    pub fn accepted(stream: TcpStream, remote: SocketAddr, port: u16) -> Self {
        Self::new(Transport::Tcp(stream), LinkType::Tcp, Origin::Server(port), remote, port)
    }

    fn new(transport: Transport, kind: LinkType, origin: Origin, remote: SocketAddr, local_port: u16) -> Self {
        Self {
            transport,
            kind,
            origin,
            remote,
            local_port,
            rx: BytesMut::with_capacity(READ_CHUNK),
            peer_closed: false,
            serial: 0,
            pending_send: 0,
            last_available: 0,
            last_activity: Instant::now(),
            drain_then_close: false,
        }
    }

    pub fn kind(&self) -> LinkType {
        self.kind
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Bytes buffered and not yet delivered to the host.
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Connected, or closed by the peer with data still to deliver.
    pub fn is_connected(&self) -> bool {
        !self.peer_closed || !self.rx.is_empty()
    }

    /// Moves ready bytes from the socket into the buffer without waiting.
    ///
    /// Returns the number of bytes added. A read error marks the peer closed.
    pub async fn fill(&mut self) -> usize {
        let mut added = 0;
        let mut chunk = [0u8; READ_CHUNK];

        while !self.peer_closed && self.rx.len() < RX_LIMIT {
            let want = READ_CHUNK.min(RX_LIMIT - self.rx.len());
            let polled = match &mut self.transport {
                Transport::Tcp(s) => poll_read_once(s, &mut chunk[..want]).await,
                Transport::Tls(s) => poll_read_once(&mut **s, &mut chunk[..want]).await,
                Transport::Udp(s) => match s.try_recv(&mut chunk[..want]) {
                    Ok(n) => Ok(Some(n)),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                    Err(e) => Err(e),
                },
            };

            match polled {
                Ok(Some(0)) if self.kind != LinkType::Udp => {
                    trace!(remote = %self.remote, "Peer closed link");
                    self.peer_closed = true;
                }
                Ok(Some(n)) => {
                    self.rx.extend_from_slice(&chunk[..n]);
                    self.last_activity = Instant::now();
                    added += n;
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(remote = %self.remote, error = %e, "Link read failed");
                    self.peer_closed = true;
                }
            }
        }

        added
    }

    /// Removes up to `max` buffered bytes.
    pub fn take(&mut self, max: usize) -> Bytes {
        let n = max.min(self.rx.len());
        self.rx.split_to(n).freeze()
    }

    /// Writes a payload to the socket. UDP sends one datagram.
    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.transport {
            Transport::Tcp(s) => {
                s.write_all(data).await?;
                s.flush().await?;
            }
            Transport::Tls(s) => {
                s.write_all(data).await?;
                s.flush().await?;
            }
            Transport::Udp(s) => {
                s.send(data).await?;
            }
        }
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Closes the socket. Errors are ignored; the link is going away.
    pub async fn stop(&mut self) {
        let result = match &mut self.transport {
            Transport::Tcp(s) => s.shutdown().await,
            Transport::Tls(s) => s.shutdown().await,
            Transport::Udp(_) => Ok(()),
        };
        if let Err(e) = result {
            trace!(remote = %self.remote, error = %e, "Shutdown failed");
        }
        self.peer_closed = true;
    }
}

/// Polls a reader exactly once; `None` means nothing is ready.
async fn poll_read_once<R>(io: &mut R, chunk: &mut [u8]) -> io::Result<Option<usize>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    poll_fn(|cx| {
        let mut buf = ReadBuf::new(&mut *chunk);
        match Pin::new(&mut *io).poll_read(cx, &mut buf) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(Some(buf.filled().len()))),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Ready(Ok(None)),
        }
    })
    .await
}
