//! Host Session Handler
//!
//! This module plays the role of the serial line between the host and the
//! device. One session owns the device for as long as the host stays
//! connected, reading command lines, running them and writing the replies.
//!
//! ## Session Lifecycle
//!
//! ```text
//! 1. Host connects
//!        │
//!        ▼
//! 2. ConnectionHandler takes the device lock
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────────────┐
//!    │                 Main Loop                    │
//!    │                                              │
//!    │  ┌─────────────────────┐                     │
//!    │  │ Frame buffered bytes│ (line / raw / PEM)  │
//!    │  └──────────┬──────────┘                     │
//!    │             ▼                                │
//!    │  ┌─────────────────────┐                     │
//!    │  │ Echo, execute, reply│──> switch reader    │
//!    │  └──────────┬──────────┘                     │
//!    │             ▼                                │
//!    │  ┌─────────────────────┐   ┌──────────────┐  │
//!    │  │ Read from the host  │ | │ Poll tick    │  │
//!    │  └──────────┬──────────┘   └──────┬───────┘  │
//!    │             │      events, +IPD, CONNECT     │
//!    │        [Loop back] <──────────────┘          │
//!    └──────────────────────────────────────────────┘
//!        │
//!        ▼
//! 4. Host disconnects, lock released, device state kept
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`; the [`LineReader`] decides how
//! much of it forms the next frame, so partial lines and payloads split
//! across reads are handled the same way as several commands in one read.

use crate::commands::{CommandHandler, Next};
use crate::protocol::{Frame, LineConfig, LineReader, ReaderMode, Reply, MSG_ERROR};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// How often link traffic and Wi-Fi events are collected while the host is idle
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Session tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Interval between engine passes while no host bytes arrive
    pub poll_interval: Duration,
    /// Line and PEM size limits
    pub line: LineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            line: LineConfig::default(),
        }
    }
}

/// Statistics for host sessions
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of host sessions accepted
    pub connections_accepted: AtomicU64,
    /// Currently active sessions
    pub active_connections: AtomicU64,
    /// Total command lines processed
    pub commands_processed: AtomicU64,
    /// Total bytes read from hosts
    pub bytes_read: AtomicU64,
    /// Total bytes written to hosts
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Drives one host session.
///
/// Holds the device lock for its whole lifetime, so a second host waits
/// until the first disconnects.
pub struct ConnectionHandler<S> {
    /// The host byte stream
    stream: BufWriter<S>,

    /// Host address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Frames the buffer into lines, send payloads and PEM uploads
    reader: LineReader,

    /// The device, exclusively ours until the session ends
    command_handler: OwnedMutexGuard<CommandHandler>,

    poll_interval: Duration,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new session handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The host byte stream
    /// * `addr` - The host's socket address
    /// * `command_handler` - The locked device
    /// * `config` - Session tuning
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: OwnedMutexGuard<CommandHandler>,
        config: SessionConfig,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            reader: LineReader::new(config.line),
            command_handler,
            poll_interval: config.poll_interval,
            stats,
        }
    }

    /// Runs the session until the host disconnects or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Host connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Host disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Host disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by host")
                }
                _ => warn!(client = %self.addr, error = %e, "Session error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The frame-execute-respond loop, interleaved with engine passes.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            while let Some(frame) = self.reader.next_frame(&mut self.buffer) {
                self.process_frame(frame).await?;
            }

            tokio::select! {
                read = self.read_more_data() => read?,
                _ = tick.tick() => self.flush_events().await?,
            }
        }
    }

    async fn process_frame(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        match frame {
            Frame::Line(line) => {
                if self.command_handler.echo_enabled() {
                    self.write_bytes(&line).await?;
                }

                let outcome = self.command_handler.execute(&line).await;
                self.stats.command_processed();
                self.send_response(&outcome.reply).await?;

                match outcome.next {
                    Next::Line => {}
                    Next::Payload { link, len } => {
                        trace!(client = %self.addr, link, len, "Awaiting send payload");
                        self.reader.expect_payload(link, len);
                    }
                    Next::Pem => {
                        trace!(client = %self.addr, "Awaiting certificate");
                        self.reader.expect_pem();
                    }
                }

                self.flush_events().await
            }
            Frame::Overflow => {
                warn!(client = %self.addr, "Command line too long, discarded");
                self.write_bytes(MSG_ERROR).await
            }
            Frame::Payload { link, data } => {
                trace!(client = %self.addr, link, bytes = data.len(), "Send payload complete");
                let reply = self.command_handler.complete_send(link, data).await;
                self.send_response(&reply).await?;
                self.flush_events().await
            }
            Frame::Pem(pem) => {
                let reply = self.command_handler.complete_pem(Some(pem));
                self.send_response(&reply).await
            }
            Frame::PemOverflow => {
                warn!(client = %self.addr, "Certificate upload too long");
                let reply = self.command_handler.complete_pem(None);
                self.send_response(&reply).await
            }
        }
    }

    /// Writes whatever the device produced since the last pass.
    async fn flush_events(&mut self) -> Result<(), ConnectionError> {
        let events = self.command_handler.poll_events().await;
        if events.is_empty() {
            return Ok(());
        }
        self.send_response(&events).await
    }

    /// Reads more data from the host into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Check buffer size limit
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() && self.reader.mode() == ReaderMode::Line {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial line or payload left behind
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a reply to the host.
    async fn send_response(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        if reply.is_empty() {
            return Ok(());
        }
        self.write_bytes(reply.as_bytes()).await
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that can end a host session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Host disconnected between commands
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Host disconnected mid-line or mid-payload
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Serves one host session against the shared device.
///
/// Waits for any earlier session to release the device first.
///
/// # Arguments
///
/// * `stream` - The host byte stream
/// * `addr` - The host's socket address
/// * `device` - The device shared by all sessions
/// * `config` - Session tuning
/// * `stats` - Shared connection statistics
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    device: Arc<Mutex<CommandHandler>>,
    config: SessionConfig,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let guard = match device.clone().try_lock_owned() {
        Ok(guard) => guard,
        Err(_) => {
            info!(client = %addr, "Device in use, host waiting");
            device.lock_owned().await
        }
    };

    let handler = ConnectionHandler::new(stream, addr, guard, config, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Session ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::handler::tests::{create_handler, handler_with};
    use crate::wifi::{SimNetwork, SimulatedWifi};
    use tokio::io::DuplexStream;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{timeout, Instant};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    /// Spawns a session over an in-memory pipe and returns the host end.
    fn spawn_session(
        handler: CommandHandler,
    ) -> (DuplexStream, Arc<Mutex<CommandHandler>>, Arc<ConnectionStats>) {
        let (host, device_end) = tokio::io::duplex(16 * 1024);
        let device = Arc::new(Mutex::new(handler));
        let stats = Arc::new(ConnectionStats::new());

        tokio::spawn(handle_connection(
            device_end,
            test_addr(),
            Arc::clone(&device),
            SessionConfig::default(),
            Arc::clone(&stats),
        ));

        (host, device, stats)
    }

    /// Reads until `needle` shows up or two seconds pass.
    async fn read_until<R: AsyncRead + Unpin>(stream: &mut R, needle: &str) -> String {
        let mut buf = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);

        while !String::from_utf8_lossy(&buf).contains(needle) && Instant::now() < deadline {
            let mut chunk = [0u8; 1024];
            match timeout(Duration::from_millis(100), stream.read(&mut chunk)).await {
                Ok(Ok(n)) if n > 0 => buf.extend_from_slice(&chunk[..n]),
                Ok(_) => break,
                Err(_) => {}
            }
        }

        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn test_at_with_echo() {
        let (mut host, _, _) = spawn_session(create_handler());

        host.write_all(b"AT\r\n").await.unwrap();
        assert_eq!(read_until(&mut host, "OK\r\n").await, "AT\r\n\r\nOK\r\n");
    }

    #[tokio::test]
    async fn test_echo_off() {
        let (mut host, _, _) = spawn_session(create_handler());

        host.write_all(b"ATE0\r\n").await.unwrap();
        assert_eq!(read_until(&mut host, "OK\r\n").await, "ATE0\r\n\r\nOK\r\n");

        host.write_all(b"AT\r\n").await.unwrap();
        assert_eq!(read_until(&mut host, "OK\r\n").await, "\r\nOK\r\n");
    }

    #[tokio::test]
    async fn test_scripted_host() {
        let host = tokio_test::io::Builder::new()
            .read(b"ATE0\r\n")
            .write(b"ATE0\r\n\r\nOK\r\n")
            .read(b"AT+CIPMUX?\r\n")
            .write(b"+CIPMUX:0\r\n\r\nOK\r\n")
            .build();
        let device = Arc::new(Mutex::new(create_handler()));
        let stats = Arc::new(ConnectionStats::new());

        // The script ends with EOF, which ends the session
        handle_connection(host, test_addr(), device, SessionConfig::default(), Arc::clone(&stats))
            .await;
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_pipelined_and_split_lines() {
        let (mut host, _, _) = spawn_session(create_handler());

        host.write_all(b"ATE0\r\nAT\r\nAT+C").await.unwrap();
        let reply = read_until(&mut host, "\r\nOK\r\n\r\nOK\r\n").await;
        assert_eq!(reply, "ATE0\r\n\r\nOK\r\n\r\nOK\r\n");

        host.write_all(b"IPMUX?\r\n").await.unwrap();
        assert_eq!(
            read_until(&mut host, "OK\r\n").await,
            "+CIPMUX:0\r\n\r\nOK\r\n"
        );
    }

    #[tokio::test]
    async fn test_overlong_line() {
        let (mut host, _, _) = spawn_session(create_handler());

        let mut line = vec![b'A'; 150];
        line.extend_from_slice(b"\r\n");
        host.write_all(&line).await.unwrap();
        assert!(read_until(&mut host, "ERROR\r\n").await.ends_with("\r\nERROR\r\n"));

        host.write_all(b"AT\r\n").await.unwrap();
        assert!(read_until(&mut host, "OK\r\n").await.ends_with("AT\r\n\r\nOK\r\n"));
    }

    #[tokio::test]
    async fn test_send_and_receive_through_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut host, _, _) = spawn_session(create_handler());

        host.write_all(b"ATE0\r\n").await.unwrap();
        read_until(&mut host, "OK\r\n").await;

        host.write_all(format!("AT+CIPSTART=\"TCP\",\"127.0.0.1\",{}\r\n", port).as_bytes())
            .await
            .unwrap();
        assert_eq!(
            read_until(&mut host, "OK\r\n").await,
            "CONNECT\r\n\r\nOK\r\n"
        );
        let (mut peer, _) = listener.accept().await.unwrap();

        // Prompt, then the payload split over two writes
        host.write_all(b"AT+CIPSEND=5\r\n").await.unwrap();
        assert_eq!(read_until(&mut host, "> ").await, "OK\r\n> ");
        host.write_all(b"he").await.unwrap();
        host.write_all(b"llo").await.unwrap();
        assert_eq!(
            read_until(&mut host, "SEND OK\r\n").await,
            "\r\nRecv 5 bytes\r\n\r\nSEND OK\r\n"
        );

        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        // Pushed without any host command
        peer.write_all(b"world").await.unwrap();
        assert_eq!(read_until(&mut host, "world").await, "\r\n+IPD,5:world");

        drop(peer);
        assert_eq!(read_until(&mut host, "CLOSED\r\n").await, "CLOSED\r\n");
    }

    #[tokio::test]
    async fn test_busy_until_join_completes() {
        let wifi = SimulatedWifi::new(vec![SimNetwork::new("home", "secret")])
            .with_delay(Duration::from_millis(300));
        let (mut host, _, _) = spawn_session(handler_with(wifi));

        host.write_all(b"ATE0\r\n").await.unwrap();
        read_until(&mut host, "OK\r\n").await;

        host.write_all(b"AT+CWJAP=\"home\",\"secret\"\r\nAT\r\n")
            .await
            .unwrap();
        assert_eq!(read_until(&mut host, "busy p...\r\n").await, "busy p...\r\n");

        assert_eq!(
            read_until(&mut host, "OK\r\n").await,
            "WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n"
        );

        host.write_all(b"AT\r\n").await.unwrap();
        assert_eq!(read_until(&mut host, "OK\r\n").await, "\r\nOK\r\n");
    }

    #[tokio::test]
    async fn test_device_state_survives_host_sessions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let device = Arc::new(Mutex::new(create_handler()));
        let stats = Arc::new(ConnectionStats::new());

        let device_clone = Arc::clone(&device);
        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                handle_connection(
                    stream,
                    client_addr,
                    Arc::clone(&device_clone),
                    SessionConfig::default(),
                    Arc::clone(&stats_clone),
                )
                .await;
            }
        });

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"AT+CIPMUX=1\r\n").await.unwrap();
        read_until(&mut first, "OK\r\n").await;
        drop(first);

        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(b"AT+CIPMUX?\r\n").await.unwrap();
        assert!(read_until(&mut second, "OK\r\n").await.contains("+CIPMUX:1\r\n"));

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (mut host, _, stats) = spawn_session(create_handler());

        host.write_all(b"AT\r\n").await.unwrap();
        read_until(&mut host, "OK\r\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_read.load(Ordering::Relaxed), 4);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 10);

        drop(host);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
