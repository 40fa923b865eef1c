//! Connection establishment and byte-level session I/O.

use crate::error::ConnectError;
use crate::target::RemoteTarget;
use bytes::BytesMut;
use rshcp_protocol::PRIVILEGED_PORTS;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::Instant;

/// Default read buffer size (32 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 32 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Read deadline applied after a privileged connect.
pub const PRIVILEGED_READ_DEADLINE: Duration = Duration::from_secs(30);

/// Upper bound on the buffer reserved up front for a payload.
const MAX_PREALLOC: u64 = 1024 * 1024;

/// How the local end of a connection is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Any local port picked by the OS.
    Plain,
    /// A reserved port from 1023 down to 512, as rshd requires.
    Privileged,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Local port selection.
    pub mode: ConnectMode,
    /// Timeout for each TCP connect attempt.
    pub connect_timeout: Option<Duration>,
    /// Deadline for all reads, measured from the moment the connection is up.
    pub read_deadline: Option<Duration>,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    /// Plain connect, no timeouts.
    pub fn plain() -> Self {
        Self {
            mode: ConnectMode::Plain,
            connect_timeout: None,
            read_deadline: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Privileged source port with the 30 second read deadline.
    pub fn privileged() -> Self {
        Self {
            mode: ConnectMode::Privileged,
            read_deadline: Some(PRIVILEGED_READ_DEADLINE),
            ..Self::plain()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_read_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.read_deadline = deadline;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::plain()
    }
}

/// Source ports tried by a privileged connect, highest first.
pub fn privileged_ports() -> impl Iterator<Item = u16> {
    PRIVILEGED_PORTS.rev()
}

/// Opens a connection to `target`.
pub async fn connect(
    target: &RemoteTarget,
    config: &ConnectionConfig,
) -> Result<Connection, ConnectError> {
    connect_using(target, config, privileged_ports()).await
}

/// Opens a connection, taking privileged source ports from `ports`.
pub(crate) async fn connect_using(
    target: &RemoteTarget,
    config: &ConnectionConfig,
    ports: impl IntoIterator<Item = u16>,
) -> Result<Connection, ConnectError> {
    let stream = match config.mode {
        ConnectMode::Plain => connect_plain(target, config).await?,
        ConnectMode::Privileged => {
            let addr = resolve(target).await?.into_iter().next().ok_or_else(|| {
                ConnectError::NoAddress(target.authority())
            })?;
            connect_from_ports(addr, ports, config).await?
        }
    };

    stream.set_nodelay(true).ok();

    let deadline = config.read_deadline.map(|d| Instant::now() + d);
    Ok(Connection::new(stream, target.authority())
        .with_deadline(deadline)
        .with_read_buffer_size(config.read_buffer_size))
}

async fn resolve(target: &RemoteTarget) -> Result<Vec<SocketAddr>, ConnectError> {
    tokio::net::lookup_host((target.hostname(), target.port()))
        .await
        .map(|addrs| addrs.collect())
        .map_err(|source| ConnectError::Resolve {
            host: target.hostname().to_string(),
            source,
        })
}

async fn connect_plain(
    target: &RemoteTarget,
    config: &ConnectionConfig,
) -> Result<TcpStream, ConnectError> {
    let mut last_error = None;
    for addr in resolve(target).await? {
        tracing::debug!("Connecting to {}...", addr);
        match within(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                last_error = Some(ConnectError::Timeout(addr));
            }
            Err(source) => {
                tracing::debug!("Connection to {} failed: {}", addr, source);
                last_error = Some(ConnectError::Connect { addr, source });
            }
        }
    }
    Err(last_error.unwrap_or_else(|| ConnectError::NoAddress(target.authority())))
}

/// Connects to `addr` from the first usable local port in `ports`.
///
/// Ports are tried one at a time in the order given. A port that cannot
/// be bound, or whose connection collides with an existing one, is
/// skipped; any other connect failure ends the attempt.
pub(crate) async fn connect_from_ports(
    addr: SocketAddr,
    ports: impl IntoIterator<Item = u16>,
    config: &ConnectionConfig,
) -> Result<TcpStream, ConnectError> {
    let unspecified = match addr.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };

    let mut attempts = 0;
    let mut last_error = None;
    for port in ports {
        attempts += 1;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|source| ConnectError::Connect { addr, source })?;

        if let Err(e) = socket.bind(SocketAddr::new(unspecified, port)) {
            tracing::debug!("Failed to bind local port {}: {}", port, e);
            last_error = Some(e);
            continue;
        }

        match within(config.connect_timeout, socket.connect(addr)).await {
            Ok(stream) => {
                tracing::debug!(
                    "Connected to {} from local port {} after {} attempts",
                    addr,
                    port,
                    attempts
                );
                return Ok(stream);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable
                ) =>
            {
                tracing::debug!("Local port {} unusable for {}: {}", port, addr, e);
                last_error = Some(e);
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(ConnectError::Timeout(addr));
            }
            Err(source) => return Err(ConnectError::Connect { addr, source }),
        }
    }

    tracing::warn!(
        "No privileged port usable for {} after {} attempts",
        addr,
        attempts
    );
    Err(ConnectError::Privilege {
        attempts,
        last_error,
    })
}

/// Runs `fut`, failing with `TimedOut` once `timeout` elapses.
async fn within<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))),
        None => fut.await,
    }
}

/// Runs `fut`, failing with `TimedOut` once `deadline` has passed.
async fn before<T>(
    deadline: Option<Instant>,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read deadline exceeded",
                ))
            }),
        None => fut.await,
    }
}

/// An open rsh/rcp session.
///
/// Owned by exactly one operation; [`Connection::close`] consumes it, and
/// dropping it releases the socket on any other path.
pub struct Connection<S = TcpStream> {
    stream: BufReader<S>,
    peer: String,
    deadline: Option<Instant>,
    read_buffer_size: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an established stream.
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: BufReader::new(stream),
            peer: peer.into(),
            deadline: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Sets the instant after which every read fails with `TimedOut`.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    /// Returns the remote endpoint this connection talks to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Writes all of `data` and flushes it.
    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    /// Reads whatever is available into `buf`; `Ok(0)` means end of stream.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        before(self.deadline, self.stream.read(buf)).await
    }

    /// Reads one byte, or `None` at end of stream.
    pub async fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read_chunk(&mut byte).await? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Reads up to and including the next `\n`, at most `max` bytes.
    ///
    /// The result lacks the newline when the stream ended first or `max`
    /// bytes were read without finding one.
    pub async fn read_record(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut record = Vec::new();
        let mut limited = (&mut self.stream).take(max as u64);
        before(self.deadline, limited.read_until(b'\n', &mut record)).await?;
        Ok(record)
    }

    /// Reads until `limit` bytes have arrived or the stream ends.
    ///
    /// Never reads past `limit`, so bytes that follow stay available.
    pub async fn read_up_to(&mut self, limit: u64) -> io::Result<BytesMut> {
        let mut data = BytesMut::with_capacity(limit.min(MAX_PREALLOC) as usize);
        let mut chunk = vec![0u8; self.read_buffer_size];
        while (data.len() as u64) < limit {
            let want = (limit - data.len() as u64).min(chunk.len() as u64) as usize;
            let n = self.read_chunk(&mut chunk[..want]).await?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }
        Ok(data)
    }

    /// Shuts the connection down.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("Error shutting down connection to {}: {}", self.peer, e);
        }
        tracing::debug!("Connection to {} closed", self.peer);
    }
}
