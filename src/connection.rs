//! Connection management for AMI
//!
//! One [`Connection`] is one TCP socket: probe, dial, login, then a read half
//! feeding the frame parser. The write half lives in a [`SharedWriter`] so
//! that caller sends, keepalive pings and teardown all serialize on the same
//! lock, and a send racing a reconnect either lands on a live socket or fails
//! with `NotConnected`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    action::Login,
    config::AmiConfig,
    constants::READ_BUF_SIZE,
    error::{AmiError, AmiResult},
    event::AmiEvent,
    protocol::AmiParser,
};

/// Lifecycle of the session's connection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// Probing, dialing, or logging in.
    Connecting,
    /// Login written (and confirmed, if `confirm_login` is set).
    Authenticated,
    /// The last connection or attempt failed; a retry is pending.
    Failed(FailureReason),
    /// `shutdown()` was called. Terminal.
    Closed,
}

/// Reason for entering [`SessionState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FailureReason {
    /// Reachability probe failed, nothing was dialed
    NetworkUnavailable,
    /// TCP connect failed or timed out
    DialFailed(String),
    /// No inbound traffic within the pong timeout
    ReadTimeout,
    /// Clean EOF from the server
    ConnectionClosed,
    /// TCP I/O error on read or write (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Server answered the login with an error
    AuthRejected(String),
    /// Inbound stream could not be decoded
    ProtocolError(String),
    /// The supervisor task panicked; the session will not recover
    SupervisorPanicked,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NetworkUnavailable => write!(f, "network unavailable"),
            FailureReason::DialFailed(msg) => write!(f, "dial failed: {}", msg),
            FailureReason::ReadTimeout => write!(f, "read deadline expired"),
            FailureReason::ConnectionClosed => write!(f, "connection closed"),
            FailureReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            FailureReason::AuthRejected(msg) => write!(f, "login rejected: {}", msg),
            FailureReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            FailureReason::SupervisorPanicked => write!(f, "supervisor task panicked"),
        }
    }
}

impl From<&AmiError> for FailureReason {
    fn from(err: &AmiError) -> Self {
        match err {
            AmiError::NetworkUnavailable { .. } => FailureReason::NetworkUnavailable,
            AmiError::Dial { .. } => FailureReason::DialFailed(err.to_string()),
            AmiError::Timeout { .. } => FailureReason::ReadTimeout,
            AmiError::ConnectionClosed => FailureReason::ConnectionClosed,
            AmiError::AuthFailed { message } => FailureReason::AuthRejected(message.clone()),
            AmiError::ProtocolError { message } => FailureReason::ProtocolError(message.clone()),
            other => FailureReason::IoError(other.to_string()),
        }
    }
}

/// A fatal write failure, reported to the supervisor.
///
/// Tagged with the connection generation so a failure on an already
/// replaced socket cannot tear down its successor.
#[derive(Debug, Clone)]
pub(crate) struct Fault {
    pub(crate) generation: u64,
    pub(crate) reason: FailureReason,
}

struct WriterSlot {
    half: OwnedWriteHalf,
    generation: u64,
}

/// Write half of the current connection, if any.
#[derive(Clone)]
pub(crate) struct SharedWriter {
    slot: Arc<Mutex<Option<WriterSlot>>>,
    fault_tx: mpsc::UnboundedSender<Fault>,
    write_timeout: Duration,
}

impl std::fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedWriter")
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

impl SharedWriter {
    pub(crate) fn new(fault_tx: mpsc::UnboundedSender<Fault>, write_timeout: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            fault_tx,
            write_timeout,
        }
    }

    /// Make `half` the target of all writes, closing any previous socket.
    pub(crate) async fn install(&self, half: OwnedWriteHalf, generation: u64) {
        let mut slot = self
            .slot
            .lock()
            .await;
        if let Some(mut old) = slot.replace(WriterSlot { half, generation }) {
            let _ = old
                .half
                .shutdown()
                .await;
        }
    }

    /// Write a complete frame to the live socket.
    ///
    /// Fatal failures are also reported to the supervisor, so callers that
    /// ignore the result still trigger a reconnect.
    pub(crate) async fn write_frame(&self, wire: &str) -> AmiResult<()> {
        let mut slot = self
            .slot
            .lock()
            .await;
        let current = slot
            .as_mut()
            .ok_or(AmiError::NotConnected)?;

        let result = match timeout(
            self.write_timeout,
            current
                .half
                .write_all(wire.as_bytes()),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AmiError::Io(e)),
            Err(_) => Err(AmiError::Timeout {
                timeout_ms: self
                    .write_timeout
                    .as_millis() as u64,
            }),
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                let _ = self
                    .fault_tx
                    .send(Fault {
                        generation: current.generation,
                        reason: FailureReason::from(e),
                    });
            }
        }
        result
    }

    /// Shut down and drop the current write half. Returns whether one was open.
    pub(crate) async fn close(&self) -> bool {
        let mut slot = self
            .slot
            .lock()
            .await;
        match slot.take() {
            Some(mut old) => {
                let _ = old
                    .half
                    .shutdown()
                    .await;
                true
            }
            None => false,
        }
    }

    pub(crate) async fn is_open(&self) -> bool {
        self.slot
            .lock()
            .await
            .is_some()
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(addr: &str, dial_timeout: Duration) -> AmiResult<TcpStream> {
    match timeout(dial_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect to {} failed: {}", addr, e);
            Err(AmiError::Dial {
                addr: addr.to_string(),
                source: e,
            })
        }
        Err(_) => {
            warn!(
                "[CONNECT] TCP connect to {} timed out after {}ms",
                addr,
                dial_timeout.as_millis()
            );
            Err(AmiError::Dial {
                addr: addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "dial timed out"),
            })
        }
    }
}

/// Read side of one live connection.
pub(crate) struct Connection {
    reader: OwnedReadHalf,
    parser: AmiParser,
    /// Frames decoded during login confirmation, delivered before anything else
    backlog: VecDeque<AmiEvent>,
    read_buffer: Box<[u8; READ_BUF_SIZE]>,
    read_timeout: Duration,
    generation: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("generation", &self.generation)
            .field("backlog", &self.backlog.len())
            .finish()
    }
}

impl Connection {
    /// Probe, dial, log in, and hand the write half to `writer`.
    ///
    /// Without `confirm_login` the login frame is written and the connection
    /// is returned at once. With it, frames are read until one carries a
    /// `Response` header; `Response: Error` fails with `AuthFailed`.
    pub(crate) async fn open(
        config: &AmiConfig,
        login: &Login,
        writer: &SharedWriter,
        generation: u64,
    ) -> AmiResult<Self> {
        if !config
            .probe
            .is_reachable(config.dial_timeout)
            .await
        {
            warn!("[CONNECT] Network unavailable ({})", config.probe);
            return Err(AmiError::NetworkUnavailable {
                probe: config
                    .probe
                    .to_string(),
            });
        }

        let addr = config.addr();
        info!("Connecting to Asterisk manager at {}", addr);
        let stream = tcp_connect_with_timeout(&addr, config.dial_timeout).await?;
        let (read_half, mut write_half) = stream.into_split();

        debug!("[LOGIN] Sending login for {} [REDACTED]", login.username);
        write_half
            .write_all(
                login
                    .to_wire_format()
                    .as_bytes(),
            )
            .await
            .map_err(AmiError::Io)?;

        let mut conn = Connection {
            reader: read_half,
            parser: AmiParser::new(),
            backlog: VecDeque::new(),
            read_buffer: Box::new([0u8; READ_BUF_SIZE]),
            read_timeout: config.pong_timeout,
            generation,
        };

        if config.confirm_login {
            conn.await_login_response()
                .await?;
            info!("Login accepted by {}", addr);
        }

        writer
            .install(write_half, generation)
            .await;
        Ok(conn)
    }

    /// Wait for the login `Response`, at most `read_timeout` in total.
    async fn await_login_response(&mut self) -> AmiResult<()> {
        let limit = self.read_timeout;
        match timeout(limit, self.read_login_response()).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = limit.as_millis() as u64;
                warn!("[LOGIN] No response to login within {}ms", timeout_ms);
                Err(AmiError::Timeout { timeout_ms })
            }
        }
    }

    async fn read_login_response(&mut self) -> AmiResult<()> {
        loop {
            let mut confirmed = false;
            for frame in self
                .read_frames()
                .await?
            {
                if !confirmed {
                    if let Some(response) = frame.response() {
                        if response.eq_ignore_ascii_case("Error") {
                            let message = frame
                                .message()
                                .unwrap_or("Authentication failed")
                                .to_string();
                            warn!("[LOGIN] Rejected: {}", message);
                            return Err(AmiError::auth_failed(message));
                        }
                        confirmed = true;
                    }
                }
                self.backlog
                    .push_back(frame);
            }
            if confirmed {
                return Ok(());
            }
        }
    }

    /// Take frames decoded before the read loop started.
    pub(crate) fn drain_backlog(&mut self) -> VecDeque<AmiEvent> {
        std::mem::take(&mut self.backlog)
    }

    /// One socket read under the read deadline, returning every frame it
    /// completed (possibly none).
    ///
    /// Cancel-safe: a cancelled call loses no bytes.
    pub(crate) async fn read_frames(&mut self) -> AmiResult<Vec<AmiEvent>> {
        let read_result = timeout(
            self.read_timeout,
            self.reader
                .read(&mut self.read_buffer[..]),
        )
        .await;

        let bytes_read = match read_result {
            Ok(Ok(0)) => {
                info!("Connection closed (EOF)");
                return Err(AmiError::ConnectionClosed);
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!("Read error: {}", e);
                return Err(AmiError::Io(e));
            }
            Err(_) => {
                let timeout_ms = self
                    .read_timeout
                    .as_millis() as u64;
                warn!("Read deadline: no traffic for {}ms", timeout_ms);
                return Err(AmiError::Timeout { timeout_ms });
            }
        };

        trace!("[RECV] Read {} bytes from socket", bytes_read);
        self.parser
            .feed(&self.read_buffer[..bytes_read])
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}
