//! Error types for the AMI client

use thiserror::Error;

/// Result alias used throughout the crate
pub type AmiResult<T> = Result<T, AmiError>;

/// Errors produced by the AMI client
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AmiError {
    /// Socket I/O failure on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reachability probe failed, so no dial was attempted
    #[error("network unavailable (probe {probe} failed)")]
    NetworkUnavailable { probe: String },

    /// TCP connect to the manager failed
    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// An operation did not finish before its deadline
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The server closed the connection
    #[error("connection closed by server")]
    ConnectionClosed,

    /// No live connection to write to
    #[error("not connected")]
    NotConnected,

    /// The server rejected the login
    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    /// The inbound byte stream could not be decoded
    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    /// An outbound action was malformed
    #[error("invalid action: {message}")]
    InvalidAction { message: String },

    /// Configuration rejected before any connection attempt
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The event dispatcher was already taken by another listener
    #[error("event dispatcher already taken")]
    DispatcherTaken,

    /// The session was shut down
    #[error("session closed")]
    SessionClosed,
}

impl AmiError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        AmiError::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn auth_failed(message: impl Into<String>) -> Self {
        AmiError::AuthFailed {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_action(message: impl Into<String>) -> Self {
        AmiError::InvalidAction {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        AmiError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether this error invalidates the connection and must go through the
    /// reconnect path.
    ///
    /// The same answer applies to reads and writes: a failed `send` on a dead
    /// socket tears the connection down exactly like a failed read.
    pub fn is_fatal(&self) -> bool {
        match self {
            AmiError::Io(_)
            | AmiError::NetworkUnavailable { .. }
            | AmiError::Dial { .. }
            | AmiError::Timeout { .. }
            | AmiError::ConnectionClosed
            | AmiError::AuthFailed { .. }
            | AmiError::ProtocolError { .. } => true,
            AmiError::NotConnected
            | AmiError::InvalidAction { .. }
            | AmiError::InvalidConfig { .. }
            | AmiError::DispatcherTaken
            | AmiError::SessionClosed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_errors_are_fatal() {
        let io = AmiError::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        ));
        assert!(io.is_fatal());
        assert!(AmiError::Timeout { timeout_ms: 10 }.is_fatal());
        assert!(AmiError::ConnectionClosed.is_fatal());
        assert!(AmiError::NetworkUnavailable {
            probe: "example.invalid:443".into()
        }
        .is_fatal());
    }

    #[test]
    fn caller_errors_are_not_fatal() {
        assert!(!AmiError::NotConnected.is_fatal());
        assert!(!AmiError::SessionClosed.is_fatal());
        assert!(!AmiError::DispatcherTaken.is_fatal());
        assert!(!AmiError::invalid_action("bad").is_fatal());
        assert!(!AmiError::invalid_config("bad").is_fatal());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            AmiError::auth_failed("Authentication failed").to_string(),
            "authentication failed: Authentication failed"
        );
        assert_eq!(
            AmiError::Timeout { timeout_ms: 1500 }.to_string(),
            "operation timed out after 1500ms"
        );
    }
}
