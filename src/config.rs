//! Session configuration

use std::time::Duration;
use tracing::warn;

use crate::{
    constants::{
        DEFAULT_AMI_PORT, DEFAULT_DIAL_TIMEOUT_MS, DEFAULT_EVENT_QUEUE_SIZE,
        DEFAULT_PING_INTERVAL_MS, DEFAULT_PONG_TIMEOUT_MS, DEFAULT_RECONNECT_INTERVAL_MS,
        SUBSCRIBE_ALL,
    },
    error::{AmiError, AmiResult},
    probe::ReachabilityProbe,
};

/// What the parser does when the delivery queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum OverflowPolicy {
    /// Stop reading from the socket until the dispatcher catches up.
    ///
    /// Nothing is lost, but a stalled handler also stalls the read deadline
    /// check, and the server may drop the connection for not reading.
    #[default]
    Block,
    /// Keep reading; discard the oldest queued events to make room.
    DropOldest,
}

/// Static configuration of an [`AmiSession`](crate::AmiSession).
///
/// Fixed for the lifetime of the session; every reconnect reuses it.
#[derive(Clone)]
pub struct AmiConfig {
    /// Manager host name or address.
    pub host: String,
    /// Manager port. Default: 5038.
    pub port: u16,
    pub username: String,
    pub secret: String,
    /// Interval between PING actions. Default: 5s.
    pub ping_interval: Duration,
    /// Read deadline. A connection with no inbound bytes for this long is
    /// considered dead. Should exceed `ping_interval`. Default: 15s.
    pub pong_timeout: Duration,
    /// Pause between failed reconnect attempts. Must be non-zero. Default: 3s.
    pub reconnect_interval: Duration,
    /// TCP connect timeout. Also bounds the reachability probe. Default: 2s.
    pub dial_timeout: Duration,
    /// Event names passed to the handler. `"All"` or `"all"` matches every
    /// frame. Default: `["All"]`.
    pub events: Vec<String>,
    /// Capacity of the delivery queue. Default: 1000.
    pub event_queue_size: usize,
    pub overflow_policy: OverflowPolicy,
    pub probe: ReachabilityProbe,
    /// Wait for the server's `Response:` to the login before reporting the
    /// session as authenticated. Default: false (login is fire-and-forget).
    pub confirm_login: bool,
}

impl std::fmt::Debug for AmiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("ping_interval", &self.ping_interval)
            .field("pong_timeout", &self.pong_timeout)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("dial_timeout", &self.dial_timeout)
            .field("events", &self.events)
            .field("event_queue_size", &self.event_queue_size)
            .field("overflow_policy", &self.overflow_policy)
            .field("probe", &self.probe)
            .field("confirm_login", &self.confirm_login)
            .finish()
    }
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_AMI_PORT,
            username: String::new(),
            secret: String::new(),
            ping_interval: Duration::from_millis(DEFAULT_PING_INTERVAL_MS),
            pong_timeout: Duration::from_millis(DEFAULT_PONG_TIMEOUT_MS),
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            dial_timeout: Duration::from_millis(DEFAULT_DIAL_TIMEOUT_MS),
            events: vec![SUBSCRIBE_ALL.to_string()],
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            overflow_policy: OverflowPolicy::default(),
            probe: ReachabilityProbe::default(),
            confirm_login: false,
        }
    }
}

impl AmiConfig {
    /// Config with the given endpoint and credentials, defaults elsewhere.
    pub fn new(host: &str, port: u16, username: &str, secret: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            secret: secret.to_string(),
            ..Self::default()
        }
    }

    /// `host:port` as dialed.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> AmiResult<()> {
        if self
            .host
            .is_empty()
        {
            return Err(AmiError::invalid_config("host must not be empty"));
        }
        if self
            .ping_interval
            .is_zero()
        {
            return Err(AmiError::invalid_config("ping_interval must be non-zero"));
        }
        if self
            .pong_timeout
            .is_zero()
        {
            return Err(AmiError::invalid_config("pong_timeout must be non-zero"));
        }
        if self
            .reconnect_interval
            .is_zero()
        {
            return Err(AmiError::invalid_config("reconnect_interval must be non-zero"));
        }
        if self
            .dial_timeout
            .is_zero()
        {
            return Err(AmiError::invalid_config("dial_timeout must be non-zero"));
        }
        if self.pong_timeout <= self.ping_interval {
            warn!(
                "pong_timeout {:?} does not exceed ping_interval {:?}; idle connections will be dropped",
                self.pong_timeout, self.ping_interval
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AmiConfig::new("pbx.example.com", 5038, "admin", "secret");
        assert_eq!(config.addr(), "pbx.example.com:5038");
        assert_eq!(config.events, vec!["All".to_string()]);
        assert_eq!(config.overflow_policy, OverflowPolicy::Block);
        assert!(!config.confirm_login);
        assert!(config
            .validate()
            .is_ok());
    }

    #[test]
    fn debug_redacts_secret() {
        let config = AmiConfig::new("pbx", 5038, "admin", "hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn zero_intervals_rejected() {
        let config = AmiConfig {
            ping_interval: Duration::ZERO,
            ..AmiConfig::new("pbx", 5038, "admin", "x")
        };
        assert!(matches!(
            config.validate(),
            Err(AmiError::InvalidConfig { .. })
        ));

        let config = AmiConfig {
            pong_timeout: Duration::ZERO,
            ..AmiConfig::new("pbx", 5038, "admin", "x")
        };
        assert!(config
            .validate()
            .is_err());

        let config = AmiConfig {
            reconnect_interval: Duration::ZERO,
            ..AmiConfig::new("pbx", 5038, "admin", "x")
        };
        assert!(matches!(
            config.validate(),
            Err(AmiError::InvalidConfig { ref message }) if message.contains("reconnect_interval")
        ));

        let config = AmiConfig {
            host: String::new(),
            ..AmiConfig::default()
        };
        assert!(config
            .validate()
            .is_err());
    }
}
