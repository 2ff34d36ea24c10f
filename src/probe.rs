//! Network reachability probe
//!
//! Checked before every dial and on every reconnect attempt. A failed probe
//! skips the dial entirely and counts as a fatal connect failure.

use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::constants::DEFAULT_PROBE_ADDR;

/// How to decide whether the network is up.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReachabilityProbe {
    /// Always reachable; go straight to dialing.
    Disabled,
    /// Reachable if `host:port` resolves to at least one address.
    Resolve(String),
    /// Reachable if a TCP handshake to `host:port` completes.
    Connect(String),
}

impl Default for ReachabilityProbe {
    fn default() -> Self {
        ReachabilityProbe::Resolve(DEFAULT_PROBE_ADDR.to_string())
    }
}

impl std::fmt::Display for ReachabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReachabilityProbe::Disabled => write!(f, "disabled"),
            ReachabilityProbe::Resolve(addr) => write!(f, "resolve {}", addr),
            ReachabilityProbe::Connect(addr) => write!(f, "connect {}", addr),
        }
    }
}

impl ReachabilityProbe {
    /// Run the probe, giving up after `limit`.
    pub async fn is_reachable(&self, limit: Duration) -> bool {
        let check = async {
            match self {
                ReachabilityProbe::Disabled => true,
                ReachabilityProbe::Resolve(addr) => match lookup_host(addr.as_str()).await {
                    Ok(mut addrs) => addrs
                        .next()
                        .is_some(),
                    Err(e) => {
                        debug!("[PROBE] resolve {} failed: {}", addr, e);
                        false
                    }
                },
                ReachabilityProbe::Connect(addr) => match TcpStream::connect(addr.as_str()).await {
                    Ok(_) => true,
                    Err(e) => {
                        debug!("[PROBE] connect {} failed: {}", addr, e);
                        false
                    }
                },
            }
        };

        let reachable = timeout(limit, check)
            .await
            .unwrap_or(false);
        trace!("[PROBE] {} -> reachable={}", self, reachable);
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn disabled_is_always_reachable() {
        assert!(ReachabilityProbe::Disabled
            .is_reachable(Duration::from_millis(10))
            .await);
    }

    #[tokio::test]
    async fn connect_probe_follows_listener() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener
            .local_addr()
            .unwrap();
        let probe = ReachabilityProbe::Connect(addr.to_string());
        assert!(probe
            .is_reachable(Duration::from_millis(500))
            .await);

        drop(listener);
        assert!(!probe
            .is_reachable(Duration::from_millis(500))
            .await);
    }

    #[tokio::test]
    async fn resolve_literal_address() {
        let probe = ReachabilityProbe::Resolve("127.0.0.1:5038".to_string());
        assert!(probe
            .is_reachable(Duration::from_millis(500))
            .await);
    }

    #[test]
    fn default_probe_resolves_external_host() {
        assert_eq!(
            ReachabilityProbe::default(),
            ReachabilityProbe::Resolve("google.com:443".to_string())
        );
    }
}
