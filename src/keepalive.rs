//! Periodic PING writer
//!
//! The keepalive only writes. It never waits for the `Response: Success` /
//! `Ping: Pong` reply; a dead peer is noticed by the read deadline in the
//! session's read loop, since the pong is the traffic that keeps it from firing.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::{action::ping_frame, connection::SharedWriter};

/// Handle to a running keepalive task.
#[derive(Debug)]
pub(crate) struct Keepalive {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Keepalive {
    /// Start pinging through `writer` every `period`. The first PING goes out
    /// one full period after this call.
    pub(crate) fn spawn(writer: SharedWriter, period: Duration) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(ping_loop(writer, period, stop_rx));
        Self { stop_tx, handle }
    }

    /// Signal the task and wait until it has exited.
    pub(crate) async fn stop(self) {
        let _ = self
            .stop_tx
            .send(());
        if let Err(e) = self
            .handle
            .await
        {
            warn!("[PING] keepalive task ended abnormally: {}", e);
        }
    }
}

async fn ping_loop(writer: SharedWriter, period: Duration, mut stop_rx: oneshot::Receiver<()>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let frame = ping_frame();

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                debug!("[PING] keepalive stopped");
                return;
            }
            _ = ticker.tick() => {
                trace!("[PING] sending PING");
                if let Err(e) = writer
                    .write_frame(&frame)
                    .await
                {
                    warn!("[PING] write failed: {}", e);
                    if e.is_fatal() {
                        // The writer already reported the fault; the session
                        // will stop us as part of teardown.
                        return;
                    }
                }
            }
        }
    }
}
