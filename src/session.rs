//! AMI session: connection lifecycle and reconnect supervision
//!
//! A background supervisor task owns the read half, the parser and the
//! state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Authenticated -> Failed -> Connecting -> ...
//!                      |                           ^
//!                      +------ attempt failed -----+
//! ```
//!
//! Reads, the reconnect loop and teardown all run on that one task, so a
//! reconnect can never overlap a read. Writes from callers and from the
//! keepalive go through [`SharedWriter`]; a fatal write failure is sent back
//! to the supervisor and handled exactly like a fatal read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    action::{frame_action, AmiAction, Login},
    config::AmiConfig,
    connection::{Connection, FailureReason, Fault, SessionState, SharedWriter},
    dispatcher::{EventDispatcher, Subscription},
    error::{AmiError, AmiResult},
    event::AmiEvent,
    keepalive::Keepalive,
    queue::{delivery_queue, EventReceiver, EventSender},
};

/// Pieces handed to the supervisor when `connect()` first runs.
struct Startup {
    fault_rx: mpsc::UnboundedReceiver<Fault>,
    events: EventSender,
}

struct SessionInner {
    config: Arc<AmiConfig>,
    login: Login,
    writer: SharedWriter,
    state_tx: watch::Sender<SessionState>,
    shutdown_tx: watch::Sender<bool>,
    dropped_event_count: Arc<AtomicU64>,
    startup: Mutex<Option<Startup>>,
    dispatcher: Mutex<Option<EventReceiver>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// AMI session handle (Clone + Send)
///
/// Created with static configuration; [`connect`](Self::connect) starts the
/// supervisor, which keeps a connection up until [`shutdown`](Self::shutdown).
/// Clones share the same session.
///
/// ```rust,no_run
/// use asterisk_ami_tokio::{AmiConfig, AmiSession};
///
/// #[tokio::main]
/// async fn main() -> Result<(), asterisk_ami_tokio::AmiError> {
///     let mut config = AmiConfig::new("127.0.0.1", 5038, "admin", "secret");
///     config.events = vec!["Hangup".into(), "Newchannel".into()];
///
///     let session = AmiSession::new(config)?;
///     session.connect().await?;
///     session.send_action("Action: CoreStatus").await?;
///
///     session
///         .start_listening(|event| println!("{:?}", event.event_name()))
///         .await
/// }
/// ```
#[derive(Clone)]
pub struct AmiSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for AmiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiSession")
            .field("addr", &self.inner.config.addr())
            .field("state", &self.state())
            .finish()
    }
}

impl AmiSession {
    /// Validate `config` and build an idle session. Nothing is dialed yet.
    pub fn new(config: AmiConfig) -> AmiResult<Self> {
        config.validate()?;
        let login = Login::new(&config.username, &config.secret)?;

        let dropped_event_count = Arc::new(AtomicU64::new(0));
        let (events, receiver) = delivery_queue(
            config.event_queue_size,
            config.overflow_policy,
            dropped_event_count.clone(),
        );
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let writer = SharedWriter::new(fault_tx, config.pong_timeout);
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(SessionInner {
                config: Arc::new(config),
                login,
                writer,
                state_tx,
                shutdown_tx,
                dropped_event_count,
                startup: Mutex::new(Some(Startup { fault_rx, events })),
                dispatcher: Mutex::new(Some(receiver)),
                supervisor: Mutex::new(None),
            }),
        })
    }

    /// Start the session and wait for the first connection attempt.
    ///
    /// Returns that attempt's outcome. On failure the supervisor is already
    /// retrying every `reconnect_interval` in the background; the error is
    /// informational and the session will come up on its own once the
    /// server is reachable. Calling `connect` on a running session is a no-op.
    pub async fn connect(&self) -> AmiResult<()> {
        let startup = {
            let mut slot = self
                .inner
                .startup
                .lock()
                .await;
            match slot.take() {
                Some(startup) => startup,
                None if self.is_closed() => return Err(AmiError::SessionClosed),
                None => {
                    debug!("connect() called on a running session");
                    return Ok(());
                }
            }
        };

        let (first_tx, first_rx) = oneshot::channel();
        let supervisor = Supervisor {
            config: self
                .inner
                .config
                .clone(),
            login: self
                .inner
                .login
                .clone(),
            writer: self
                .inner
                .writer
                .clone(),
            state_tx: self
                .inner
                .state_tx
                .clone(),
            shutdown_rx: self
                .inner
                .shutdown_tx
                .subscribe(),
            fault_rx: startup.fault_rx,
            events: startup.events,
            generation: 0,
            keepalive: None,
        };
        let handle = tokio::spawn(supervise(supervisor, first_tx));
        *self
            .inner
            .supervisor
            .lock()
            .await = Some(handle);

        first_rx
            .await
            .unwrap_or(Err(AmiError::SessionClosed))
    }

    /// Take the event dispatcher for pulling events manually.
    ///
    /// There is one dispatcher per session; a second call fails with
    /// [`AmiError::DispatcherTaken`].
    pub async fn dispatcher(&self) -> AmiResult<EventDispatcher> {
        let rx = self
            .inner
            .dispatcher
            .lock()
            .await
            .take()
            .ok_or(AmiError::DispatcherTaken)?;
        Ok(EventDispatcher::new(
            rx,
            Subscription::from_names(&self.inner.config.events),
        ))
    }

    /// Feed every subscribed event to `handler`, blocking the calling task
    /// until the session is shut down.
    pub async fn start_listening<F>(&self, handler: F) -> AmiResult<()>
    where
        F: FnMut(AmiEvent),
    {
        let dispatcher = self
            .dispatcher()
            .await?;
        info!(
            "Listening for events: {:?}",
            dispatcher.subscription()
        );
        dispatcher
            .run(handler)
            .await;
        Ok(())
    }

    /// Send an action. `action` is written verbatim followed by a blank line.
    ///
    /// ```rust,no_run
    /// # async fn example(session: &asterisk_ami_tokio::AmiSession) -> Result<(), asterisk_ami_tokio::AmiError> {
    /// session.send_action("Action: Status\r\nActionID: 1").await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Fails with `NotConnected` while no connection is up. A socket error is
    /// returned here and also tears the connection down for a reconnect,
    /// exactly as a read error would.
    pub async fn send_action(&self, action: &str) -> AmiResult<()> {
        if self.is_closed() {
            return Err(AmiError::SessionClosed);
        }
        debug!("Sending action: {}", first_line(action));
        let result = self
            .inner
            .writer
            .write_frame(&frame_action(action))
            .await;
        if let Err(e) = &result {
            warn!("Action not sent: {}", e);
        }
        result
    }

    /// Send a built action.
    pub async fn send(&self, action: &AmiAction) -> AmiResult<()> {
        self.send_action(&action.to_string())
            .await
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.inner
            .state_tx
            .borrow()
            .clone()
    }

    /// Watch state transitions, including failure reasons.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner
            .state_tx
            .subscribe()
    }

    /// Whether a connection is up and logged in.
    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .inner
                .state_tx
                .borrow(),
            SessionState::Authenticated
        )
    }

    /// Number of events discarded under [`OverflowPolicy::DropOldest`](crate::OverflowPolicy::DropOldest).
    pub fn dropped_event_count(&self) -> u64 {
        self.inner
            .dropped_event_count
            .load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &AmiConfig {
        &self.inner.config
    }

    /// Stop the supervisor, the keepalive and the socket.
    ///
    /// The dispatcher drains what is already queued and then ends, which
    /// returns control from [`start_listening`](Self::start_listening).
    pub async fn shutdown(&self) {
        info!("Session shutdown requested");
        self.inner
            .shutdown_tx
            .send_replace(true);

        let handle = self
            .inner
            .supervisor
            .lock()
            .await
            .take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!("Supervisor task ended abnormally: {}", e);
                }
            }
            None => {
                // Never started: drop the producer so a waiting dispatcher ends.
                self.inner
                    .startup
                    .lock()
                    .await
                    .take();
                self.inner
                    .state_tx
                    .send_replace(SessionState::Closed);
            }
        }
    }

    fn is_closed(&self) -> bool {
        *self
            .inner
            .shutdown_tx
            .borrow()
    }
}

fn first_line(action: &str) -> &str {
    action
        .lines()
        .next()
        .unwrap_or("")
}

/// Why a connected read loop ended.
enum ListenExit {
    Shutdown,
    Failed(FailureReason),
}

/// State owned by the supervisor task.
struct Supervisor {
    config: Arc<AmiConfig>,
    login: Login,
    writer: SharedWriter,
    state_tx: watch::Sender<SessionState>,
    shutdown_rx: watch::Receiver<bool>,
    fault_rx: mpsc::UnboundedReceiver<Fault>,
    events: EventSender,
    /// Incremented per connection attempt; tags writer and faults
    generation: u64,
    keepalive: Option<Keepalive>,
}

/// Run the supervisor, publishing a failure state if it panics.
async fn supervise(supervisor: Supervisor, first_attempt: oneshot::Sender<AmiResult<()>>) {
    let state_tx = supervisor
        .state_tx
        .clone();
    let result = std::panic::AssertUnwindSafe(supervisor.run(first_attempt));
    if futures_util::FutureExt::catch_unwind(result)
        .await
        .is_err()
    {
        tracing::error!("supervisor task panicked");
        state_tx.send_replace(SessionState::Failed(FailureReason::SupervisorPanicked));
    }
}

impl Supervisor {
    async fn run(mut self, first_attempt: oneshot::Sender<AmiResult<()>>) {
        let mut first_attempt = Some(first_attempt);
        // Set after losing an established connection: retry once before sleeping.
        let mut retry_now = false;

        loop {
            if !retry_now && first_attempt.is_none() {
                let interval = self
                    .config
                    .reconnect_interval;
                info!("[RECONNECT] Retrying in {}ms", interval.as_millis());
                if !self
                    .sleep_unless_shutdown(interval)
                    .await
                {
                    break;
                }
            }
            retry_now = false;

            self.publish(SessionState::Connecting);
            let mut shutdown_rx = self
                .shutdown_rx
                .clone();
            let attempt = tokio::select! {
                attempt = self.open_connection() => attempt,
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            };

            let mut conn = match attempt {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("[CONNECT] Attempt failed: {}", e);
                    self.publish(SessionState::Failed(FailureReason::from(&e)));
                    if let Some(tx) = first_attempt.take() {
                        let _ = tx.send(Err(e));
                    }
                    continue;
                }
            };

            self.publish(SessionState::Authenticated);
            if let Some(tx) = first_attempt.take() {
                let _ = tx.send(Ok(()));
            }

            let connected_at = Instant::now();
            match self
                .listen(&mut conn)
                .await
            {
                ListenExit::Shutdown => break,
                ListenExit::Failed(reason) => {
                    warn!("[RECONNECT] Connection lost: {}", reason);
                    drop(conn);
                    self.teardown()
                        .await;
                    self.publish(SessionState::Failed(reason));
                    // A connection that dies right after login would otherwise
                    // spin through reconnects at network speed.
                    retry_now = connected_at.elapsed() >= self.config.reconnect_interval;
                }
            }
        }

        self.teardown()
            .await;
        self.publish(SessionState::Closed);
        info!("Session closed");
    }

    /// Probe, dial and log in, then start the keepalive.
    async fn open_connection(&mut self) -> AmiResult<Connection> {
        // Every queued fault belongs to an earlier connection. The writer is
        // closed here, so none can arrive until `open` installs the new one.
        while self
            .fault_rx
            .try_recv()
            .is_ok()
        {}

        self.generation += 1;
        let conn = Connection::open(&self.config, &self.login, &self.writer, self.generation).await?;

        self.keepalive = Some(Keepalive::spawn(
            self.writer
                .clone(),
            self.config
                .ping_interval,
        ));
        info!(
            "Connected to {} (generation {})",
            self.config.addr(),
            self.generation
        );
        Ok(conn)
    }

    /// Read and deliver frames until a fatal error, a fault or shutdown.
    async fn listen(&mut self, conn: &mut Connection) -> ListenExit {
        for event in conn.drain_backlog() {
            if !deliver(&self.events, &mut self.shutdown_rx, event).await {
                return ListenExit::Shutdown;
            }
        }

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown_rx) => return ListenExit::Shutdown,
                Some(fault) = self.fault_rx.recv() => {
                    if fault.generation == conn.generation() {
                        return ListenExit::Failed(fault.reason);
                    }
                    debug!("Ignoring fault from generation {}", fault.generation);
                }
                read = conn.read_frames() => match read {
                    Ok(frames) => {
                        for event in frames {
                            if !deliver(&self.events, &mut self.shutdown_rx, event).await {
                                return ListenExit::Shutdown;
                            }
                        }
                    }
                    Err(e) => return ListenExit::Failed(FailureReason::from(&e)),
                },
            }
        }
    }

    /// Stop the keepalive, then close the socket. Safe to call repeatedly.
    async fn teardown(&mut self) {
        if let Some(keepalive) = self
            .keepalive
            .take()
        {
            keepalive
                .stop()
                .await;
        }
        if self
            .writer
            .close()
            .await
        {
            debug!("[RECONNECT] Socket closed");
        }
    }

    fn publish(&self, state: SessionState) {
        debug!("Session state -> {:?}", state);
        self.state_tx
            .send_replace(state);
    }

    /// Returns `false` if shutdown was requested during the sleep.
    async fn sleep_unless_shutdown(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = wait_for_shutdown(&mut self.shutdown_rx) => false,
        }
    }
}

/// Queue one event. Returns `false` only if shutdown interrupted a blocked send.
///
/// A dispatcher that went away is not an error; the session keeps running
/// for sends and the events are discarded.
async fn deliver(
    events: &EventSender,
    shutdown_rx: &mut watch::Receiver<bool>,
    event: AmiEvent,
) -> bool {
    tokio::select! {
        delivered = events.deliver(event) => {
            if !delivered {
                debug!("Dispatcher gone, discarding event");
            }
            true
        }
        _ = wait_for_shutdown(shutdown_rx) => false,
    }
}

/// Resolves once shutdown has been requested.
///
/// Also resolves when every session handle has been dropped.
async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx
        .wait_for(|stop| *stop)
        .await;
}
