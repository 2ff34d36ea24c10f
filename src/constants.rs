//! Protocol constants and configuration defaults

/// Default Asterisk manager port
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// Size of a single socket read
pub const READ_BUF_SIZE: usize = 2048;

/// Maximum bytes buffered without a line terminator before the stream is
/// considered corrupt (1MB). No AMI line comes close to this.
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Maximum accumulated size of one frame's fields before its blank line
/// arrives (8MB).
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Protocol terminators. AMI uses CRLF line endings; a blank line ends a frame.
pub const LINE_TERMINATOR: &str = "\r\n";
pub const FRAME_TERMINATOR: &str = "\r\n\r\n";

/// Separator between a header name and its value on inbound frames
pub const HEADER_SEPARATOR: &str = ": ";

/// Subscription tokens meaning "every event"
pub const SUBSCRIBE_ALL: &str = "All";
pub const SUBSCRIBE_ALL_LOWER: &str = "all";

/// Keepalive action, without frame terminator
pub const PING_ACTION: &str = "Action: PING";

/// Default interval between PING actions in milliseconds
pub const DEFAULT_PING_INTERVAL_MS: u64 = 5_000;

/// Default read deadline in milliseconds. Must exceed the ping interval so a
/// healthy server always answers in time.
pub const DEFAULT_PONG_TIMEOUT_MS: u64 = 15_000;

/// Default pause between reconnect attempts in milliseconds
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3_000;

/// TCP dial timeout in milliseconds
pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 2_000;

/// Endpoint resolved to decide whether the network is reachable
pub const DEFAULT_PROBE_ADDR: &str = "google.com:443";

/// Capacity of the delivery queue between parser and dispatcher
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 1000;
