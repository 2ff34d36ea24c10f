//! Asterisk Manager Interface (AMI) client for Rust
//!
//! This crate provides an async client for Asterisk's manager interface:
//! it connects, logs in, sends actions, and delivers server-pushed events to
//! a handler, keeping the connection alive with periodic PINGs and
//! reconnecting on its own after any fatal error.
//!
//! # Architecture
//!
//! - [`AmiSession`] (Clone + Send): connect, send actions, watch state
//! - A background supervisor task: reads and decodes frames, enforces the
//!   read deadline, and runs the reconnect loop
//! - [`EventDispatcher`]: filters queued events and hands them to your code
//!
//! Frames flow socket → [`AmiParser`] → bounded delivery queue →
//! [`EventDispatcher`] → handler, in socket-read order.
//!
//! # Examples
//!
//! ## Listening for events
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiConfig, AmiError, AmiSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AmiError> {
//!     let mut config = AmiConfig::new("127.0.0.1", 5038, "admin", "secret");
//!     config.events = vec!["Newchannel".into(), "Hangup".into()];
//!
//!     let session = AmiSession::new(config)?;
//!     if let Err(e) = session.connect().await {
//!         // The session keeps retrying in the background.
//!         eprintln!("first connect failed: {}", e);
//!     }
//!
//!     session
//!         .start_listening(|event| {
//!             println!("{:?} on {:?}", event.event_name(), event.channel());
//!         })
//!         .await
//! }
//! ```
//!
//! ## Sending actions
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiAction, AmiConfig, AmiError, AmiSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AmiError> {
//!     let session = AmiSession::new(AmiConfig::new("127.0.0.1", 5038, "admin", "secret"))?;
//!     session.connect().await?;
//!
//!     // Raw text, written verbatim plus the terminating blank line.
//!     session.send_action("Action: CoreStatus").await?;
//!
//!     // Or built, with newline injection rejected up front.
//!     let originate = AmiAction::new("Originate")?
//!         .header("Channel", "PJSIP/100")?
//!         .header("Exten", "200")?
//!         .header("Context", "default")?
//!         .header("Priority", "1")?
//!         .action_id("originate-1")?;
//!     session.send(&originate).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Watching the connection
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiConfig, AmiSession, SessionState};
//!
//! # async fn example() -> Result<(), asterisk_ami_tokio::AmiError> {
//! let session = AmiSession::new(AmiConfig::new("127.0.0.1", 5038, "admin", "secret"))?;
//! let mut states = session.subscribe_state();
//! let _ = session.connect().await;
//!
//! while states.changed().await.is_ok() {
//!     if let SessionState::Failed(reason) = &*states.borrow() {
//!         eprintln!("connection lost: {}", reason);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod action;
pub mod config;
pub mod connection;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod headers;
pub mod probe;
pub mod protocol;
pub mod session;

pub(crate) mod keepalive;
pub(crate) mod queue;

pub use action::AmiAction;
pub use config::{AmiConfig, OverflowPolicy};
pub use connection::{FailureReason, SessionState};
pub use constants::DEFAULT_AMI_PORT;
pub use dispatcher::{EventDispatcher, Subscription};
pub use error::{AmiError, AmiResult};
pub use event::AmiEvent;
pub use headers::{AmiHeader, ParseAmiHeaderError};
pub use probe::ReachabilityProbe;
pub use protocol::AmiParser;
pub use session::AmiSession;
