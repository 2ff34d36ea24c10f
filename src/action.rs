//! Outbound action frames

use crate::{
    constants::{FRAME_TERMINATOR, LINE_TERMINATOR, PING_ACTION},
    error::{AmiError, AmiResult},
    headers::AmiHeader,
};
use std::fmt;

/// Reject strings containing CR or LF.
///
/// AMI is line-delimited; an embedded newline in a header value would let a
/// caller inject extra header lines or whole extra actions.
fn validate_no_newlines(s: &str, context: &str) -> AmiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AmiError::invalid_action(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Builder for an AMI action frame.
///
/// Headers keep insertion order, which matters to some Asterisk actions
/// (repeated `Variable:` headers on `Originate`, for instance).
///
/// ```
/// use asterisk_ami_tokio::AmiAction;
///
/// let action = AmiAction::new("Originate").unwrap()
///     .header("Channel", "PJSIP/100").unwrap()
///     .header("Exten", "200").unwrap()
///     .action_id("call-1").unwrap();
/// assert_eq!(
///     action.to_string(),
///     "Action: Originate\r\nChannel: PJSIP/100\r\nExten: 200\r\nActionID: call-1"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiAction {
    name: String,
    headers: Vec<(String, String)>,
}

impl AmiAction {
    /// Start an action with the given `Action:` name.
    pub fn new(name: &str) -> AmiResult<Self> {
        validate_no_newlines(name, "action name")?;
        if name.is_empty() {
            return Err(AmiError::invalid_action("action name must not be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            headers: Vec::new(),
        })
    }

    /// Keepalive action.
    pub fn ping() -> Self {
        Self {
            name: "PING".to_string(),
            headers: Vec::new(),
        }
    }

    /// Append a header line.
    pub fn header(mut self, name: impl AsRef<str>, value: &str) -> AmiResult<Self> {
        let name = name.as_ref();
        validate_no_newlines(name, "header name")?;
        validate_no_newlines(value, "header value")?;
        self.headers
            .push((name.to_string(), value.to_string()));
        Ok(self)
    }

    /// Append an `ActionID` header for matching the server's response.
    pub fn action_id(self, id: &str) -> AmiResult<Self> {
        self.header(AmiHeader::ActionId, id)
    }

    /// Action name as sent on the `Action:` line.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Action text without the frame terminator, the form `send_action` accepts.
impl fmt::Display for AmiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action: {}", self.name)?;
        for (key, value) in &self.headers {
            write!(f, "{}{}: {}", LINE_TERMINATOR, key, value)?;
        }
        Ok(())
    }
}

/// Login credentials, written as the first frame on every connection.
///
/// Carries the secret, so `Debug` redacts it.
#[derive(Clone)]
pub(crate) struct Login {
    pub(crate) username: String,
    pub(crate) secret: String,
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Login {
    pub(crate) fn new(username: &str, secret: &str) -> AmiResult<Self> {
        validate_no_newlines(username, "username")?;
        validate_no_newlines(secret, "secret")?;
        Ok(Self {
            username: username.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Complete login frame, terminator included.
    pub(crate) fn to_wire_format(&self) -> String {
        format!(
            "Action:Login{lt}Username:{}{lt}Secret:{}{ft}",
            self.username,
            self.secret,
            lt = LINE_TERMINATOR,
            ft = FRAME_TERMINATOR
        )
    }
}

/// Frame an action string for the wire by appending the blank line.
pub(crate) fn frame_action(action: &str) -> String {
    let mut wire = String::with_capacity(action.len() + FRAME_TERMINATOR.len());
    wire.push_str(action);
    wire.push_str(FRAME_TERMINATOR);
    wire
}

/// Complete PING frame, terminator included.
pub(crate) fn ping_frame() -> String {
    frame_action(PING_ACTION)
}
