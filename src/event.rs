//! AMI event structure

use crate::headers::AmiHeader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One decoded AMI frame: a flat map of header name to value.
///
/// The server pushes events (`Event: Newchannel`) and responses
/// (`Response: Success`) over the same socket; both arrive as `AmiEvent`.
/// No schema is enforced. A frame without an `Event` header is still
/// delivered, it just never matches a named subscription.
///
/// Lookups are case-sensitive on the stored key, matching what the server
/// actually sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmiEvent {
    headers: HashMap<String, String>,
}

impl AmiEvent {
    /// Create an empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header by name.
    ///
    /// ```
    /// # use asterisk_ami_tokio::{AmiEvent, AmiHeader};
    /// let mut event = AmiEvent::new();
    /// event.set_header("Event", "Hangup");
    /// assert_eq!(event.header(AmiHeader::Event), Some("Hangup"));
    /// assert_eq!(event.header("Event"), Some("Hangup"));
    /// ```
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// All headers as a map.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Consume the event, returning the raw map.
    pub fn into_headers(self) -> HashMap<String, String> {
        self.headers
    }

    /// Set or overwrite a header. A repeated key in one frame keeps the last value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into(), value.into());
    }

    /// Remove a header, returning its value if it existed.
    pub fn del_header(&mut self, name: &str) -> Option<String> {
        self.headers
            .remove(name)
    }

    pub fn len(&self) -> usize {
        self.headers
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers
            .is_empty()
    }

    /// Value of the `Event` header, used for subscription filtering.
    pub fn event_name(&self) -> Option<&str> {
        self.header(AmiHeader::Event)
    }

    /// `true` if the `Event` header equals `name` exactly.
    pub fn is_event(&self, name: &str) -> bool {
        self.event_name() == Some(name)
    }

    /// Value of the `Response` header (`Success`, `Error`, `Goodbye`...).
    pub fn response(&self) -> Option<&str> {
        self.header(AmiHeader::Response)
    }

    /// `true` for action responses rather than unsolicited events.
    pub fn is_response(&self) -> bool {
        self.response()
            .is_some()
    }

    /// `Message` header, the human-readable part of a response.
    pub fn message(&self) -> Option<&str> {
        self.header(AmiHeader::Message)
    }

    /// `ActionID` header echoed back from the originating action.
    pub fn action_id(&self) -> Option<&str> {
        self.header(AmiHeader::ActionId)
    }

    pub fn channel(&self) -> Option<&str> {
        self.header(AmiHeader::Channel)
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.header(AmiHeader::Uniqueid)
    }
}

impl From<HashMap<String, String>> for AmiEvent {
    fn from(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }
}

impl<K, V> FromIterator<(K, V)> for AmiEvent
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_read_well_known_headers() {
        let event: AmiEvent = [
            ("Event", "Hangup"),
            ("Channel", "PJSIP/100-00000001"),
            ("Uniqueid", "1700000000.1"),
            ("Cause", "16"),
        ]
        .into_iter()
        .collect();

        assert_eq!(event.event_name(), Some("Hangup"));
        assert!(event.is_event("Hangup"));
        assert!(!event.is_event("hangup"));
        assert_eq!(event.channel(), Some("PJSIP/100-00000001"));
        assert_eq!(event.unique_id(), Some("1700000000.1"));
        assert_eq!(event.header(AmiHeader::Cause), Some("16"));
        assert!(!event.is_response());
    }

    #[test]
    fn response_frame_has_no_event_name() {
        let event: AmiEvent = [
            ("Response", "Success"),
            ("Ping", "Pong"),
            ("ActionID", "42"),
        ]
        .into_iter()
        .collect();

        assert!(event.is_response());
        assert_eq!(event.event_name(), None);
        assert_eq!(event.action_id(), Some("42"));
        assert_eq!(event.header(AmiHeader::Ping), Some("Pong"));
    }

    #[test]
    fn set_and_delete_headers() {
        let mut event = AmiEvent::new();
        assert!(event.is_empty());
        event.set_header("Event", "Newchannel");
        event.set_header("Event", "Newstate");
        assert_eq!(event.len(), 1);
        assert_eq!(event.event_name(), Some("Newstate"));
        assert_eq!(event.del_header("Event"), Some("Newstate".to_string()));
        assert!(event.is_empty());
    }

    #[test]
    fn serializes_as_flat_object() {
        let event: AmiEvent = [("Event", "FullyBooted")]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"Event":"FullyBooted"}"#);

        let back: AmiEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
