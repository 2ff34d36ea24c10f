//! Typed header names for AMI frames.

/// Error returned when parsing an unrecognized AMI header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAmiHeaderError(pub String);

impl std::fmt::Display for ParseAmiHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AMI header: {}", self.0)
    }
}

impl std::error::Error for ParseAmiHeaderError {}

define_header_enum! {
    error_type: ParseAmiHeaderError,
    /// Header names that commonly appear in AMI frames.
    ///
    /// Inbound frames carry arbitrary keys; these are the ones the client
    /// itself looks at plus the most common event fields. Use with
    /// [`AmiEvent::header()`](crate::AmiEvent::header) for typed lookups.
    pub enum AmiHeader {
        Event => "Event",
        Response => "Response",
        Message => "Message",
        ActionId => "ActionID",
        Privilege => "Privilege",
        Channel => "Channel",
        ChannelState => "ChannelState",
        ChannelStateDesc => "ChannelStateDesc",
        CallerIdNum => "CallerIDNum",
        CallerIdName => "CallerIDName",
        ConnectedLineNum => "ConnectedLineNum",
        ConnectedLineName => "ConnectedLineName",
        Context => "Context",
        Exten => "Exten",
        Priority => "Priority",
        Uniqueid => "Uniqueid",
        Linkedid => "Linkedid",
        Cause => "Cause",
        CauseTxt => "Cause-txt",
        Ping => "Ping",
        Timestamp => "Timestamp",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_wire_spelling() {
        assert_eq!(AmiHeader::ActionId.to_string(), "ActionID");
        assert_eq!(AmiHeader::CallerIdNum.to_string(), "CallerIDNum");
        assert_eq!(AmiHeader::CauseTxt.to_string(), "Cause-txt");
    }

    #[test]
    fn from_str_case_insensitive() {
        assert_eq!("actionid".parse::<AmiHeader>(), Ok(AmiHeader::ActionId));
        assert_eq!("EVENT".parse::<AmiHeader>(), Ok(AmiHeader::Event));
        assert_eq!("Uniqueid".parse::<AmiHeader>(), Ok(AmiHeader::Uniqueid));
    }

    #[test]
    fn from_str_unknown() {
        let err = "X-Not-A-Header".parse::<AmiHeader>();
        assert_eq!(
            err.unwrap_err()
                .to_string(),
            "unknown AMI header: X-Not-A-Header"
        );
    }

    #[test]
    fn every_variant_parses_back() {
        for v in AmiHeader::ALL {
            let parsed: AmiHeader = v
                .as_str()
                .parse()
                .unwrap();
            assert_eq!(parsed, *v, "round-trip failed for {v}");
        }
    }
}
