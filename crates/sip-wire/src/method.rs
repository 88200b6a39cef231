use std::fmt;

/// The closed set of methods this UAS recognizes by name.
///
/// Matching is case-insensitive exact length+bytes comparison against
/// the token preceding the request-URI, per RFC 3261's method token
/// grammar. Anything outside this set resolves to [`Method::Unknown`]
/// rather than a parse failure — an unrecognized method is still a
/// well-formed request the engine answers with 501.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Register,
    Prack,
    Update,
    Subscribe,
    Notify,
    Publish,
    Info,
    Refer,
    Message,
    Unknown,
}

impl Method {
    /// Resolve a method token (e.g. `b"INVITE"`) against the closed set.
    pub fn from_bytes(token: &[u8]) -> Method {
        match_ignore_ascii_case(token, b"INVITE")
            .then_some(Method::Invite)
            .or_else(|| match_ignore_ascii_case(token, b"ACK").then_some(Method::Ack))
            .or_else(|| match_ignore_ascii_case(token, b"BYE").then_some(Method::Bye))
            .or_else(|| match_ignore_ascii_case(token, b"CANCEL").then_some(Method::Cancel))
            .or_else(|| match_ignore_ascii_case(token, b"OPTIONS").then_some(Method::Options))
            .or_else(|| match_ignore_ascii_case(token, b"REGISTER").then_some(Method::Register))
            .or_else(|| match_ignore_ascii_case(token, b"PRACK").then_some(Method::Prack))
            .or_else(|| match_ignore_ascii_case(token, b"UPDATE").then_some(Method::Update))
            .or_else(|| match_ignore_ascii_case(token, b"SUBSCRIBE").then_some(Method::Subscribe))
            .or_else(|| match_ignore_ascii_case(token, b"NOTIFY").then_some(Method::Notify))
            .or_else(|| match_ignore_ascii_case(token, b"PUBLISH").then_some(Method::Publish))
            .or_else(|| match_ignore_ascii_case(token, b"INFO").then_some(Method::Info))
            .or_else(|| match_ignore_ascii_case(token, b"REFER").then_some(Method::Refer))
            .or_else(|| match_ignore_ascii_case(token, b"MESSAGE").then_some(Method::Message))
            .unwrap_or(Method::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Register => "REGISTER",
            Method::Prack => "PRACK",
            Method::Update => "UPDATE",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Publish => "PUBLISH",
            Method::Info => "INFO",
            Method::Refer => "REFER",
            Method::Message => "MESSAGE",
            Method::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn match_ignore_ascii_case(token: &[u8], candidate: &'static [u8]) -> bool {
    token.len() == candidate.len() && token.eq_ignore_ascii_case(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_methods() {
        assert_eq!(Method::from_bytes(b"INVITE"), Method::Invite);
        assert_eq!(Method::from_bytes(b"invite"), Method::Invite);
        assert_eq!(Method::from_bytes(b"Bye"), Method::Bye);
    }

    #[test]
    fn unknown_method_is_not_an_error() {
        assert_eq!(Method::from_bytes(b"FOO"), Method::Unknown);
    }

    #[test]
    fn length_mismatch_does_not_prefix_match() {
        // "INVITED" must not match "INVITE" by prefix.
        assert_eq!(Method::from_bytes(b"INVITED"), Method::Unknown);
    }
}
