use thiserror::Error;

/// Outcome of running the lazy parser over a datagram.
///
/// Every variant here is non-recoverable for the message it was
/// raised on: the engine either sends an error response or drops the
/// message outright (see `sip-engine`'s error taxonomy for which).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),

    #[error("unsupported SIP version {major}.{minor}")]
    UnsupportedSipVersion { major: u32, minor: u32 },

    #[error("unknown method")]
    UnknownMethod,

    #[error("missing mandatory header: {0}")]
    MissingMandatoryHeader(&'static str),

    #[error("missing mandatory parameter {parameter} on header {header}")]
    MissingMandatoryParameter {
        header: &'static str,
        parameter: &'static str,
    },
}

pub type ParseResult<T> = Result<T, ParseError>;
