use thiserror::Error;

/// The engine's error taxonomy. None of these cross the UDP boundary
/// as structured data — each is either logged-and-dropped or
/// translated into a SIP error response by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("malformed message")]
    MalformedMessage,

    #[error("missing mandatory header: {0}")]
    MissingMandatoryHeader(&'static str),

    #[error("missing mandatory parameter {parameter} on header {header}")]
    MissingMandatoryParameter {
        header: &'static str,
        parameter: &'static str,
    },

    #[error("unknown method")]
    UnknownMethod,

    #[error("unsupported SIP version")]
    UnsupportedSipVersion,

    #[error("allocation failure: {0}")]
    AllocationFailure(&'static str),

    #[error("internal failure: {0}")]
    InternalFailure(&'static str),

    #[error("transaction collision on branch {branch}")]
    TransactionCollision { branch: String },
}

impl From<sipd_wire::ParseError> for EngineError {
    fn from(err: sipd_wire::ParseError) -> Self {
        use sipd_wire::ParseError as P;
        match err {
            P::MalformedMessage(_) => EngineError::MalformedMessage,
            P::UnsupportedSipVersion { .. } => EngineError::UnsupportedSipVersion,
            P::UnknownMethod => EngineError::UnknownMethod,
            P::MissingMandatoryHeader(h) => EngineError::MissingMandatoryHeader(h),
            P::MissingMandatoryParameter { header, parameter } => {
                EngineError::MissingMandatoryParameter { header, parameter }
            }
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
