/// Status-code range classification used to dispatch inbound
/// responses to the appropriate handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Provisional,
    Success,
    Redirection,
    ClientError,
    ServerError,
    GlobalFailure,
}

impl StatusClass {
    pub fn of(code: u16) -> Option<StatusClass> {
        match code {
            100..=199 => Some(StatusClass::Provisional),
            200..=299 => Some(StatusClass::Success),
            300..=399 => Some(StatusClass::Redirection),
            400..=499 => Some(StatusClass::ClientError),
            500..=599 => Some(StatusClass::ServerError),
            600..=699 => Some(StatusClass::GlobalFailure),
            _ => None,
        }
    }
}

/// Status codes this UAS is able to emit.
pub mod code {
    pub const TRYING: u16 = 100;
    pub const RINGING: u16 = 180;
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const NOT_IMPLEMENTED: u16 = 501;
}

pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        code::TRYING => "Trying",
        code::RINGING => "Ringing",
        code::OK => "OK",
        code::BAD_REQUEST => "Bad Request",
        code::FORBIDDEN => "Forbidden",
        code::NOT_FOUND => "Not Found",
        code::INTERNAL_SERVER_ERROR => "Internal Server Error",
        code::NOT_IMPLEMENTED => "Not Implemented",
        _ => "Unknown",
    }
}
