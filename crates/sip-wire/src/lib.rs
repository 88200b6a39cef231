//! Message buffer, lazy header parser, method/status vocabulary, and
//! response formatting for a terminating SIP UAS.
//!
//! The parser never copies header bytes out of the datagram: every
//! accessor returns a slice borrowed from the [`Message`]'s own
//! buffer, located on first use and cached as a byte range so repeat
//! lookups are free.

pub mod error;
pub mod message;
pub mod method;
pub mod parser;
pub mod response;
pub mod status;

pub use error::ParseError;
pub use message::Message;
pub use method::Method;
pub use status::StatusClass;
