use std::fmt;

/// A Call-ID, used to key the call registry and to pick the owning
/// worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallId(pub String);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Via branch parameter, used to key the transaction registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Branch(pub String);

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dialog's natural key: the initiating request's From-tag paired
/// with the locally generated (or, for in-dialog requests, echoed)
/// To-tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogKey {
    pub from_tag: String,
    pub to_tag: String,
}

impl fmt::Display for DialogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.from_tag, self.to_tag)
    }
}
