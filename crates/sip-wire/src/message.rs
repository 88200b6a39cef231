use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::Range;
use std::sync::Mutex;

use bytes::Bytes;

use crate::method::Method;

pub const MAX_DATAGRAM: usize = 1024;

/// The first line of a SIP message, already classified as a request
/// or a response and resolved into its constituent fields.
///
/// All ranges index into the owning [`Message`]'s buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum FirstLine {
    Request {
        method: Method,
        method_range: Range<usize>,
        uri: Range<usize>,
        version: (u32, u32),
    },
    Response {
        version: (u32, u32),
        status_code: u16,
        reason: Range<usize>,
    },
}

#[derive(Default)]
struct Cache {
    first_line: Option<FirstLine>,
    headers: HashMap<String, Option<Range<usize>>>,
    from_tag: Option<Option<Range<usize>>>,
    to_tag: Option<Option<Range<usize>>>,
    via_branch: Option<Option<Range<usize>>>,
}

/// A single received UDP datagram plus whatever has been parsed from
/// it so far.
///
/// `Message` owns the raw bytes; every header/parameter accessor in
/// [`crate::parser`] returns a slice borrowed from `buf`, cached here
/// as a byte range the first time it is located so repeat lookups
/// don't re-scan the buffer. This keeps the zero-copy property the
/// original C implementation relied on (pointers into the datagram)
/// without the C version's dangling-pointer risk: a `Range<usize>` is
/// only ever resolved against `self.buf`, which this struct owns for
/// its entire lifetime.
pub struct Message {
    pub buf: Bytes,
    pub peer: SocketAddr,
    cache: Mutex<Cache>,
}

impl Message {
    pub fn new(buf: Bytes, peer: SocketAddr) -> Self {
        Message {
            buf,
            peer,
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn slice(&self, range: &Range<usize>) -> &[u8] {
        &self.buf[range.clone()]
    }

    pub fn str_at(&self, range: &Range<usize>) -> &str {
        // The parser only ever produces ranges aligned on header/token
        // boundaries of an ASCII-only protocol, so this is always valid UTF-8.
        std::str::from_utf8(self.slice(range)).unwrap_or("")
    }

    pub(crate) fn first_line_cached(&self) -> Option<FirstLine> {
        self.cache.lock().unwrap().first_line.clone()
    }

    pub(crate) fn set_first_line(&self, line: FirstLine) {
        self.cache.lock().unwrap().first_line = Some(line);
    }

    pub(crate) fn cached_header(&self, name: &str) -> Option<Option<Range<usize>>> {
        self.cache.lock().unwrap().headers.get(&name.to_ascii_lowercase()).cloned()
    }

    pub(crate) fn cache_header(&self, name: &str, value: Option<Range<usize>>) {
        self.cache
            .lock()
            .unwrap()
            .headers
            .insert(name.to_ascii_lowercase(), value);
    }

    pub(crate) fn cached_from_tag(&self) -> Option<Option<Range<usize>>> {
        self.cache.lock().unwrap().from_tag.clone()
    }

    pub(crate) fn set_from_tag(&self, value: Option<Range<usize>>) {
        self.cache.lock().unwrap().from_tag = Some(value);
    }

    pub(crate) fn cached_to_tag(&self) -> Option<Option<Range<usize>>> {
        self.cache.lock().unwrap().to_tag.clone()
    }

    pub(crate) fn set_to_tag(&self, value: Option<Range<usize>>) {
        self.cache.lock().unwrap().to_tag = Some(value);
    }

    pub(crate) fn cached_via_branch(&self) -> Option<Option<Range<usize>>> {
        self.cache.lock().unwrap().via_branch.clone()
    }

    pub(crate) fn set_via_branch(&self, value: Option<Range<usize>>) {
        self.cache.lock().unwrap().via_branch = Some(value);
    }

    pub fn is_request(&self) -> Option<bool> {
        match self.first_line_cached()? {
            FirstLine::Request { .. } => Some(true),
            FirstLine::Response { .. } => Some(false),
        }
    }
}
