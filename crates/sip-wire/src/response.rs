//! Formats outbound SIP responses: status line, echoed Via/From/To/
//! Call-ID/CSeq, `Content-Length: 0`, empty line. No message body is
//! ever produced.

use std::ops::Range;

use crate::message::Message;
use crate::parser;
use crate::status::reason_phrase;

/// Everything needed to format a response independent of the engine's
/// registry lookups: the request's own Via/From/To/Call-ID/CSeq, and
/// an optional locally generated To-tag to append when the request's
/// To header doesn't already carry one.
pub struct ResponseTemplate<'m> {
    pub request: &'m Message,
    pub status_code: u16,
    pub to_tag: Option<String>,
}

/// Build a complete response datagram as owned bytes.
pub fn build(template: &ResponseTemplate<'_>) -> Vec<u8> {
    let req = template.request;
    let mut out = Vec::with_capacity(256);

    out.extend_from_slice(b"SIP/2.0 ");
    out.extend_from_slice(template.status_code.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(reason_phrase(template.status_code).as_bytes());
    out.extend_from_slice(b"\r\n");

    write_echoed_header(&mut out, req, "Via");
    write_echoed_header(&mut out, req, "From");
    write_to_header(&mut out, req, template.to_tag.as_deref());
    write_echoed_header(&mut out, req, "Call-ID");
    write_echoed_header(&mut out, req, "CSeq");
    out.extend_from_slice(b"Content-Length: 0\r\n");
    out.extend_from_slice(b"\r\n");

    out
}

fn write_echoed_header(out: &mut Vec<u8>, req: &Message, name: &str) {
    if let Some(range) = parser::get_header_value(req, name) {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value_bytes(req, &range));
        out.extend_from_slice(b"\r\n");
    }
}

fn value_bytes<'m>(req: &'m Message, range: &Range<usize>) -> &'m [u8] {
    req.slice(range)
}

/// Echo the request's To header, appending `;tag=<to_tag>` only when
/// the request's To header doesn't already carry a tag.
fn write_to_header(out: &mut Vec<u8>, req: &Message, to_tag: Option<&str>) {
    out.extend_from_slice(b"To: ");
    if let Some(range) = parser::get_header_value(req, "To") {
        out.extend_from_slice(value_bytes(req, &range));
    }
    let already_tagged = parser::get_to_tag(req).ok().flatten().is_some();
    if !already_tagged {
        if let Some(tag) = to_tag {
            out.extend_from_slice(b";tag=");
            out.extend_from_slice(tag.as_bytes());
        }
    }
    out.extend_from_slice(b"\r\n");
}
