//! The lazy header parser: on-demand, cached, zero-copy lookups over
//! a [`Message`]'s buffer.
//!
//! Sub-parameter extraction tokenizes the parameter list instead of
//! skipping a fixed number of bytes past `;`, so a parameter that
//! merely precedes `tag=`/`branch=` can no longer be mistaken for it.

use std::ops::Range;

use crate::error::{ParseError, ParseResult};
use crate::message::{FirstLine, Message};
use crate::method::Method;

const CRLF: &[u8] = b"\r\n";

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .windows(2)
        .position(|w| w == CRLF)
        .map(|p| from + p)
}

/// Locate the next CRLF-terminated line starting at `from`. Returns
/// the line's byte range (exclusive of the CRLF) and the offset just
/// past the CRLF.
fn next_line(buf: &[u8], from: usize) -> Option<(Range<usize>, usize)> {
    let end = find_crlf(buf, from)?;
    Some((from..end, end + 2))
}

/// Parse the first line of the message, classifying it as a request
/// or a response and caching the result on `msg`.
pub fn parse_first_line(msg: &Message) -> ParseResult<FirstLine> {
    if let Some(cached) = msg.first_line_cached() {
        return Ok(cached);
    }

    let buf = msg.as_bytes();
    let (line, _) =
        next_line(buf, 0).ok_or(ParseError::MalformedMessage("no CRLF-terminated first line"))?;
    let line_bytes = &buf[line.clone()];

    let first_line = if line_bytes.len() >= 3 && line_bytes[..3].eq_ignore_ascii_case(b"SIP") {
        parse_status_line(buf, line)?
    } else {
        parse_request_line(buf, line)?
    };

    msg.set_first_line(first_line.clone());
    Ok(first_line)
}

fn split_on_spaces(bytes: &[u8]) -> Vec<Range<usize>> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let start = i;
        while i < bytes.len() && bytes[i] != b' ' {
            i += 1;
        }
        tokens.push(start..i);
    }
    tokens
}

fn parse_sip_version(token: &[u8]) -> ParseResult<(u32, u32)> {
    let s = std::str::from_utf8(token)
        .map_err(|_| ParseError::MalformedMessage("SIP version is not UTF-8"))?;
    let rest = s
        .strip_prefix("SIP/")
        .ok_or(ParseError::MalformedMessage("missing SIP/ version prefix"))?;
    let (major_s, minor_s) = rest
        .split_once('.')
        .ok_or(ParseError::MalformedMessage("malformed SIP version"))?;
    let major: u32 = major_s
        .parse()
        .map_err(|_| ParseError::MalformedMessage("non-numeric SIP major version"))?;
    let minor: u32 = minor_s
        .parse()
        .map_err(|_| ParseError::MalformedMessage("non-numeric SIP minor version"))?;
    if major != 2 || minor != 0 {
        return Err(ParseError::UnsupportedSipVersion { major, minor });
    }
    Ok((major, minor))
}

fn parse_request_line(buf: &[u8], line: Range<usize>) -> ParseResult<FirstLine> {
    let tokens = split_on_spaces(&buf[line.clone()]);
    if tokens.len() != 3 {
        return Err(ParseError::MalformedMessage(
            "request line must be `METHOD SP URI SP SIP/2.0`",
        ));
    }
    let base = line.start;
    let method_range = (base + tokens[0].start)..(base + tokens[0].end);
    let uri_range = (base + tokens[1].start)..(base + tokens[1].end);
    let version_range = (base + tokens[2].start)..(base + tokens[2].end);

    let version = parse_sip_version(&buf[version_range])?;
    let method = Method::from_bytes(&buf[method_range.clone()]);

    Ok(FirstLine::Request {
        method,
        method_range,
        uri: uri_range,
        version,
    })
}

fn parse_status_line(buf: &[u8], line: Range<usize>) -> ParseResult<FirstLine> {
    let tokens = split_on_spaces(&buf[line.clone()]);
    if tokens.len() < 3 {
        return Err(ParseError::MalformedMessage(
            "status line must be `SIP/2.0 SP CODE SP REASON`",
        ));
    }
    let base = line.start;
    let version_range = (base + tokens[0].start)..(base + tokens[0].end);
    let code_range = (base + tokens[1].start)..(base + tokens[1].end);
    let mut reason_start = base + tokens[1].end;
    while reason_start < line.end && buf[reason_start] == b' ' {
        reason_start += 1;
    }
    let reason_range = reason_start..line.end;

    let version = parse_sip_version(&buf[version_range])?;
    let status_code: u16 = std::str::from_utf8(&buf[code_range])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::MalformedMessage("non-numeric status code"))?;

    Ok(FirstLine::Response {
        version,
        status_code,
        reason: reason_range,
    })
}

/// Linear scan over CRLF-separated lines for a header whose name
/// matches `header_name` case-insensitively as a prefix up to `:`.
/// Only the first occurrence is ever returned — multi-valued headers
/// (e.g. repeated Via) are out of scope.
pub fn get_header_value(msg: &Message, header_name: &str) -> Option<Range<usize>> {
    if let Some(cached) = msg.cached_header(header_name) {
        return cached;
    }

    let buf = msg.as_bytes();
    // Header section starts after the first line.
    let mut pos = match next_line(buf, 0) {
        Some((_, after)) => after,
        None => {
            msg.cache_header(header_name, None);
            return None;
        }
    };

    let result = loop {
        let (line, after) = match next_line(buf, pos) {
            Some(v) => v,
            None => break None,
        };
        if line.is_empty() {
            // Empty line terminates the header section.
            break None;
        }
        let line_bytes = &buf[line.clone()];
        if header_name_matches(line_bytes, header_name.as_bytes()) {
            let colon_rel = line_bytes
                .iter()
                .position(|&b| b == b':');
            if let Some(colon_rel) = colon_rel {
                let mut value_start = line.start + colon_rel + 1;
                while value_start < line.end
                    && matches!(buf[value_start], b' ' | b'\t')
                {
                    value_start += 1;
                }
                break Some(value_start..line.end);
            }
        }
        pos = after;
    };

    msg.cache_header(header_name, result.clone());
    result
}

fn header_name_matches(line: &[u8], name: &[u8]) -> bool {
    if line.len() < name.len() {
        return false;
    }
    if !line[..name.len()].eq_ignore_ascii_case(name) {
        return false;
    }
    // The byte right after the name must be the ':' (skipping optional
    // whitespace before it), never part of a longer header name.
    line[name.len()..]
        .iter()
        .find(|&&b| b != b' ' && b != b'\t')
        .is_some_and(|&b| b == b':')
}

/// Tokenize a `;`-delimited parameter list looking for `key=value`.
/// Unlike the original C routine, this walks every parameter and
/// compares the key explicitly instead of assuming the first `;` is
/// always followed by the wanted key.
fn find_param<'m>(msg: &'m Message, header_range: &Range<usize>, key: &str) -> Option<Range<usize>> {
    let buf = msg.as_bytes();
    let header = &buf[header_range.clone()];
    let base = header_range.start;

    for segment in header.split(|&b| b == b';').skip(1) {
        let seg_start = {
            // Recover the absolute offset of this segment within the header.
            let seg_ptr = segment.as_ptr() as usize;
            let header_ptr = header.as_ptr() as usize;
            base + (seg_ptr - header_ptr)
        };
        let mut i = 0;
        while i < segment.len() && matches!(segment[i], b' ' | b'\t') {
            i += 1;
        }
        let key_start = i;
        while i < segment.len() && segment[i] != b'=' && segment[i] != b';' {
            i += 1;
        }
        if i >= segment.len() || segment[i] != b'=' {
            continue;
        }
        let found_key = &segment[key_start..i];
        if found_key.eq_ignore_ascii_case(key.as_bytes()) {
            let value_start = seg_start + i + 1;
            let value_end = seg_start + segment.len();
            return Some(value_start..value_end);
        }
    }
    None
}

pub fn get_from_tag(msg: &Message) -> ParseResult<Option<Range<usize>>> {
    if let Some(cached) = msg.cached_from_tag() {
        return Ok(cached);
    }
    let from = get_header_value(msg, "From").ok_or(ParseError::MissingMandatoryHeader("From"))?;
    let tag = find_param(msg, &from, "tag");
    msg.set_from_tag(tag.clone());
    Ok(tag)
}

pub fn get_to_tag(msg: &Message) -> ParseResult<Option<Range<usize>>> {
    if let Some(cached) = msg.cached_to_tag() {
        return Ok(cached);
    }
    let to = get_header_value(msg, "To").ok_or(ParseError::MissingMandatoryHeader("To"))?;
    let tag = find_param(msg, &to, "tag");
    msg.set_to_tag(tag.clone());
    Ok(tag)
}

pub fn get_via_branch(msg: &Message) -> ParseResult<Option<Range<usize>>> {
    if let Some(cached) = msg.cached_via_branch() {
        return Ok(cached);
    }
    let via = get_header_value(msg, "Via").ok_or(ParseError::MissingMandatoryHeader("Via"))?;
    let branch = find_param(msg, &via, "branch");
    msg.set_via_branch(branch.clone());
    Ok(branch)
}

/// The mandatory header set for requests: From (with tag), To, Via
/// (with branch), CSeq, Content-Length, and Max-Forwards.
pub fn parse_message(msg: &Message) -> ParseResult<()> {
    let first_line = parse_first_line(msg)?;

    get_header_value(msg, "Call-ID").ok_or(ParseError::MissingMandatoryHeader("Call-ID"))?;
    get_header_value(msg, "CSeq").ok_or(ParseError::MissingMandatoryHeader("CSeq"))?;
    get_header_value(msg, "Content-Length")
        .ok_or(ParseError::MissingMandatoryHeader("Content-Length"))?;

    get_from_tag(msg)?.ok_or(ParseError::MissingMandatoryParameter {
        header: "From",
        parameter: "tag",
    })?;
    get_header_value(msg, "To").ok_or(ParseError::MissingMandatoryHeader("To"))?;
    get_via_branch(msg)?.ok_or(ParseError::MissingMandatoryParameter {
        header: "Via",
        parameter: "branch",
    })?;

    if let FirstLine::Request { method, .. } = &first_line {
        get_header_value(msg, "Max-Forwards")
            .ok_or(ParseError::MissingMandatoryHeader("Max-Forwards"))?;
        if *method == Method::Unknown {
            return Err(ParseError::UnknownMethod);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::net::SocketAddr;

    fn msg(text: &str) -> Message {
        Message::new(Bytes::from(text.to_string()), "127.0.0.1:5060".parse::<SocketAddr>().unwrap())
    }

    const INVITE: &str = "INVITE sip:bob@a SIP/2.0\r\nVia: SIP/2.0/UDP c;branch=z9hG4bK-1\r\nFrom: <sip:a>;tag=A\r\nTo: <sip:b>\r\nCall-ID: C1\r\nCSeq: 1 INVITE\r\nMax-Forwards: 70\r\nContent-Length: 0\r\n\r\n";

    #[test]
    fn parses_request_line() {
        let m = msg(INVITE);
        match parse_first_line(&m).unwrap() {
            FirstLine::Request { method, version, .. } => {
                assert_eq!(method, Method::Invite);
                assert_eq!(version, (2, 0));
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn header_value_excludes_colon_and_crlf() {
        let m = msg(INVITE);
        let range = get_header_value(&m, "Call-ID").unwrap();
        assert_eq!(m.str_at(&range), "C1");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let m = msg(INVITE);
        let range = get_header_value(&m, "call-id").unwrap();
        assert_eq!(m.str_at(&range), "C1");
    }

    #[test]
    fn from_tag_is_extracted() {
        let m = msg(INVITE);
        let range = get_from_tag(&m).unwrap().unwrap();
        assert_eq!(m.str_at(&range), "A");
    }

    #[test]
    fn via_branch_is_extracted() {
        let m = msg(INVITE);
        let range = get_via_branch(&m).unwrap().unwrap();
        assert_eq!(m.str_at(&range), "z9hG4bK-1");
    }

    #[test]
    fn to_tag_absent_on_fresh_invite() {
        let m = msg(INVITE);
        assert!(get_to_tag(&m).unwrap().is_none());
    }

    #[test]
    fn tag_lookup_is_not_fooled_by_a_preceding_parameter() {
        // Regression test for the §9 Design Notes bug: a parameter
        // named something other than "tag" sitting before it must not
        // be mistaken for the tag value.
        let text = "INVITE sip:bob@a SIP/2.0\r\nVia: SIP/2.0/UDP c;branch=z9hG4bK-1\r\nFrom: <sip:a>;early=1;tag=A\r\nTo: <sip:b>\r\nCall-ID: C1\r\nCSeq: 1 INVITE\r\nMax-Forwards: 70\r\nContent-Length: 0\r\n\r\n";
        let m = msg(text);
        let range = get_from_tag(&m).unwrap().unwrap();
        assert_eq!(m.str_at(&range), "A");
    }

    #[test]
    fn missing_call_id_is_reported() {
        let text = "INVITE sip:bob@a SIP/2.0\r\nVia: SIP/2.0/UDP c;branch=z9hG4bK-1\r\nFrom: <sip:a>;tag=A\r\nTo: <sip:b>\r\nCSeq: 1 INVITE\r\nMax-Forwards: 70\r\nContent-Length: 0\r\n\r\n";
        let m = msg(text);
        assert_eq!(
            parse_message(&m),
            Err(ParseError::MissingMandatoryHeader("Call-ID"))
        );
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let text = "INVITE sip:bob@a SIP/3.0\r\nVia: SIP/2.0/UDP c;branch=z9hG4bK-1\r\nFrom: <sip:a>;tag=A\r\nTo: <sip:b>\r\nCall-ID: C1\r\nCSeq: 1 INVITE\r\nMax-Forwards: 70\r\nContent-Length: 0\r\n\r\n";
        let m = msg(text);
        assert_eq!(
            parse_first_line(&m),
            Err(ParseError::UnsupportedSipVersion { major: 3, minor: 0 })
        );
    }

    proptest::proptest! {
        #[test]
        fn header_value_round_trips(value in "[a-zA-Z0-9:._-]{1,40}") {
            let text = format!(
                "INVITE sip:bob@a SIP/2.0\r\nVia: SIP/2.0/UDP c;branch=z9hG4bK-1\r\nFrom: <sip:a>;tag=A\r\nTo: <sip:b>\r\nCall-ID: C1\r\nCSeq: 1 INVITE\r\nMax-Forwards: 70\r\nContent-Length: 0\r\nX-Test: {value}\r\n\r\n"
            );
            let m = msg(&text);
            let range = get_header_value(&m, "X-Test").unwrap();
            assert_eq!(m.str_at(&range), value);
        }
    }
}
