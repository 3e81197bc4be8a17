// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTSP/1.0 request and response representation, and an incremental parser
//! for responses arriving on a socket that may also carry interleaved binary
//! data (see [`super::interleaved`]).
//!
//! The wire contract: CSeq-first send order, case-insensitive header
//! matching, CRLFCRLF-terminated headers, and partial-read resumption so a
//! response can be reassembled regardless of how it's fragmented across
//! reads.

use bytes::{Buf, Bytes, BytesMut};
use smallvec::SmallVec;
use std::fmt::Display;

/// An RTSP request method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
    Record,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
            Method::Record => "RECORD",
        }
    }

    /// Parses a `Public:`-style method token, returning `None` for ones this crate never sends
    /// (eg `ANNOUNCE`, `SET_PARAMETER`) since there's no [`Method`] variant for them.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "OPTIONS" => Method::Options,
            "DESCRIBE" => Method::Describe,
            "SETUP" => Method::Setup,
            "PLAY" => Method::Play,
            "PAUSE" => Method::Pause,
            "TEARDOWN" => Method::Teardown,
            "GET_PARAMETER" => Method::GetParameter,
            "RECORD" => Method::Record,
            _ => return None,
        })
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stored header: original-case name plus value.
#[derive(Clone, Debug)]
struct HeaderEntry {
    name: String,
    value: String,
}

/// An ordered header multimap with case-insensitive lookup.
///
/// Insertion order is preserved for serialization (other than `CSeq`, which
/// [`Request::serialize`] always emits first). Duplicate headers received on
/// the wire are folded into one entry, values joined with `", "`, matching
/// RFC 2326 §12's treatment of repeated header fields.
#[derive(Clone, Debug, Default)]
pub struct Headers(SmallVec<[HeaderEntry; 8]>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Inserts a header, folding into an existing same-name entry (comma-joined) if present.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.0.iter_mut().find(|h| h.name.eq_ignore_ascii_case(&name)) {
            existing.value.push_str(", ");
            existing.value.push_str(&value);
        } else {
            self.0.push(HeaderEntry { name, value });
        }
    }

    /// Sets a header, overwriting any existing value (unlike [`Self::insert`]).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.0.iter_mut().find(|h| h.name.eq_ignore_ascii_case(&name)) {
            existing.value = value;
        } else {
            self.0.push(HeaderEntry { name, value });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|h| (h.name.as_str(), h.value.as_str()))
    }
}

/// An RTSP request.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub cseq: u32,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>, cseq: u32) -> Self {
        Self {
            method,
            url: url.into(),
            cseq,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Serializes the request, always placing `CSeq` first (some servers reject otherwise).
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.url.as_bytes());
        buf.extend_from_slice(b" RTSP/1.0\r\n");
        buf.extend_from_slice(format!("CSeq: {}\r\n", self.cseq).as_bytes());
        if !self.body.is_empty() {
            buf.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("cseq") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }
}

/// An RTSP response.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Bytes,
    pub cseq: Option<u32>,
}

impl Response {
    /// A response is "final" once its status is >= 200; 1xx is informational
    /// and must not complete the waiting request future.
    pub fn is_final(&self) -> bool {
        self.status >= 200
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn parse_start_line_and_headers(block: &[u8]) -> Result<Response, String> {
    let text = std::str::from_utf8(block).map_err(|_| "non-UTF-8 response headers".to_owned())?;
    let mut lines = text.split("\r\n");
    let start_line = lines.next().ok_or_else(|| "empty response".to_owned())?;
    let mut parts = start_line.splitn(3, ' ');
    let _version = parts.next().ok_or_else(|| "missing RTSP version".to_owned())?;
    let status: u16 = parts
        .next()
        .ok_or_else(|| "missing status code".to_owned())?
        .parse()
        .map_err(|_| "non-numeric status code".to_owned())?;
    let reason = parts.next().unwrap_or("").to_owned();

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| format!("header line missing ':': {:?}", line))?;
        headers.insert(name.trim(), value.trim());
    }
    let cseq = headers.get("cseq").and_then(|v| v.trim().parse().ok());
    Ok(Response {
        status,
        reason,
        headers,
        body: Bytes::new(),
        cseq,
    })
}

/// State of an in-progress response parse.
enum State {
    /// Waiting for a CRLFCRLF-terminated start-line+headers block.
    WantHeaders,
    /// Headers parsed; waiting for `remaining` more body bytes.
    WantBody {
        response: Response,
        remaining: usize,
    },
}

/// Incrementally parses RTSP responses out of a byte stream that may also
/// carry `$`-prefixed interleaved binary frames (stripped out by the caller
/// before bytes reach this parser; see [`super::interleaved::Demuxer`]).
///
/// Must produce identical results regardless of how the input is chunked,
/// down to one byte at a time.
pub struct ResponseParser {
    state: State,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            state: State::WantHeaders,
        }
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to parse one response from the front of `buf`, consuming the
    /// bytes it used. Returns `Ok(None)` if more data is needed.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Response>, String> {
        loop {
            match &mut self.state {
                State::WantHeaders => {
                    let header_end = match find_crlfcrlf(buf) {
                        Some(pos) => pos,
                        None => return Ok(None),
                    };
                    let block = buf.split_to(header_end + 4);
                    let response = parse_start_line_and_headers(&block[..block.len() - 4])?;
                    let remaining = response
                        .headers
                        .get("content-length")
                        .map(|v| v.trim().parse::<usize>())
                        .transpose()
                        .map_err(|_| "non-numeric Content-Length".to_owned())?
                        .unwrap_or(0);
                    if remaining == 0 {
                        return Ok(Some(response));
                    }
                    self.state = State::WantBody { response, remaining };
                }
                State::WantBody { remaining, .. } => {
                    if buf.len() < *remaining {
                        return Ok(None);
                    }
                    let body = buf.split_to(*remaining).freeze();
                    let state = std::mem::replace(&mut self.state, State::WantHeaders);
                    let mut response = match state {
                        State::WantBody { response, .. } => response,
                        _ => unreachable!(),
                    };
                    response.body = body;
                    return Ok(Some(response));
                }
            }
        }
    }
}

fn find_crlfcrlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Whether `buf`'s first unread byte is the start of an interleaved binary frame.
#[inline]
pub fn starts_interleaved_frame(buf: &[u8]) -> bool {
    buf.first() == Some(&b'$')
}

/// Consumes any leading bytes from `buf`, ensuring `Buf` remains usable after a short peek.
#[allow(dead_code)]
fn peek_byte(buf: &BytesMut) -> Option<u8> {
    buf.chunk().first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_whole(raw: &[u8]) -> Response {
        let mut buf = BytesMut::from(raw);
        let mut parser = ResponseParser::new();
        parser.parse(&mut buf).unwrap().unwrap()
    }

    fn feed_byte_at_a_time(raw: &[u8]) -> Response {
        let mut buf = BytesMut::new();
        let mut parser = ResponseParser::new();
        for &b in raw {
            buf.extend_from_slice(&[b]);
            if let Some(r) = parser.parse(&mut buf).unwrap() {
                return r;
            }
        }
        panic!("never completed");
    }

    const RESPONSE: &[u8] = b"RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Type: application/sdp\r\nContent-Length: 5\r\n\r\nhello";

    #[test]
    fn parses_whole_buffer() {
        let r = feed_whole(RESPONSE);
        assert_eq!(r.status, 200);
        assert_eq!(r.reason, "OK");
        assert_eq!(r.cseq, Some(2));
        assert_eq!(&r.body[..], b"hello");
        assert!(r.is_success());
    }

    #[test]
    fn fragmentation_is_irrelevant() {
        let whole = feed_whole(RESPONSE);
        let fragmented = feed_byte_at_a_time(RESPONSE);
        assert_eq!(whole.status, fragmented.status);
        assert_eq!(whole.cseq, fragmented.cseq);
        assert_eq!(&whole.body[..], &fragmented.body[..]);
    }

    #[test]
    fn no_body_when_no_content_length() {
        let raw = b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n";
        let r = feed_whole(raw);
        assert!(r.body.is_empty());
    }

    #[test]
    fn duplicate_headers_are_comma_joined() {
        let raw = b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nWWW-Authenticate: Basic\r\nWWW-Authenticate: Digest\r\n\r\n";
        let r = feed_whole(raw);
        assert_eq!(r.headers.get("www-authenticate"), Some("Basic, Digest"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let raw = b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nSession: abc;timeout=60\r\n\r\n";
        let r = feed_whole(raw);
        assert_eq!(r.headers.get("SESSION"), Some("abc;timeout=60"));
        assert_eq!(r.headers.get("session"), Some("abc;timeout=60"));
    }

    #[test]
    fn cseq_is_emitted_first() {
        let mut req = Request::new(Method::Options, "rtsp://cam/", 7);
        req.headers.insert("User-Agent", "camrtsp");
        let bytes = req.serialize();
        let text = std::str::from_utf8(&bytes).unwrap();
        let line2 = text.lines().nth(1).unwrap();
        assert!(line2.starts_with("CSeq: 7"), "got {:?}", line2);
    }

    #[test]
    fn informational_is_not_final() {
        let raw = b"RTSP/1.0 100 Continue\r\nCSeq: 1\r\n\r\n";
        let r = feed_whole(raw);
        assert!(!r.is_final());
    }
}
