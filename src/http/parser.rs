//! Incremental HTTP/1.x framing.
//!
//! The parser never reads from a socket. It is handed the bytes accumulated
//! so far and either produces a complete [`Message`] or says why it cannot.
//! [`ParseError::is_recoverable`] tells the caller whether reading more bytes
//! could help.
//!
//! Parsing first computes byte ranges over the input and only then builds the
//! message, so record values end up as slices of one shared buffer.

use std::ops::Range;

use bytes::{Bytes, BytesMut};
use memchr::memmem;
use thiserror::Error;

use crate::http::message::{Message, Part, Record};
use crate::http::request::{BodyKind, Method, Version};
use crate::http::response::StatusCode;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Leading bytes that make a url-encoded body malformed.
const FORM_REJECT: &[u8] = b"&=+[]{}*";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Awaiting HTTP header")]
    AwaitingHeader,

    #[error("Awaiting HTTP body ({received} of {expected} bytes)")]
    AwaitingBody { expected: usize, received: usize },

    #[error("HTTP header is incomplete: missing {0}")]
    IncompleteHeader(&'static str),

    #[error("HTTP request line is malformed")]
    MalformedFirstLine,

    #[error("HTTP method '{0}' is not supported")]
    UnsupportedMethod(String),

    #[error("HTTP protocol '{0}' is not supported")]
    UnsupportedProtocol(String),

    #[error("HTTP status line is malformed")]
    MalformedStatusLine,

    #[error("Content-Length is required")]
    MissingContentLength,

    #[error("Content-Length is invalid")]
    InvalidContentLength,

    #[error("HTTP querystring is invalid")]
    InvalidQueryString,

    #[error("HTTP header is malformed")]
    InvalidHeader,

    #[error("Got malformed data from submitted form")]
    MalformedFormData,
}

impl ParseError {
    /// More input may turn this into a successful parse.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ParseError::AwaitingHeader | ParseError::AwaitingBody { .. }
        )
    }

    /// The request cannot be salvaged.
    ///
    /// `IncompleteHeader` is neither: reading stops, but it is a content
    /// problem rather than a framing one.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable() && !matches!(self, ParseError::IncompleteHeader(_))
    }

    /// No valid request line was ever seen, so there is nobody to answer.
    pub fn rejects_request_line(&self) -> bool {
        matches!(
            self,
            ParseError::MalformedFirstLine
                | ParseError::UnsupportedMethod(_)
                | ParseError::UnsupportedProtocol(_)
        )
    }

    /// Status of the error reply for failures after the request line.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::MissingContentLength => StatusCode::LengthRequired,
            _ => StatusCode::BadRequest,
        }
    }
}

/// Offset of the `\r\n\r\n` that ends the header section.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    memmem::find(buf, HEADER_END)
}

/// Parses a request out of `buf`, copying the consumed bytes once.
///
/// Trailing bytes past the request (a pipelined follow-up) are ignored; use
/// [`Message::len`] to see how much was consumed.
pub fn parse_request(buf: &[u8]) -> Result<Message, ParseError> {
    let layout = scan_request(buf)?;
    let raw = Bytes::copy_from_slice(&buf[..layout.total]);
    Ok(layout.build(raw))
}

/// Parses a request and splits its bytes off the front of `buf`.
///
/// On error `buf` is left untouched so the caller can read more and retry.
pub fn frame_request(buf: &mut BytesMut) -> Result<Message, ParseError> {
    let layout = scan_request(&buf[..])?;
    let raw = buf.split_to(layout.total).freeze();
    Ok(layout.build(raw))
}

/// Parses a serialized response: status line, headers and body.
///
/// With a `Content-Length` header the body is exactly that long, otherwise it
/// runs to the end of `buf`. The body always lands in one record named `body`.
pub fn parse_response(buf: &[u8]) -> Result<Message, ParseError> {
    let header_end = find_header_end(buf).ok_or(ParseError::AwaitingHeader)?;
    let header_len = header_end + HEADER_END.len();
    let line_end = first_line_end(buf, header_end);

    let line = std::str::from_utf8(&buf[..line_end]).map_err(|_| ParseError::MalformedStatusLine)?;
    let mut tokens = line.splitn(3, ' ');
    let version = tokens.next().ok_or(ParseError::MalformedStatusLine)?;
    let code = tokens.next().ok_or(ParseError::MalformedStatusLine)?;
    let version = Version::from_str(version)
        .ok_or_else(|| ParseError::UnsupportedProtocol(version.to_string()))?;
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::MalformedStatusLine);
    }
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(StatusCode::from_u16)
        .ok_or(ParseError::MalformedStatusLine)?;

    let raw_headers = header_lines(buf, line_end, header_end);

    let total = match lookup(&raw_headers, "Content-Length") {
        Some(range) => {
            let length = parse_length(&buf[range])?;
            let total = header_len
                .checked_add(length)
                .ok_or(ParseError::InvalidContentLength)?;
            if buf.len() < total {
                return Err(ParseError::AwaitingBody {
                    expected: length,
                    received: buf.len() - header_len,
                });
            }
            total
        }
        None => buf.len(),
    };

    let content_type = lookup(&raw_headers, "Content-Type")
        .map(|r| header_str(buf, r).map(str::to_string))
        .transpose()?;

    let headers = named_headers(raw_headers)?;

    let raw = Bytes::copy_from_slice(&buf[..total]);
    let mut message = Message::with_raw(raw.clone());
    message.version = Some(version);
    message.status = Some(status);
    message.content_type = content_type;
    message.content_length = total - header_len;
    message.header_len = header_len;
    message.headers = headers.into_iter().map(|s| s.into_record(&raw)).collect();
    message.body = vec![Record::new("body", raw.slice(header_len..total))];
    Ok(message)
}

/// Splits a multipart body on `--boundary`.
///
/// The pieces are returned verbatim, preamble and closing `--` included, so
/// joining them with the delimiter gives back `body` exactly.
pub fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    multipart_ranges(body, boundary)
        .into_iter()
        .map(|r| &body[r])
        .collect()
}

/// A named value located by range; becomes a [`Record`] once the raw buffer
/// exists.
struct Span {
    name: String,
    value: Range<usize>,
    part: Option<Part>,
}

impl Span {
    fn new(name: String, value: Range<usize>) -> Self {
        Self {
            name,
            value,
            part: None,
        }
    }

    fn into_record(self, raw: &Bytes) -> Record {
        Record {
            name: self.name,
            value: raw.slice(self.value),
            part: self.part,
        }
    }
}

/// A header line; `name` is `None` when the line has no usable `name:` prefix.
struct RawHeader {
    name: Option<String>,
    value: Range<usize>,
}

struct Layout {
    method: Method,
    version: Version,
    path: Range<usize>,
    host: Option<String>,
    port: Option<u16>,
    content_type: Option<String>,
    content_length: usize,
    boundary: Option<String>,
    body_kind: BodyKind,
    header_len: usize,
    total: usize,
    url: Vec<Span>,
    headers: Vec<Span>,
    body: Vec<Span>,
}

impl Layout {
    fn build(self, raw: Bytes) -> Message {
        let mut message = Message::with_raw(raw.clone());
        message.method = Some(self.method);
        message.path = String::from_utf8_lossy(&raw[self.path]).into_owned();
        message.version = Some(self.version);
        message.host = self.host;
        message.port = self.port;
        message.content_type = self.content_type;
        message.content_length = self.content_length;
        message.boundary = self.boundary;
        message.body_kind = self.body_kind;
        message.header_len = self.header_len;
        message.url = self.url.into_iter().map(|s| s.into_record(&raw)).collect();
        message.headers = self.headers.into_iter().map(|s| s.into_record(&raw)).collect();
        message.body = self.body.into_iter().map(|s| s.into_record(&raw)).collect();
        message
    }
}

fn scan_request(buf: &[u8]) -> Result<Layout, ParseError> {
    // Header terminator.
    let header_end = find_header_end(buf).ok_or(ParseError::AwaitingHeader)?;
    let header_len = header_end + HEADER_END.len();

    // Request line.
    let line_end = first_line_end(buf, header_end);
    let tokens: Vec<Range<usize>> = split_on(buf, 0..line_end, b' ')
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect();
    let [method, path, version] = tokens.as_slice() else {
        return Err(ParseError::MalformedFirstLine);
    };
    let method_str = ascii(buf, method.clone()).ok_or(ParseError::MalformedFirstLine)?;
    let version_str = ascii(buf, version.clone()).ok_or(ParseError::MalformedFirstLine)?;
    let path = path.clone();
    let method = Method::from_str(method_str)
        .ok_or_else(|| ParseError::UnsupportedMethod(method_str.to_string()))?;
    let version = Version::from_str(version_str)
        .ok_or_else(|| ParseError::UnsupportedProtocol(version_str.to_string()))?;

    let raw_headers = header_lines(buf, line_end, header_end);

    // Host and port.
    let (host, port) = match lookup(&raw_headers, "Host") {
        Some(range) => split_host(header_str(buf, range)?),
        None => (None, None),
    };

    // Content framing, body-bearing methods only.
    let mut content_length = 0;
    let mut content_type = None;
    let mut boundary = None;
    let mut body_kind = BodyKind::None;
    let mut total = header_len;

    if method.expects_body() {
        let length = lookup(&raw_headers, "Content-Length")
            .ok_or(ParseError::MissingContentLength)?;
        content_length = parse_length(&buf[length])?;

        let ctype = lookup(&raw_headers, "Content-Type")
            .ok_or(ParseError::IncompleteHeader("Content-Type"))?;
        let ctype = header_str(buf, ctype)?;
        let mut params = ctype.split(';');
        let media = params.next().unwrap_or_default().trim();
        body_kind = BodyKind::classify(media);
        boundary = params.find_map(|p| {
            let (key, value) = p.trim().split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"').to_string())
        });
        content_type = Some(media.to_string());

        total = header_len
            .checked_add(content_length)
            .ok_or(ParseError::InvalidContentLength)?;
        if buf.len() < total {
            return Err(ParseError::AwaitingBody {
                expected: content_length,
                received: buf.len() - header_len,
            });
        }
    }

    // Query string.
    let mut url = Vec::new();
    if let Some(q) = memchr::memchr(b'?', &buf[path.clone()]) {
        let query = path.start + q + 1..path.end;
        for seg in split_on(buf, query, b'&') {
            if seg.is_empty() {
                continue;
            }
            let eq = memchr::memchr(b'=', &buf[seg.clone()]).ok_or(ParseError::InvalidQueryString)?;
            let name = seg.start..seg.start + eq;
            if name.is_empty() {
                return Err(ParseError::InvalidQueryString);
            }
            let name = utf8(buf, name).ok_or(ParseError::InvalidQueryString)?;
            url.push(Span::new(name.to_string(), seg.start + eq + 1..seg.end));
        }
    }

    // Header records.
    let headers = named_headers(raw_headers)?;

    // Body records.
    let body_range = header_len..total;
    let body = if body_range.is_empty() {
        Vec::new()
    } else {
        match body_kind {
            BodyKind::UrlEncoded => parse_url_encoded(buf, body_range)?,
            BodyKind::Multipart => {
                let boundary = boundary.as_deref().ok_or(ParseError::MalformedFormData)?;
                parse_multipart(buf, body_range, boundary)?
            }
            BodyKind::Free => vec![Span::new("body".to_string(), body_range)],
            BodyKind::None => Vec::new(),
        }
    };

    Ok(Layout {
        method,
        version,
        path,
        host,
        port,
        content_type,
        content_length,
        boundary,
        body_kind,
        header_len,
        total,
        url,
        headers,
        body,
    })
}

fn parse_url_encoded(buf: &[u8], body: Range<usize>) -> Result<Vec<Span>, ParseError> {
    if FORM_REJECT.contains(&buf[body.start]) {
        return Err(ParseError::MalformedFormData);
    }

    let mut fields = Vec::new();
    for seg in split_on(buf, body, b'&') {
        if seg.is_empty() {
            continue;
        }
        let eq = memchr::memchr(b'=', &buf[seg.clone()]).ok_or(ParseError::MalformedFormData)?;
        let name = seg.start..seg.start + eq;
        if name.is_empty() {
            return Err(ParseError::MalformedFormData);
        }
        let name = utf8(buf, name).ok_or(ParseError::MalformedFormData)?;
        fields.push(Span::new(name.to_string(), seg.start + eq + 1..seg.end));
    }
    Ok(fields)
}

fn parse_multipart(buf: &[u8], body: Range<usize>, boundary: &str) -> Result<Vec<Span>, ParseError> {
    let pieces = multipart_ranges(&buf[body.clone()], boundary);
    if pieces.len() < 2 {
        return Err(ParseError::MalformedFormData);
    }

    let mut fields = Vec::new();
    // The first piece is the preamble.
    for piece in &pieces[1..] {
        let piece = body.start + piece.start..body.start + piece.end;
        let bytes = &buf[piece.clone()];
        if bytes.starts_with(b"--") {
            break;
        }
        if !bytes.starts_with(CRLF) {
            return Err(ParseError::MalformedFormData);
        }

        let head_start = piece.start + CRLF.len();
        // A part without headers starts directly with the blank line.
        let (head_end, value_start) = if buf[head_start..piece.end].starts_with(CRLF) {
            (head_start, head_start + CRLF.len())
        } else {
            let end = memmem::find(&buf[head_start..piece.end], HEADER_END)
                .ok_or(ParseError::MalformedFormData)?;
            (head_start + end, head_start + end + HEADER_END.len())
        };
        let mut value_end = piece.end;
        if buf[value_start..value_end].ends_with(CRLF) {
            value_end -= CRLF.len();
        }

        let mut name = None;
        let mut part = Part::default();
        let head = std::str::from_utf8(&buf[head_start..head_end]).map_err(|_| ParseError::MalformedFormData)?;
        for line in head.split("\r\n") {
            let (key, value) = line.split_once(':').ok_or(ParseError::MalformedFormData)?;
            let key = key.trim();
            let value = value.trim();
            if key.eq_ignore_ascii_case("Content-Disposition") {
                let mut params = value.split(';');
                part.disposition = params
                    .next()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string);
                for param in params {
                    let Some((k, v)) = param.trim().split_once('=') else {
                        continue;
                    };
                    let v = v.trim().trim_matches('"').to_string();
                    match k.trim() {
                        "name" => name = Some(v),
                        "filename" => part.filename = Some(v),
                        _ => {}
                    }
                }
            } else if key.eq_ignore_ascii_case("Content-Type") {
                part.content_type = Some(value.to_string());
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or(ParseError::MalformedFormData)?;
        fields.push(Span {
            name,
            value: value_start..value_end,
            part: Some(part),
        });
    }
    Ok(fields)
}

fn multipart_ranges(body: &[u8], boundary: &str) -> Vec<Range<usize>> {
    let delimiter = format!("--{}", boundary);
    let mut ranges = Vec::new();
    let mut start = 0;
    for pos in memmem::find_iter(body, delimiter.as_bytes()) {
        ranges.push(start..pos);
        start = pos + delimiter.len();
    }
    ranges.push(start..body.len());
    ranges
}

fn first_line_end(buf: &[u8], header_end: usize) -> usize {
    // The terminator itself starts with CRLF, so a match always exists.
    memmem::find(&buf[..header_end + CRLF.len()], CRLF).unwrap_or(header_end)
}

fn header_lines(buf: &[u8], line_end: usize, header_end: usize) -> Vec<RawHeader> {
    if line_end >= header_end {
        return Vec::new();
    }

    let section = line_end + CRLF.len()..header_end;
    let mut lines = Vec::new();
    let mut start = section.start;
    for pos in memmem::find_iter(&buf[section.clone()], CRLF) {
        lines.push(start..section.start + pos);
        start = section.start + pos + CRLF.len();
    }
    lines.push(start..section.end);

    lines
        .into_iter()
        .map(|line| match memchr::memchr(b':', &buf[line.clone()]) {
            Some(colon) => {
                let name = utf8(buf, line.start..line.start + colon)
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string);
                RawHeader {
                    name,
                    value: trim(buf, line.start + colon + 1..line.end),
                }
            }
            None => RawHeader {
                name: None,
                value: line,
            },
        })
        .collect()
}

fn named_headers(raw: Vec<RawHeader>) -> Result<Vec<Span>, ParseError> {
    raw.into_iter()
        .map(|h| {
            let name = h.name.ok_or(ParseError::InvalidHeader)?;
            Ok(Span::new(name, h.value))
        })
        .collect()
}

fn lookup(headers: &[RawHeader], name: &str) -> Option<Range<usize>> {
    headers
        .iter()
        .find(|h| h.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .map(|h| h.value.clone())
}

fn header_str(buf: &[u8], range: Range<usize>) -> Result<&str, ParseError> {
    utf8(buf, range).ok_or(ParseError::InvalidHeader)
}

/// Splits a `Host` value into host and port text.
///
/// Only a `:` after any closing `]` starts the port, so bracketed IPv6
/// literals such as `[::1]:2000` keep their brackets and colons.
pub fn split_authority(value: &str) -> (&str, Option<&str>) {
    let value = value.trim();
    let from = value.rfind(']').unwrap_or(0);
    match value[from..].find(':') {
        Some(i) => (&value[..from + i], Some(&value[from + i + 1..])),
        None => (value, None),
    }
}

fn split_host(value: &str) -> (Option<String>, Option<u16>) {
    let (host, port) = split_authority(value);
    let host = host.trim();
    let port = port.and_then(|p| p.trim().parse::<u16>().ok());
    if host.is_empty() {
        (None, port)
    } else {
        (Some(host.to_string()), port)
    }
}

fn parse_length(bytes: &[u8]) -> Result<usize, ParseError> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidContentLength);
    }
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(ParseError::InvalidContentLength)
}

fn split_on(buf: &[u8], range: Range<usize>, sep: u8) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = range.start;
    for i in memchr::memchr_iter(sep, &buf[range.clone()]) {
        out.push(start..range.start + i);
        start = range.start + i + 1;
    }
    out.push(start..range.end);
    out
}

fn trim(buf: &[u8], mut range: Range<usize>) -> Range<usize> {
    while range.start < range.end && matches!(buf[range.start], b' ' | b'\t') {
        range.start += 1;
    }
    while range.end > range.start && matches!(buf[range.end - 1], b' ' | b'\t') {
        range.end -= 1;
    }
    range
}

fn utf8(buf: &[u8], range: Range<usize>) -> Option<&str> {
    std::str::from_utf8(&buf[range]).ok()
}

fn ascii(buf: &[u8], range: Range<usize>) -> Option<&str> {
    utf8(buf, range).filter(|s| s.is_ascii())
}
