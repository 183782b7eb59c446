//! The in-flight HTTP entity shared by requests and responses.
//!
//! A [`Message`] owns the raw bytes it was parsed from; every [`Record`] value
//! is a cheap [`Bytes`] slice into that buffer (or, for records the handler
//! builds, a separately owned buffer). Dropping the message releases both.

use bytes::Bytes;

use crate::http::parser::ParseError;
use crate::http::request::{BodyKind, Method, Version};
use crate::http::response::{self, StatusCode};

/// Extra fields carried only by `multipart/form-data` parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub content_type: Option<String>,
    /// Disposition type, normally `form-data`.
    pub disposition: Option<String>,
    pub filename: Option<String>,
}

/// One name/value pair from the query string, the header block or the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub value: Bytes,
    pub part: Option<Part>,
}

impl Record {
    pub fn new(name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            part: None,
        }
    }

    pub fn multipart(name: impl Into<String>, value: Bytes, part: Part) -> Self {
        Self {
            name: name.into(),
            value,
            part: Some(part),
        }
    }

    pub fn size(&self) -> usize {
        self.value.len()
    }

    /// The value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    pub fn is_multipart(&self) -> bool {
        self.part.is_some()
    }
}

/// A request or response in flight.
///
/// Created empty at the start of a cycle, filled by the parser (requests) or a
/// handler (responses), and dropped at the end of the cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub method: Option<Method>,
    /// Request target as sent, including any query string.
    pub path: String,
    pub version: Option<Version>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub content_type: Option<String>,
    pub content_length: usize,
    pub boundary: Option<String>,
    pub body_kind: BodyKind,
    pub status: Option<StatusCode>,
    /// Length of the header section, request line and blank line included.
    pub header_len: usize,
    /// Set when the cycle failed and this message carries the error reply.
    pub error: Option<String>,
    pub url: Vec<Record>,
    pub headers: Vec<Record>,
    pub body: Vec<Record>,
    raw: Bytes,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_raw(raw: Bytes) -> Self {
        Self {
            raw,
            ..Self::default()
        }
    }

    /// The bytes this message was parsed from.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Total length of the raw buffer.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Replaces the body with a single record named `body`.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        let value = body.into();
        self.content_length = value.len();
        self.body = vec![Record::new("body", value)];
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Record::new(name.into(), value.into()));
    }

    /// Replaces every header called `name` with one holding `value`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
        self.add_header(name, value);
    }

    /// First header called `name`, compared ASCII case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .and_then(Record::value_str)
    }

    pub fn url_param(&self, name: &str) -> Option<&Record> {
        self.url.iter().find(|r| r.name == name)
    }

    pub fn body_field(&self, name: &str) -> Option<&Record> {
        self.body.iter().find(|r| r.name == name)
    }

    /// Sum of all body record sizes.
    pub fn body_size(&self) -> usize {
        self.body.iter().map(Record::size).sum()
    }

    /// Turns this message into a short `text/html` error reply.
    pub fn set_error(&mut self, status: StatusCode, message: impl Into<String>) {
        let message = message.into();
        self.set_status(status);
        self.set_content_type(response::ERROR_CONTENT_TYPE);
        self.set_body(response::error_page(status, &message));
        self.error = Some(message);
    }

    /// Error reply for a request the parser rejected after a valid request line.
    pub fn set_parse_error(&mut self, err: &ParseError) {
        self.set_error(err.status(), err.to_string());
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        match self.path.split_once('?') {
            Some((route, _)) => route,
            None => &self.path,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, q)| q)
    }

    /// Whether the peer asked for the connection to stay open.
    ///
    /// An explicit `Connection` header wins; otherwise HTTP/1.1 keeps alive.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self
                .version
                .map(|v| v.keeps_alive_by_default())
                .unwrap_or(false),
        }
    }
}
