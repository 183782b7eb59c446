use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::http::message::Message;

const HTTP_VERSION: &str = "HTTP/1.1";

/// A response that cannot be put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerializeError {
    #[error("response has no status")]
    MissingStatus,
    #[error("response has no content type")]
    MissingContentType,
    #[error("response has no body record")]
    MissingBody,
}

/// Serializes a response message.
///
/// Status, content type and at least one body record are required; a body
/// record may be empty. `Content-Type` and `Content-Length` are always
/// written from the message fields, so same-named entries in
/// `response.headers` are skipped.
pub fn finalize_response(response: &Message) -> Result<Bytes, SerializeError> {
    let status = response.status.ok_or(SerializeError::MissingStatus)?;
    let content_type = response
        .content_type
        .as_deref()
        .ok_or(SerializeError::MissingContentType)?;
    if response.body.is_empty() {
        return Err(SerializeError::MissingBody);
    }
    let body_len = response.body_size();

    let mut buf = BytesMut::with_capacity(128 + body_len);

    // Status line
    buf.put_slice(
        format!(
            "{} {} {}\r\n",
            HTTP_VERSION,
            status.as_u16(),
            status.reason_phrase()
        )
        .as_bytes(),
    );
    buf.put_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
    buf.put_slice(format!("Content-Length: {}\r\n", body_len).as_bytes());

    // Headers
    for header in &response.headers {
        if header.name.eq_ignore_ascii_case("Content-Type")
            || header.name.eq_ignore_ascii_case("Content-Length")
        {
            continue;
        }
        buf.put_slice(header.name.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(&header.value);
        buf.put_slice(b"\r\n");
    }

    // Header/body separator
    buf.put_slice(b"\r\n");

    // Body
    for record in &response.body {
        buf.put_slice(&record.value);
    }

    Ok(buf.freeze())
}

/// A serialized response plus how much of it has reached the peer.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    buffer: Bytes,
    written: usize,
}

impl ResponseWriter {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer, written: 0 }
    }

    pub fn from_message(response: &Message) -> Result<Self, SerializeError> {
        finalize_response(response).map(Self::new)
    }

    /// Bytes not yet written.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.written..]
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.written
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_done(&self) -> bool {
        self.written >= self.buffer.len()
    }

    /// Moves the cursor forward after a successful write of `n` bytes.
    pub fn advance(&mut self, n: usize) {
        self.written = (self.written + n).min(self.buffer.len());
    }
}

