//! Byte transports the connection state machine runs over.
//!
//! A [`Transport`] is built once (its constructor plays the role of `init`,
//! `Drop` the role of `free`) and shared by every connection. Per connection
//! it wraps the accepted socket in [`Transport::pre`], moves bytes with
//! [`Transport::read`] / [`Transport::write`] and tidies up in
//! [`Transport::post`].
//!
//! Reads and writes are bounded by wall-clock deadlines rather than retry
//! counts: a read that has not produced a complete request before its
//! deadline fails with [`TransportError::Timeout`], and so does a write that
//! cannot flush the response in time.

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};

use crate::http::message::Message;
use crate::http::parser::{ParseError, frame_request};
use crate::http::writer::ResponseWriter;

pub mod plain;
pub mod tls;

pub use plain::PlainTransport;
pub use tls::TlsTransport;

/// Bytes requested from the socket per read call.
const READ_CHUNK: usize = 4096;

/// Anything a transport can run over: TCP sockets, duplex pipes in tests.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("deadline of {0:?} elapsed")]
    Timeout(Duration),

    #[error("peer closed the connection")]
    Closed,

    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("tls: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bounds applied to a single request read.
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    pub timeout: Duration,
    pub max_bytes: usize,
}

pub trait Transport: Send + Sync + 'static {
    /// The per-connection stream produced by [`Transport::pre`].
    type Stream<S: Io>: Io;

    fn name(&self) -> &'static str;

    /// Opens a cycle on a freshly accepted socket (e.g. the TLS handshake).
    fn pre<S: Io>(
        &self,
        socket: S,
    ) -> impl Future<Output = Result<Self::Stream<S>, TransportError>> + Send;

    /// Reads until `buf` holds a complete request or something goes wrong.
    fn read<S: Io>(
        &self,
        stream: &mut Self::Stream<S>,
        buf: &mut BytesMut,
        limits: ReadLimits,
    ) -> impl Future<Output = Result<Message, TransportError>> + Send {
        read_message(stream, buf, limits)
    }

    /// Flushes the whole serialized response.
    fn write<S: Io>(
        &self,
        stream: &mut Self::Stream<S>,
        writer: &mut ResponseWriter,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        write_message(stream, writer, timeout)
    }

    /// Closes a cycle. `closing` is set when no further cycle will follow.
    fn post<S: Io>(
        &self,
        stream: &mut Self::Stream<S>,
        closing: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Reads from `stream` into `buf` and frames one request.
///
/// Bytes already in `buf` (left over from a previous cycle) are parsed before
/// touching the socket. Only "awaiting header/body" keeps the loop going;
/// every other parse outcome is returned straight away.
pub async fn read_message<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    limits: ReadLimits,
) -> Result<Message, TransportError>
where
    S: AsyncRead + Unpin + Send,
{
    let deadline = Instant::now() + limits.timeout;

    loop {
        if !buf.is_empty() {
            match frame_request(buf) {
                Ok(message) => return Ok(message),
                Err(ParseError::AwaitingBody { expected, received }) => {
                    let header_len = buf.len() - received;
                    if header_len.saturating_add(expected) > limits.max_bytes {
                        return Err(TransportError::TooLarge {
                            limit: limits.max_bytes,
                        });
                    }
                }
                Err(ParseError::AwaitingHeader) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if buf.len() >= limits.max_bytes {
            return Err(TransportError::TooLarge {
                limit: limits.max_bytes,
            });
        }

        buf.reserve(READ_CHUNK);
        let n = match timeout_at(deadline, stream.read_buf(buf)).await {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::Timeout(limits.timeout)),
        };

        if n == 0 {
            return Err(TransportError::Closed);
        }
    }
}

/// Writes everything left in `writer`, advancing its cursor as bytes go out.
pub async fn write_message<S>(
    stream: &mut S,
    writer: &mut ResponseWriter,
    timeout: Duration,
) -> Result<(), TransportError>
where
    S: AsyncWrite + Unpin + Send,
{
    let deadline = Instant::now() + timeout;

    while !writer.is_done() {
        let n = match timeout_at(deadline, stream.write(writer.pending())).await {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::Timeout(timeout)),
        };

        if n == 0 {
            return Err(TransportError::Closed);
        }

        writer.advance(n);
    }

    match timeout_at(deadline, stream.flush()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}
