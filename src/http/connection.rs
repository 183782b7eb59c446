//! Per-connection state machine.
//!
//! Every request/response cycle walks the same stages in order:
//!
//! ```text
//! INIT → PRE → READ → PROC → WRITE → POST → LOG → END
//! ```
//!
//! `PRE` runs once per connection (the transport handshake). A read that
//! fails after a valid request line skips `PROC` and goes straight to `WRITE`
//! with an error reply; a read that fails before that skips `WRITE` as well.
//! `POST`, `LOG` and `END` always run, so each cycle produces exactly one
//! access log line.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, bail};
use bytes::{Bytes, BytesMut};
use tokio::time::timeout;

use crate::config::Config;
use crate::http::message::Message;
use crate::http::response::StatusCode;
use crate::http::writer::ResponseWriter;
use crate::server::access_log::AccessRecord;
use crate::server::context::ServerContext;
use crate::server::shutdown::ShutdownSignal;
use crate::transport::{Io, ReadLimits, Transport, TransportError};

/// Reply used when even the generated error page cannot be serialized.
const LAST_RESORT: &[u8] =
    b"HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/html\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Pre,
    Read,
    Proc,
    Write,
    Post,
    Log,
    End,
}

/// What READ handed on to the rest of the cycle.
enum ReadOutcome {
    Request(Message),
    /// A request line was parsed but the request is unusable; reply with
    /// the prepared error.
    Reject(Message),
    /// Nothing worth answering; close after logging.
    Drop,
    /// Keep-alive wait ended with no new request; not a cycle.
    Idle,
}

pub struct Connection<T: Transport> {
    ctx: Arc<ServerContext>,
    transport: Arc<T>,
    peer: SocketAddr,
    buffer: BytesMut,
    stage: Stage,
    error: Option<String>,
    count: usize,
    shutdown: ShutdownSignal,
}

impl<T: Transport> Connection<T> {
    pub fn new(ctx: Arc<ServerContext>, transport: Arc<T>, peer: SocketAddr) -> Self {
        let shutdown = ctx.shutdown.subscribe();
        Self {
            ctx,
            transport,
            peer,
            buffer: BytesMut::with_capacity(4096),
            stage: Stage::Init,
            error: None,
            count: 0,
            shutdown,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Number of cycles that started reading a request.
    pub fn cycles(&self) -> usize {
        self.count
    }

    /// Message of the most recent failure, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Drives `socket` until the peer leaves, keep-alive ends or shutdown.
    ///
    /// Errors are only returned when the connection is abandoned before the
    /// first cycle (no configuration, failed handshake).
    pub async fn run<S: Io>(&mut self, socket: S) -> anyhow::Result<()> {
        self.stage = Stage::Init;
        if self.ctx.config.hosts.is_empty() {
            self.stage = Stage::End;
            bail!("no virtual hosts configured");
        }

        self.stage = Stage::Pre;
        let read_timeout = self.ctx.config.timeouts.read();
        let handshake = timeout(read_timeout, self.transport.pre(socket)).await;
        let mut stream = match handshake {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.stage = Stage::End;
                self.error = Some(e.to_string());
                return Err(e).context(format!("{} handshake failed", self.transport.name()));
            }
            Err(_) => {
                self.stage = Stage::End;
                bail!("{} handshake timed out", self.transport.name());
            }
        };

        while self.cycle::<S>(&mut stream).await {}

        self.stage = Stage::End;
        Ok(())
    }

    /// One request/response cycle. Returns whether another should follow.
    async fn cycle<S: Io>(&mut self, stream: &mut T::Stream<S>) -> bool {
        let config = Arc::clone(&self.ctx.config);
        let first = self.count == 0;

        // INIT
        self.stage = Stage::Init;
        let mut response = Message::new();

        // READ
        self.stage = Stage::Read;
        let limits = ReadLimits {
            timeout: config.timeouts.read(),
            max_bytes: config.server.max_request_bytes,
        };
        let idle = !first && self.buffer.is_empty();
        let read = tokio::select! {
            result = self.transport.read::<S>(stream, &mut self.buffer, limits) => Some(result),
            _ = self.shutdown.recv(), if idle => None,
        };
        let outcome = match read {
            Some(result) => self.classify_read(result, idle),
            None => ReadOutcome::Idle,
        };

        let (request, keep_alive) = match outcome {
            ReadOutcome::Idle => {
                self.stage = Stage::End;
                return false;
            }
            ReadOutcome::Drop => {
                self.count += 1;
                return self.finish::<S>(stream, None, &response, 0, false).await;
            }
            ReadOutcome::Reject(reply) => {
                self.count += 1;
                response = reply;
                (None, false)
            }
            ReadOutcome::Request(request) => {
                self.count += 1;
                self.stage = Stage::Proc;
                tracing::debug!(
                    peer = %self.peer,
                    method = ?request.method,
                    path = %request.path,
                    "Request received"
                );
                let request = Arc::new(request);
                response = self.process(&config, Arc::clone(&request)).await;
                let keep_alive = request.keep_alive()
                    && self.count < config.server.max_requests_per_connection
                    && !self.shutdown.is_triggered();
                (Some(request), keep_alive)
            }
        };

        // WRITE
        self.stage = Stage::Write;
        let mut keep_alive = keep_alive;
        response.set_header("Connection", if keep_alive { "keep-alive" } else { "close" });
        let mut writer = match ResponseWriter::from_message(&response) {
            Ok(writer) => writer,
            Err(e) => {
                tracing::error!(peer = %self.peer, error = %e, "Response could not be serialized");
                keep_alive = false;
                response = self.error_reply(
                    StatusCode::InternalServerError,
                    format!("Response could not be serialized: {}.", e),
                );
                response.set_header("Connection", "close");
                ResponseWriter::from_message(&response)
                    .unwrap_or_else(|_| ResponseWriter::new(Bytes::from_static(LAST_RESORT)))
            }
        };

        if let Err(e) = self
            .transport
            .write::<S>(stream, &mut writer, config.timeouts.write())
            .await
        {
            tracing::debug!(peer = %self.peer, error = %e, "Write failed");
            self.error = Some(e.to_string());
            keep_alive = false;
        }

        let sent = writer.written();
        self.finish::<S>(stream, request.as_deref(), &response, sent, keep_alive)
            .await
    }

    fn classify_read(&mut self, result: Result<Message, TransportError>, idle: bool) -> ReadOutcome {
        let err = match result {
            Ok(request) => return ReadOutcome::Request(request),
            Err(err) => err,
        };

        // A keep-alive connection that goes quiet simply ends.
        if idle
            && self.buffer.is_empty()
            && matches!(err, TransportError::Timeout(_) | TransportError::Closed)
        {
            return ReadOutcome::Idle;
        }

        tracing::debug!(peer = %self.peer, error = %err, "Read failed");
        match err {
            TransportError::Timeout(after) => ReadOutcome::Reject(self.error_reply(
                StatusCode::RequestTimeout,
                format!("Request was not received within {} seconds.", after.as_secs()),
            )),
            TransportError::TooLarge { limit } => ReadOutcome::Reject(self.error_reply(
                StatusCode::PayloadTooLarge,
                format!("Request exceeds {} bytes.", limit),
            )),
            TransportError::Parse(e) if !e.rejects_request_line() => {
                let mut reply = Message::new();
                reply.set_parse_error(&e);
                self.error = Some(e.to_string());
                ReadOutcome::Reject(reply)
            }
            other => {
                self.error = Some(other.to_string());
                ReadOutcome::Drop
            }
        }
    }

    /// PROC: route the request to its host's handler and run it.
    async fn process(&mut self, config: &Config, request: Arc<Message>) -> Message {
        // The reply is written whatever happens from here on.
        self.stage = Stage::Write;

        let Some(host_name) = request.host.as_deref() else {
            return self.error_reply(StatusCode::BadRequest, "No host header specified.".to_string());
        };
        let Some(host) = config.find_host(host_name) else {
            return self.error_reply(
                StatusCode::NotFound,
                format!("Could not find host '{}'.", host_name),
            );
        };
        if host.filter.is_empty() {
            return self.error_reply(
                StatusCode::InternalServerError,
                format!("No filter specified for '{}'.", host.name),
            );
        }
        let Some(handler) = self.ctx.handlers.get(&host.filter) else {
            return self.error_reply(
                StatusCode::InternalServerError,
                format!("Filter '{}' not supported.", host.filter),
            );
        };
        let mut host = host.clone();
        if handler.needs_filesystem() {
            // The handler sees the directory that was actually checked.
            match host.resolve_dir(config.wwwroot.as_deref()) {
                Ok(dir) => host.dir = Some(dir),
                Err(e) => return self.error_reply(StatusCode::InternalServerError, e.to_string()),
            }
        }

        let filter = host.filter.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut response = Message::new();
            let result = handler.handle(&host, &request, &mut response);
            (response, result)
        });

        match timeout(config.timeouts.handler(), task).await {
            Ok(Ok((mut response, Ok(())))) => {
                response.error = None;
                response
            }
            Ok(Ok((mut response, Err(e)))) => {
                tracing::warn!(peer = %self.peer, filter = %filter, error = %e, "Handler failed");
                self.error = Some(e.to_string());
                if response.status.is_none() {
                    response.set_error(StatusCode::InternalServerError, e.to_string());
                }
                response
            }
            Ok(Err(e)) => {
                tracing::error!(peer = %self.peer, filter = %filter, error = %e, "Handler panicked");
                self.error_reply(
                    StatusCode::InternalServerError,
                    format!("Filter '{}' failed.", filter),
                )
            }
            Err(_) => {
                tracing::warn!(peer = %self.peer, filter = %filter, "Handler timed out");
                self.error_reply(
                    StatusCode::InternalServerError,
                    format!(
                        "Filter '{}' did not finish within {} seconds.",
                        filter,
                        config.timeouts.handler_secs
                    ),
                )
            }
        }
    }

    /// POST, LOG and END. Returns whether the connection stays open.
    async fn finish<S: Io>(
        &mut self,
        stream: &mut T::Stream<S>,
        request: Option<&Message>,
        response: &Message,
        sent: usize,
        keep_alive: bool,
    ) -> bool {
        self.stage = Stage::Post;
        let mut keep_alive = keep_alive;
        if let Err(e) = self.transport.post::<S>(stream, !keep_alive).await {
            tracing::debug!(peer = %self.peer, error = %e, "Transport teardown failed");
            keep_alive = false;
        }

        self.stage = Stage::Log;
        self.ctx
            .access_log
            .log(&AccessRecord::new(self.peer, request, response, sent));

        self.stage = Stage::End;
        keep_alive
    }

    fn error_reply(&mut self, status: StatusCode, message: String) -> Message {
        let mut reply = Message::new();
        reply.set_error(status, message.clone());
        self.error = Some(message);
        reply
    }
}
