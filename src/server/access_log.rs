//! Access log in Common Log Format.
//!
//! Connections never touch the log file. They push finished lines into an
//! unbounded channel and a single writer task appends them, so logging never
//! suspends a connection and lines from concurrent connections never
//! interleave. Without a file, lines become `tracing` events with target
//! `access`.

use std::net::SocketAddr;
use std::path::Path;

use chrono::{DateTime, Local};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::http::message::Message;

/// One finished request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub peer: SocketAddr,
    pub time: DateTime<Local>,
    /// `METHOD path PROTO`, absent when no request line was parsed.
    pub request_line: Option<String>,
    pub status: Option<u16>,
    pub bytes_sent: usize,
}

impl AccessRecord {
    pub fn new(peer: SocketAddr, request: Option<&Message>, response: &Message, bytes_sent: usize) -> Self {
        let request_line = request.and_then(|r| {
            let method = r.method?;
            let version = r.version?;
            Some(format!("{} {} {}", method, r.path, version))
        });
        Self {
            peer,
            time: Local::now(),
            request_line,
            status: response.status.map(|s| s.as_u16()),
            bytes_sent,
        }
    }

    pub fn to_clf(&self) -> String {
        let status = self
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} - - {} \"{}\" {} {}",
            self.peer.ip(),
            self.time.format("[%d/%b/%Y:%H:%M:%S %z]"),
            self.request_line.as_deref().unwrap_or("-"),
            status,
            self.bytes_sent,
        )
    }
}

/// Cloneable handle connections log through.
#[derive(Debug, Clone, Default)]
pub struct AccessLog {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl AccessLog {
    /// Emits each line as a `tracing` event.
    pub fn tracing() -> Self {
        Self { tx: None }
    }

    /// Hands lines to the returned receiver instead of a file.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Appends to `path` from a dedicated writer task.
    pub async fn to_file(path: &Path) -> std::io::Result<(Self, AccessLogWriter)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let (log, mut rx) = Self::channel();

        let handle = tokio::spawn(async move {
            let mut out = BufWriter::new(file);
            while let Some(line) = rx.recv().await {
                out.write_all(line.as_bytes()).await?;
                out.write_all(b"\n").await?;
                out.flush().await?;
            }
            out.flush().await
        });

        Ok((log, AccessLogWriter { handle }))
    }

    pub fn log(&self, record: &AccessRecord) {
        let line = record.to_clf();
        match &self.tx {
            Some(tx) => {
                if tx.send(line).is_err() {
                    tracing::warn!("access log writer has stopped");
                }
            }
            None => tracing::info!(target: "access", "{}", line),
        }
    }
}

/// The writer task behind [`AccessLog::to_file`].
#[derive(Debug)]
pub struct AccessLogWriter {
    handle: JoinHandle<std::io::Result<()>>,
}

impl AccessLogWriter {
    /// Waits for every queued line to be written.
    ///
    /// The task only ends once all [`AccessLog`] handles are dropped.
    pub async fn finish(self) -> std::io::Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        }
    }
}
