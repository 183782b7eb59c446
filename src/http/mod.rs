//! HTTP/1.x wire protocol.
//!
//! # Architecture
//!
//! - **`message`**: the request/response entity and its records
//! - **`parser`**: incremental request framing, plus a response parser
//! - **`request`**: methods, protocol versions, body kinds
//! - **`response`**: status codes and generated error pages
//! - **`writer`**: response serialization and the write cursor
//! - **`connection`**: the per-connection state machine
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │  INIT, PRE  │ ← bind entities, transport handshake
//!        └──────┬──────┘
//!               ▼
//!        ┌─────────────┐
//!        │    READ     │ ← read and frame one request ──┐ read failed
//!        └──────┬──────┘                                │
//!               ▼                                       │
//!        ┌─────────────┐                                │
//!        │    PROC     │ ← route to host, run handler   │
//!        └──────┬──────┘                                │
//!               ▼                                       │
//!        ┌─────────────┐                                │
//!        │    WRITE    │ ← serialize and send ◀─────────┤ error reply
//!        └──────┬──────┘                                │
//!               ▼                                       │
//!        ┌────────────────┐                             │
//!        │ POST, LOG, END │ ◀───────────────────────────┘ no reply
//!        └──────┬─────────┘
//!               ├─ Keep-Alive → READ (same connection)
//!               └─ Close
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vesper::config::Config;
//! use vesper::handler::HandlerRegistry;
//! use vesper::http::connection::Connection;
//! use vesper::server::ServerContext;
//! use vesper::transport::PlainTransport;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = Arc::new(ServerContext::new(Config::load(), HandlerRegistry::with_defaults()));
//!     let transport = Arc::new(PlainTransport::new());
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!
//!     loop {
//!         let (socket, peer) = listener.accept().await?;
//!         let mut conn = Connection::new(ctx.clone(), transport.clone(), peer);
//!         tokio::spawn(async move {
//!             if let Err(e) = conn.run(socket).await {
//!                 eprintln!("Connection error: {}", e);
//!             }
//!         });
//!     }
//! }
//! ```

pub mod connection;
pub mod message;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
