//! Vesper - HTTP/1.x server with virtual hosts and pluggable handlers
//!
//! Core library: wire protocol, transports, connection lifecycle and the
//! accept loop.

pub mod cli;
pub mod config;
pub mod handler;
pub mod http;
pub mod server;
pub mod transport;
