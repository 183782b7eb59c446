//! Pluggable request handlers ("filters").
//!
//! Virtual hosts name a handler in their config; the connection resolves that
//! name through a [`HandlerRegistry`] and hands the parsed request plus an
//! empty response to [`Handler::handle`]. Handlers are synchronous and run on
//! tokio's blocking pool under a deadline.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::HostConfig;
use crate::http::message::Message;

pub mod echo;

pub use echo::EchoHandler;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait Handler: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Whether the host's content directory must exist and be writable.
    fn needs_filesystem(&self) -> bool {
        false
    }

    fn handle(
        &self,
        host: &HostConfig,
        request: &Message,
        response: &mut Message,
    ) -> Result<(), HandlerError>;
}

/// Name to handler table, shared read-only by every connection.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(EchoHandler);
        registry
    }

    /// Adds `handler` under its own name, replacing any previous entry.
    pub fn register<H: Handler>(&mut self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
