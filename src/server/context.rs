use std::sync::Arc;

use crate::config::Config;
use crate::handler::HandlerRegistry;
use crate::server::access_log::AccessLog;
use crate::server::shutdown::Shutdown;

/// Everything a connection needs from the process, passed explicitly.
///
/// Built once at startup, wrapped in an `Arc` and shared read-only by the
/// accept loop and every connection.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub config: Arc<Config>,
    pub handlers: HandlerRegistry,
    pub access_log: AccessLog,
    pub shutdown: Shutdown,
}

impl ServerContext {
    pub fn new(config: Config, handlers: HandlerRegistry) -> Self {
        Self {
            config: Arc::new(config),
            handlers,
            access_log: AccessLog::tracing(),
            shutdown: Shutdown::new(),
        }
    }

    pub fn with_access_log(mut self, access_log: AccessLog) -> Self {
        self.access_log = access_log;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }
}
