//! Process-level pieces: the accept loop, shared context, access log,
//! shutdown coordination and process controls.

pub mod access_log;
pub mod context;
pub mod listener;
pub mod process;
pub mod shutdown;

pub use context::ServerContext;
pub use listener::Server;
pub use shutdown::Shutdown;
