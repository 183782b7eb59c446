use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{ConcurrencyModel, ConfigError};
use crate::http::connection::Connection;
use crate::server::context::ServerContext;
use crate::transport::Transport;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to resolve listen address: {0}")]
    Resolve(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// The accept loop plus the shared state every connection borrows.
pub struct Server<T: Transport> {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    transport: Arc<T>,
}

impl<T: Transport> Server<T> {
    /// Binds the configured address with `SO_REUSEADDR` and the configured
    /// backlog. Must be called from within a tokio runtime.
    pub fn bind(ctx: Arc<ServerContext>, transport: T) -> Result<Self, ListenerError> {
        let addr = ctx.config.socket_addr()?;
        let bind = |addr: SocketAddr| -> std::io::Result<TcpListener> {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_reuseaddr(true)?;
            socket.bind(addr)?;
            socket.listen(ctx.config.server.backlog)
        };
        let listener = bind(addr).map_err(|source| ListenerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            ctx,
            transport: Arc::new(transport),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts until shutdown is triggered, then drains in-flight
    /// connections for up to the configured grace period.
    pub async fn run(self) -> anyhow::Result<()> {
        let model = self.ctx.config.server.model;
        let mut shutdown = self.ctx.shutdown.subscribe();
        let mut tasks = JoinSet::new();

        info!(
            address = %self.local_addr()?,
            transport = self.transport.name(),
            model = ?model,
            "Listening"
        );

        loop {
            let accepted = tokio::select! {
                result = self.listener.accept() => result,
                _ = shutdown.recv() => break,
            };

            let (socket, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    // Usually EMFILE/ENFILE, which stays ready until a descriptor frees up.
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            debug!(peer = %peer, "Accepted connection");

            let mut conn = Connection::new(Arc::clone(&self.ctx), Arc::clone(&self.transport), peer);
            match model {
                ConcurrencyModel::Single => {
                    if let Err(e) = conn.run(socket).await {
                        debug!(peer = %peer, error = %e, "Connection aborted");
                    }
                }
                ConcurrencyModel::Concurrent => {
                    tasks.spawn(async move {
                        if let Err(e) = conn.run(socket).await {
                            debug!(peer = %peer, error = %e, "Connection aborted");
                        }
                    });
                }
            }

            while let Some(result) = tasks.try_join_next() {
                report(result);
            }
        }

        info!(in_flight = tasks.len(), "Shutting down listener");
        drop(self.listener);

        let grace = self.ctx.config.timeouts.shutdown();
        let drained = timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                report(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = tasks.len(), "Aborting connections after grace period");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        Ok(())
    }
}

fn report(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}
