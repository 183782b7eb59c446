//! TLS over the accepted socket, via `tokio-rustls`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::server::TlsStream;

use super::{Io, Transport, TransportError};

/// Encrypted transport. The handshake runs in `pre`; `post` sends
/// `close_notify` when the connection is about to close.
#[derive(Clone)]
pub struct TlsTransport {
    acceptor: TlsAcceptor,
}

impl TlsTransport {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        }
    }

    /// Builds a server config from a PEM certificate chain and private key.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, TransportError> {
        let mut cert_reader = BufReader::new(File::open(cert_path)?);
        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut cert_reader).collect::<Result<_, _>>()?;
        if certs.is_empty() {
            return Err(TransportError::Tls(format!(
                "no certificates found in {}",
                cert_path.display()
            )));
        }

        let mut key_reader = BufReader::new(File::open(key_path)?);
        let key = rustls_pemfile::private_key(&mut key_reader)?.ok_or_else(|| {
            TransportError::Tls(format!("no private key found in {}", key_path.display()))
        })?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        Ok(Self::new(config))
    }
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport").finish_non_exhaustive()
    }
}

impl Transport for TlsTransport {
    type Stream<S: Io> = TlsStream<S>;

    fn name(&self) -> &'static str {
        "tls"
    }

    async fn pre<S: Io>(&self, socket: S) -> Result<TlsStream<S>, TransportError> {
        self.acceptor
            .accept(socket)
            .await
            .map_err(|e| TransportError::Tls(e.to_string()))
    }

    async fn post<S: Io>(
        &self,
        stream: &mut TlsStream<S>,
        closing: bool,
    ) -> Result<(), TransportError> {
        if closing {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
