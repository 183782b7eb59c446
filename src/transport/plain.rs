use super::{Io, Transport, TransportError};

/// Raw stream sockets. Every hook besides read/write is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTransport;

impl PlainTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for PlainTransport {
    type Stream<S: Io> = S;

    fn name(&self) -> &'static str {
        "plain"
    }

    async fn pre<S: Io>(&self, socket: S) -> Result<S, TransportError> {
        Ok(socket)
    }

    async fn post<S: Io>(&self, _stream: &mut S, _closing: bool) -> Result<(), TransportError> {
        Ok(())
    }
}
