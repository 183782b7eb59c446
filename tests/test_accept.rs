//! Runs alone in its own binary: it lowers the process descriptor limit.

use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use nix::sys::resource::{Resource, getrlimit, setrlimit};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use vesper::config::Config;
use vesper::handler::HandlerRegistry;
use vesper::server::access_log::AccessLog;
use vesper::server::{Server, ServerContext, Shutdown};
use vesper::transport::PlainTransport;

/// Counts warnings raised by the accept loop.
struct AcceptWarnings(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for AcceptWarnings {
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::WARN && meta.target() == "vesper::server::listener" {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Lowest descriptor number the next `open` would hand out.
fn next_fd() -> u64 {
    let null = std::fs::File::open("/dev/null").unwrap();
    null.as_raw_fd() as u64
}

#[tokio::test]
async fn test_accept_errors_back_off_and_recover() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::registry().with(AcceptWarnings(Arc::clone(&warnings))),
    );

    let mut config = Config::default();
    config.server.listen_addr = "127.0.0.1".to_string();
    config.server.port = 0;
    config.timeouts.shutdown_secs = 2;

    let shutdown = Shutdown::new();
    let (log, mut rx) = AccessLog::channel();
    let ctx = Arc::new(
        ServerContext::new(config, HandlerRegistry::with_defaults())
            .with_access_log(log)
            .with_shutdown(shutdown.clone()),
    );
    let server = Server::bind(ctx, PlainTransport::new()).unwrap();
    let addr = server.local_addr().unwrap();

    // Queued in the backlog before the server can take them.
    let mut clients = Vec::new();
    for i in 0..3 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET /queued/{} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", i);
        stream.write_all(request.as_bytes()).await.unwrap();
        clients.push(stream);
    }

    let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE).unwrap();
    setrlimit(Resource::RLIMIT_NOFILE, next_fd(), hard).unwrap();

    let running = tokio::spawn(server.run());
    tokio::time::sleep(Duration::from_millis(550)).await;
    setrlimit(Resource::RLIMIT_NOFILE, soft, hard).unwrap();

    let failed = warnings.load(Ordering::SeqCst);
    assert!(failed >= 1, "accept never failed");
    assert!(failed <= 10, "accept retried {} times without pausing", failed);

    for (i, mut stream) in clients.into_iter().enumerate() {
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
            .await
            .expect("queued connection is served once descriptors free up")
            .unwrap();
        let reply = String::from_utf8(out).unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{}", reply);
        assert!(reply.contains(&format!("GET /queued/{} HTTP/1.1\n", i)));
    }

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("server stops after shutdown")
        .unwrap()
        .unwrap();

    let mut lines = 0;
    while rx.try_recv().is_ok() {
        lines += 1;
    }
    assert_eq!(lines, 3);
}
