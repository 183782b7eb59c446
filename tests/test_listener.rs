use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use vesper::config::{ConcurrencyModel, Config};
use vesper::handler::HandlerRegistry;
use vesper::server::access_log::AccessLog;
use vesper::server::listener::ListenerError;
use vesper::server::{Server, ServerContext, Shutdown};
use vesper::transport::PlainTransport;

fn loopback_config(model: ConcurrencyModel) -> Config {
    let mut config = Config::default();
    config.server.listen_addr = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.model = model;
    config.timeouts.shutdown_secs = 2;
    config
}

async fn get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

async fn serve_and_query(model: ConcurrencyModel) {
    let shutdown = Shutdown::new();
    let (log, mut rx) = AccessLog::channel();
    let ctx = Arc::new(
        ServerContext::new(loopback_config(model), HandlerRegistry::with_defaults())
            .with_access_log(log)
            .with_shutdown(shutdown.clone()),
    );

    let server = Server::bind(ctx, PlainTransport::new()).unwrap();
    let addr = server.local_addr().unwrap();
    assert_ne!(addr.port(), 0);
    let running = tokio::spawn(server.run());

    for path in ["/first", "/second"] {
        let reply = get(addr, path).await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{}", reply);
        assert!(reply.contains(&format!("GET {} HTTP/1.1\n", path)));
    }

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("server stops after shutdown")
        .unwrap()
        .unwrap();

    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"GET /first HTTP/1.1\" 200"));
}

#[tokio::test]
async fn test_concurrent_model_serves_and_stops() {
    serve_and_query(ConcurrencyModel::Concurrent).await;
}

#[tokio::test]
async fn test_single_model_serves_and_stops() {
    serve_and_query(ConcurrencyModel::Single).await;
}

#[tokio::test]
async fn test_shutdown_drains_idle_connection() {
    let shutdown = Shutdown::new();
    let mut config = loopback_config(ConcurrencyModel::Concurrent);
    config.timeouts.read_secs = 30;
    let ctx = Arc::new(
        ServerContext::new(config, HandlerRegistry::with_defaults())
            .with_access_log(AccessLog::channel().0)
            .with_shutdown(shutdown.clone()),
    );

    let server = Server::bind(ctx, PlainTransport::new()).unwrap();
    let addr = server.local_addr().unwrap();
    let running = tokio::spawn(server.run());

    // Keep-alive connection left idle after its first response.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).contains("Connection: keep-alive"));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("idle connection does not hold up shutdown")
        .unwrap()
        .unwrap();

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
}

#[tokio::test]
async fn test_bind_conflict() {
    let first = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = loopback_config(ConcurrencyModel::Concurrent);
    config.server.port = first.local_addr().unwrap().port();
    let ctx = Arc::new(ServerContext::new(config, HandlerRegistry::with_defaults()));

    let err = Server::bind(ctx, PlainTransport::new()).err().unwrap();
    assert!(matches!(err, ListenerError::Bind { .. }));
}
