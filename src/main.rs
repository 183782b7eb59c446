use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

use vesper::cli::{Action, Cli};
use vesper::config::Config;
use vesper::handler::HandlerRegistry;
use vesper::server::access_log::AccessLog;
use vesper::server::{Server, ServerContext, Shutdown, process};
use vesper::transport::{PlainTransport, TlsTransport, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.action() == Action::Kill {
        init_tracing(None)?;
        let pid = process::kill_from_pid_file(&cli.pidfile)?;
        tracing::info!(pid, "Sent SIGTERM");
        return Ok(());
    }

    let config = cli.load_config()?;
    init_tracing(config.logging.log_file.as_deref())?;

    match cli.action() {
        Action::Dump => dump(&config),
        _ => start(&cli, config).await,
    }
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vesper=info,access=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

fn dump(config: &Config) -> anyhow::Result<()> {
    let handlers = HandlerRegistry::with_defaults();
    print!("{}", serde_yaml::to_string(config)?);
    println!("# filters: {}", handlers.names().join(", "));
    Ok(())
}

async fn start(cli: &Cli, config: Config) -> anyhow::Result<()> {
    let shutdown = Shutdown::new();
    let grace = config.timeouts.shutdown();

    let (access_log, writer) = match &config.logging.access_file {
        Some(path) => {
            let (log, writer) = AccessLog::to_file(path)
                .await
                .with_context(|| format!("opening access log {}", path.display()))?;
            (log, Some(writer))
        }
        None => (AccessLog::tracing(), None),
    };

    let tls = if config.server.use_tls {
        config.tls.clone()
    } else {
        None
    };

    let ctx = Arc::new(
        ServerContext::new(config, HandlerRegistry::with_defaults())
            .with_access_log(access_log)
            .with_shutdown(shutdown.clone()),
    );
    for host in &ctx.config.hosts {
        if !ctx.handlers.contains(&host.filter) {
            tracing::warn!(host = %host.name, filter = %host.filter, "Filter is not registered");
        }
    }

    let signals = tokio::spawn(wait_for_signal(shutdown));

    let result = match tls {
        Some(tls) => {
            let transport = TlsTransport::from_pem_files(&tls.cert_path, &tls.key_path)
                .context("loading TLS certificate")?;
            serve(cli, Arc::clone(&ctx), transport).await
        }
        None => serve(cli, Arc::clone(&ctx), PlainTransport::new()).await,
    };

    signals.abort();
    drop(ctx);

    if let Some(writer) = writer {
        match tokio::time::timeout(grace, writer.finish()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Access log writer failed"),
            Err(_) => tracing::warn!("Access log writer did not finish in time"),
        }
    }

    tracing::info!("Server stopped");
    result
}

async fn serve<T: Transport>(cli: &Cli, ctx: Arc<ServerContext>, transport: T) -> anyhow::Result<()> {
    let server = Server::bind(ctx, transport)?;

    process::write_pid_file(&cli.pidfile)?;
    if cli.user.is_some() || cli.group.is_some() {
        process::drop_privileges(cli.user.as_deref(), cli.group.as_deref())?;
    }

    let result = server.run().await;

    if let Err(e) = process::remove_pid_file(&cli.pidfile) {
        tracing::warn!(error = %e, "Could not remove pid file");
    }
    result
}

async fn wait_for_signal(shutdown: Shutdown) {
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupt received"),
                _ = term.recv() => tracing::info!("Terminate signal received"),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Interrupt received");
        }
    }
    shutdown.trigger();
}
