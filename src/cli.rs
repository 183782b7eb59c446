use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::config::{ConcurrencyModel, Config, ConfigError};

#[derive(Debug, Parser)]
#[command(name = "vesper")]
#[command(version, about = "HTTP/1.x server with virtual hosts and pluggable filters", long_about = None)]
#[command(group(ArgGroup::new("action").required(true).args(["start", "kill", "dump"])))]
pub struct Cli {
    /// Start the server
    #[arg(long)]
    pub start: bool,

    /// Stop the server named in the PID file
    #[arg(long)]
    pub kill: bool,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub dump: bool,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(long, value_name = "FILE", default_value = "/tmp/vesper.pid")]
    pub pidfile: PathBuf,

    /// Run as this user after binding
    #[arg(short, long)]
    pub user: Option<String>,

    /// Run as this group after binding
    #[arg(short, long)]
    pub group: Option<String>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Append the access log to this file
    #[arg(long, value_name = "FILE")]
    pub access_log: Option<PathBuf>,

    /// Concurrency model
    #[arg(long, value_enum)]
    pub model: Option<ConcurrencyModel>,

    /// Serve over TLS (needs a `tls` section in the config)
    #[arg(long)]
    pub use_tls: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Kill,
    Dump,
}

impl Cli {
    pub fn action(&self) -> Action {
        if self.kill {
            Action::Kill
        } else if self.dump {
            Action::Dump
        } else {
            Action::Start
        }
    }

    /// Loads the config file (or defaults), applies the flags and validates.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::load(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Flags override whatever the config says.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(model) = self.model {
            config.server.model = model;
        }
        if self.use_tls {
            config.server.use_tls = true;
        }
        if let Some(log) = &self.log {
            config.logging.log_file = Some(log.clone());
        }
        if let Some(access_log) = &self.access_log {
            config.logging.access_file = Some(access_log.clone());
        }
    }
}
