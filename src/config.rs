//! Server configuration.
//!
//! Loaded from YAML with every field defaulted, so a file only has to list
//! what it changes. Command-line flags are applied on top (see `cli`).

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::unistd::{AccessFlags, access};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::parser::split_authority;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

/// A host's content directory cannot be used.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory for host '{host}' does not exist.")]
    Missing { host: String },

    #[error("Directory for host '{host}' not accessible: {source}.")]
    Inaccessible {
        host: String,
        source: std::io::Error,
    },

    #[error("Directory for host '{host}' not writeable: {source}.")]
    NotWritable {
        host: String,
        source: nix::errno::Errno,
    },
}

/// How accepted connections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyModel {
    /// The accept loop runs each connection to completion itself.
    Single,
    /// One task per connection.
    #[default]
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub timeouts: TimeoutConfig,
    pub tls: Option<TlsConfig>,
    /// Fallback parent for relative host directories.
    pub wwwroot: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub hosts: Vec<HostConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            timeouts: TimeoutConfig::default(),
            tls: None,
            wwwroot: None,
            logging: LoggingConfig::default(),
            hosts: default_hosts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
    pub backlog: u32,
    pub model: ConcurrencyModel,
    pub max_requests_per_connection: usize,
    pub max_request_bytes: usize,
    /// Serve over TLS using the `tls` section.
    pub use_tls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            port: 2000,
            backlog: 1024,
            model: ConcurrencyModel::default(),
            max_requests_per_connection: 5,
            max_request_bytes: 8 * 1024 * 1024,
            use_tls: false,
        }
    }
}

/// Deadlines, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub read_secs: u64,
    pub write_secs: u64,
    pub handler_secs: u64,
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 5,
            write_secs: 5,
            handler_secs: 30,
            shutdown_secs: 10,
        }
    }
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn handler(&self) -> Duration {
        Duration::from_secs(self.handler_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_file: Option<PathBuf>,
    pub access_file: Option<PathBuf>,
}

/// One virtual host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Name of the handler serving this host.
    pub filter: String,
}

impl HostConfig {
    pub fn new(name: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            dir: None,
            filter: filter.into(),
        }
    }

    /// Whether `host` (already stripped of any port) names this host.
    pub fn matches(&self, host: &str) -> bool {
        self.name.eq_ignore_ascii_case(host)
            || self
                .alias
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(host))
    }

    /// Finds the content directory and checks it is writable.
    ///
    /// A `dir` that does not exist as given is retried under `wwwroot`.
    pub fn resolve_dir(&self, wwwroot: Option<&Path>) -> Result<PathBuf, DirectoryError> {
        let dir = self.dir.as_ref().ok_or_else(|| DirectoryError::Missing {
            host: self.name.clone(),
        })?;

        let dir = match std::fs::metadata(dir) {
            Ok(_) => dir.clone(),
            Err(err) => {
                let Some(root) = wwwroot else {
                    return Err(DirectoryError::Inaccessible {
                        host: self.name.clone(),
                        source: err,
                    });
                };
                let joined = root.join(dir);
                std::fs::metadata(&joined).map_err(|source| DirectoryError::Inaccessible {
                    host: self.name.clone(),
                    source,
                })?;
                joined
            }
        };

        access(dir.as_path(), AccessFlags::W_OK).map_err(|source| DirectoryError::NotWritable {
            host: self.name.clone(),
            source,
        })?;

        Ok(dir)
    }
}

fn default_hosts() -> Vec<HostConfig> {
    vec![HostConfig {
        name: "localhost".to_string(),
        alias: Some("127.0.0.1".to_string()),
        dir: None,
        filter: "echo".to_string(),
    }]
}

impl Config {
    /// Defaults, with the `LISTEN` environment variable (`addr` or
    /// `addr:port`) overriding the listen address.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Ok(listen) = std::env::var("LISTEN") {
            config.apply_listen(&listen);
        }
        config
    }

    /// Reads and validates a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        if let Ok(listen) = std::env::var("LISTEN") {
            config.apply_listen(&listen);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_listen(&mut self, listen: &str) {
        match listen.parse::<SocketAddr>() {
            Ok(addr) => {
                self.server.listen_addr = addr.ip().to_string();
                self.server.port = addr.port();
            }
            Err(_) => self.server.listen_addr = listen.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.hosts.is_empty() {
            errors.push("no hosts configured".to_string());
        }
        for (i, host) in self.hosts.iter().enumerate() {
            if host.name.is_empty() {
                errors.push(format!("host #{} has an empty name", i));
            }
            if host.filter.is_empty() {
                errors.push(format!("host '{}' has no filter", host.name));
            }
            if self.hosts[..i]
                .iter()
                .any(|h| h.name.eq_ignore_ascii_case(&host.name))
            {
                errors.push(format!("duplicate host '{}'", host.name));
            }
        }
        if self.server.backlog == 0 {
            errors.push("server.backlog must be greater than 0".to_string());
        }
        if self.server.max_requests_per_connection == 0 {
            errors.push("server.max_requests_per_connection must be greater than 0".to_string());
        }
        if self.server.max_request_bytes == 0 {
            errors.push("server.max_request_bytes must be greater than 0".to_string());
        }
        if self.timeouts.read_secs == 0 || self.timeouts.write_secs == 0 {
            errors.push("read and write timeouts must be greater than 0".to_string());
        }
        if self.server.use_tls && self.tls.is_none() {
            errors.push("server.use_tls is set but there is no tls section".to_string());
        }
        if let Some(tls) = &self.tls {
            for path in [&tls.cert_path, &tls.key_path] {
                if !path.is_file() {
                    errors.push(format!("tls file {} not found", path.display()));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Virtual host for a `Host` header value, with any `:port` ignored.
    ///
    /// A bracketed IPv6 literal also matches a host configured without the
    /// brackets.
    pub fn find_host(&self, host: &str) -> Option<&HostConfig> {
        let (host, _) = split_authority(host);
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        self.hosts
            .iter()
            .find(|h| h.matches(host) || h.matches(bare))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        (self.server.listen_addr.as_str(), self.server.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ConfigError::Validation(vec![format!(
                    "cannot resolve {}:{}",
                    self.server.listen_addr, self.server.port
                )])
            })
    }
}
