//! rshcp configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via RSHCP_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller)

use rshcp_client::{Client, ConnectionConfig};
use rshcp_protocol::{DEFAULT_MAX_BYTES, DEFAULT_MAX_LINES, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// rshcp configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Request defaults.
    pub defaults: DefaultsConfig,
    /// Connection settings.
    pub connection: ConnectionSettings,
}

impl Config {
    /// Loads configuration from `path` (or RSHCP_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("RSHCP_CONFIG") {
                Ok(path) => Self::from_file(path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Renders the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<effective>"), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.defaults.apply_overrides(&var);
        self.connection.apply_overrides(&var);
    }

    /// Builds a client from the connection settings.
    pub fn client(&self) -> Client {
        Client::new()
            .with_rsh_config(self.connection.rsh())
            .with_rcp_config(self.connection.rcp())
    }
}

/// Values used when a request does not specify them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Daemon port.
    pub port: u16,
    /// Remote user when the destination has no `user@` part.
    pub user: Option<String>,
    /// Local user sent to the daemon; the process owner when unset.
    pub local_user: Option<String>,
    /// Line limit for command output (0 = built-in default).
    pub max_lines: usize,
    /// Byte limit for command output (0 = built-in default).
    pub max_bytes: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            user: None,
            local_user: None,
            max_lines: DEFAULT_MAX_LINES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl DefaultsConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("RSHCP_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(user) = var("RSHCP_USER") {
            self.user = Some(user);
        }
        if let Some(user) = var("RSHCP_LOCAL_USER") {
            self.local_user = Some(user);
        }
        if let Some(lines) = var("RSHCP_MAX_LINES").and_then(|v| v.parse().ok()) {
            self.max_lines = lines;
        }
        if let Some(bytes) = var("RSHCP_MAX_BYTES").and_then(|v| v.parse().ok()) {
            self.max_bytes = bytes;
        }
    }
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Connect timeout in seconds (unset = no timeout).
    pub connect_timeout_secs: Option<u64>,
    /// Read deadline in seconds after a privileged connect (0 = none).
    pub read_timeout_secs: u64,
    /// Bind a privileged source port for rsh.
    pub rsh_privileged: bool,
    /// Bind a privileged source port for rcp.
    pub rcp_privileged: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: None,
            read_timeout_secs: 30,
            rsh_privileged: true,
            rcp_privileged: false,
        }
    }
}

impl ConnectionSettings {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(secs) = var("RSHCP_CONNECT_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.connect_timeout_secs = Some(secs);
        }
        if let Some(secs) = var("RSHCP_READ_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.read_timeout_secs = secs;
        }
        if let Some(enabled) = var("RSHCP_RSH_PRIVILEGED") {
            self.rsh_privileged = parse_flag(&enabled);
        }
        if let Some(enabled) = var("RSHCP_RCP_PRIVILEGED") {
            self.rcp_privileged = parse_flag(&enabled);
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn read_deadline(&self) -> Option<Duration> {
        match self.read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Connection settings for rsh.
    pub fn rsh(&self) -> ConnectionConfig {
        self.build(self.rsh_privileged)
    }

    /// Connection settings for rcp.
    pub fn rcp(&self) -> ConnectionConfig {
        self.build(self.rcp_privileged)
    }

    fn build(&self, privileged: bool) -> ConnectionConfig {
        let mut config = if privileged {
            ConnectionConfig::privileged().with_read_deadline(self.read_deadline())
        } else {
            ConnectionConfig::plain()
        };
        if let Some(timeout) = self.connect_timeout() {
            config = config.with_connect_timeout(timeout);
        }
        config
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.to_lowercase() == "true"
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
