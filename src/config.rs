//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Realtime endpoint advertised to registering devices
    #[serde(default)]
    pub public_url: Option<String>,

    /// Allowed CORS origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL devices should open their realtime session against
    pub fn ws_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("ws://localhost:{}/ws", self.port))
    }
}

/// Relay hub tuning
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// 0 disables eviction of unresponsive connections
    #[serde(default)]
    pub max_missed_probes: u32,
}

fn default_probe_interval() -> u64 {
    30
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
            max_missed_probes: 0,
        }
    }
}

impl HubSettings {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            // a zero period would make the probe ticker panic
            probe_interval: Duration::from_secs(self.probe_interval_secs.max(1)),
            max_missed_probes: self.max_missed_probes,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("relay-hub").join("config.toml")),
            Some(PathBuf::from("/etc/relay-hub/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparseable numbers are ignored
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = lookup("RELAY_HOST") {
            self.server.host = host;
        }
        // RELAY_PORT wins over PORT
        for key in ["PORT", "RELAY_PORT"] {
            if let Some(port) = lookup(key).and_then(|p| p.parse().ok()) {
                self.server.port = port;
            }
        }
        if let Some(url) = lookup("RELAY_PUBLIC_URL") {
            self.server.public_url = Some(url);
        }

        // Hub overrides
        if let Some(secs) = lookup("RELAY_PROBE_INTERVAL_SECS").and_then(|s| s.parse().ok()) {
            self.hub.probe_interval_secs = secs;
        }
        if let Some(max) = lookup("RELAY_MAX_MISSED_PROBES").and_then(|s| s.parse().ok()) {
            self.hub.max_missed_probes = max;
        }

        // Logging overrides
        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("RELAY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Relay Hub Configuration
#
# Environment variables override these settings:
# - PORT (or RELAY_PORT)
# - RELAY_HOST
# - RELAY_PUBLIC_URL
# - RELAY_PROBE_INTERVAL_SECS
# - RELAY_MAX_MISSED_PROBES
# - RELAY_LOG_LEVEL
# - RELAY_LOG_FORMAT

[server]
# Address to bind
host = "0.0.0.0"

# Port for both the REST control plane and the WebSocket endpoint
port = 8080

# Realtime endpoint handed to registering devices
# (default: ws://localhost:<port>/ws)
# public_url = "wss://relay.example.com/ws"

# Allowed CORS origins (empty = any)
cors_origins = []

[hub]
# Seconds between liveness probes
probe_interval_secs = 30

# Evict after this many unanswered probes (0 = never)
max_missed_probes = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
