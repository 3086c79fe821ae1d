//! Configuration management
//!
//! Handles loading and validating relay configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Port mappings, started in order
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

/// Runtime configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Number of worker threads (0 = auto)
    #[serde(default)]
    pub workers: usize,
}

impl ServerConfig {
    /// Get effective worker count (auto-detect if 0)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Statistics API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address of the `/stats` HTTP endpoint
    #[serde(default = "default_api_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_api_addr(),
        }
    }
}

/// Relay behaviour shared by all mappings
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// How long a UDP exchange waits for its reply (0 = forever)
    #[serde(default = "default_udp_reply_timeout")]
    pub udp_reply_timeout_secs: u64,
}

impl RelayConfig {
    pub fn udp_reply_timeout(&self) -> Option<Duration> {
        match self.udp_reply_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            udp_reply_timeout_secs: default_udp_reply_timeout(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Transport of a mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// One `from -> to` forwarding rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Mapping {
    /// Listen address, `host:port` or `:port`
    pub from: String,
    /// Target address, `host:port`
    pub to: String,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Mapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            protocol,
        }
    }

    pub fn tcp(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, Protocol::Tcp)
    }

    pub fn udp(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, Protocol::Udp)
    }

    /// Listen address with a bare `:port` expanded to all IPv4 interfaces
    pub fn listen_addr(&self) -> String {
        if self.from.starts_with(':') {
            format!("0.0.0.0{}", self.from)
        } else {
            self.from.clone()
        }
    }
}

// Default value functions
fn default_api_addr() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 8000)) }
fn default_udp_reply_timeout() -> u64 { 5 }
fn default_metrics_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 9090)) }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        for (idx, mapping) in self.mappings.iter().enumerate() {
            if mapping.from.trim().is_empty() {
                anyhow::bail!("mappings[{}]: from must not be empty", idx);
            }
            if mapping.to.trim().is_empty() {
                anyhow::bail!("mappings[{}]: to must not be empty", idx);
            }
        }
        Ok(())
    }
}
