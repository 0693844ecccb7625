//! Server configuration.
//!
//! `sockserver` can load a TOML file; command-line flags override it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Settings for a [`Server`](crate::server::Server) instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen: String,
    /// Outbound connect timeout in seconds.
    pub connect_timeout: u64,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Emit JSON-formatted logs.
    pub json_log: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: "0.0.0.0:1080".to_string(),
            connect_timeout: 10,
            log_level: "info".to_string(),
            json_log: false,
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("cannot read config file: {:?}", path.as_ref()))?;
    parse_config(&content)
}

/// Parse configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<ServerConfig> {
    toml::from_str(content).context("cannot parse configuration")
}
