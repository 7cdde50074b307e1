//! Configuration management
//!
//! Values come from an optional JSON file, then environment overrides.

use crate::error::ConfigError;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Default location of the JSON config file, overridable with `CONFIG_PATH`.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP port to bind (server) or dial (client)
    #[serde(alias = "Port")]
    pub port: u16,
    /// Interface the server binds to
    pub host: String,
    /// How long a task submission waits for an idle worker, in milliseconds
    pub submit_timeout_ms: u64,
    /// Longest command line accepted from a client, in bytes
    pub max_line_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            submit_timeout_ms: 5000,
            max_line_length: 8192,
        }
    }
}

impl Config {
    /// Load `.env`, the JSON file at `CONFIG_PATH` (if present) and then
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env if present

        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Read a JSON config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply `PORT`, `HOST`, `SUBMIT_TIMEOUT_MS` and `MAX_LINE_LENGTH`.
    /// Values that fail to parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(host) = lookup("HOST").filter(|v| !v.trim().is_empty()) {
            self.host = host;
        }
        if let Some(ms) = lookup("SUBMIT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.submit_timeout_ms = ms;
        }
        if let Some(len) = lookup("MAX_LINE_LENGTH")
            .and_then(|v| v.parse().ok())
            .filter(|len: &usize| *len > 0)
        {
            self.max_line_length = len;
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address a client should dial. Wildcard hosts map to loopback.
    pub fn dial_addr(&self) -> String {
        match self.host.as_str() {
            "" | "0.0.0.0" | "::" => format!("127.0.0.1:{}", self.port),
            host => format!("{}:{}", host, self.port),
        }
    }
}
