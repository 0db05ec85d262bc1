//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Authentication configuration
///
/// Each token family has its own signing secret and lifetime. The
/// secrets ship with non-empty development defaults and are expected to
/// be overridden in production via PASSAGE_ACCESS_SECRET and
/// PASSAGE_REFRESH_SECRET.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_access_secret")]
    pub access_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl: String,
    #[serde(default = "default_refresh_secret")]
    pub refresh_secret: String,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl: String,
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: default_access_secret(),
            access_ttl: default_access_ttl(),
            refresh_secret: default_refresh_secret(),
            refresh_ttl: default_refresh_ttl(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: "pretty".to_string(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8700
}

fn default_db_path() -> String {
    "./data/passage.db".to_string()
}

fn default_access_secret() -> String {
    "dev-access-secret-change-me".to_string()
}

fn default_access_ttl() -> String {
    "15m".to_string()
}

fn default_refresh_secret() -> String {
    "dev-refresh-secret-change-me".to_string()
}

fn default_refresh_ttl() -> String {
    "7d".to_string()
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file, then apply environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {}", path))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?;

            info!("Loaded configuration from {}", path);
            config
        } else {
            info!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("PASSAGE_ACCESS_SECRET")
            && !secret.is_empty()
        {
            self.auth.access_secret = secret;
        }
        if let Ok(secret) = std::env::var("PASSAGE_REFRESH_SECRET")
            && !secret.is_empty()
        {
            self.auth.refresh_secret = secret;
        }
    }

    /// Complain when a deployment still runs on the development secrets
    pub fn warn_on_dev_secrets(&self) {
        if self.auth.access_secret == default_access_secret() {
            warn!("Using the development access-token secret; set PASSAGE_ACCESS_SECRET");
        }
        if self.auth.refresh_secret == default_refresh_secret() {
            warn!("Using the development refresh-token secret; set PASSAGE_REFRESH_SECRET");
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
