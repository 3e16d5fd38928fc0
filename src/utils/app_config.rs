/// Application configuration management
/// Settings come from the environment (optionally a .env file), overlaid on
/// ~/.config/dumpdock/config.toml

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::{
    APP_NAME, DEFAULT_API_HOST, DEFAULT_API_PORT, DEFAULT_COMPOSE_TIMEOUT, DEFAULT_DUMP_DIR,
    DEFAULT_HOST_GATEWAY, DEFAULT_OPERATION_TIMEOUT,
};

/// Where engine client tools run when no stack container is involved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runner {
    /// Client binaries installed on this machine
    #[default]
    Host,
    /// Throwaway `docker run --rm` of the engine's client image
    Docker,
}

impl FromStr for Runner {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "host" => Ok(Runner::Host),
            "docker" | "container" => Ok(Runner::Docker),
            other => Err(anyhow!("Unknown runner '{}': expected 'host' or 'docker'", other)),
        }
    }
}

/// Values accepted in the TOML file; everything is optional
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub dump_dir: Option<String>,
    /// Older name for `dump_dir`
    pub restore_dir: Option<String>,
    pub data_file: Option<String>,
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub cors: Option<bool>,
    pub runner: Option<Runner>,
    pub host_gateway: Option<String>,
    pub operation_timeout: Option<String>,
    pub compose_timeout: Option<String>,
    pub require_restore_password: Option<bool>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Dumps are written here and restores read from here
    pub dump_dir: PathBuf,
    pub data_file: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub cors: bool,
    pub runner: Runner,
    pub host_gateway: String,
    pub operation_timeout: Duration,
    pub compose_timeout: Duration,
    pub require_restore_password: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dump_dir: PathBuf::from(DEFAULT_DUMP_DIR),
            data_file: default_data_file(),
            api_host: DEFAULT_API_HOST.to_string(),
            api_port: DEFAULT_API_PORT,
            cors: false,
            runner: Runner::Host,
            host_gateway: DEFAULT_HOST_GATEWAY.to_string(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            compose_timeout: DEFAULT_COMPOSE_TIMEOUT,
            require_restore_password: false,
            log_level: "info".to_string(),
        }
    }
}

fn default_data_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
        .join("configs.json")
}

impl AppConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine the user configuration directory")?
            .join(APP_NAME);
        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from .env, the environment and the config file
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let path = Self::config_path()?;
        let file = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            FileConfig::default()
        };

        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge file values with environment lookups; the environment wins
    pub fn from_sources<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let pick = |key: &str, from_file: Option<String>| {
            env(key).filter(|v| !v.trim().is_empty()).or(from_file)
        };

        // RESTORE_BASE_PATH only names the same directory; DUMP_BASE_PATH wins
        let dump_dir = pick("DUMP_BASE_PATH", file.dump_dir)
            .or_else(|| pick("RESTORE_BASE_PATH", file.restore_dir))
            .map(PathBuf::from)
            .unwrap_or(defaults.dump_dir);
        let data_file = pick("DUMPDOCK_DATA_FILE", file.data_file)
            .map(PathBuf::from)
            .unwrap_or(defaults.data_file);

        let api_host = pick("API_HOST", file.api_host).unwrap_or(defaults.api_host);
        let api_port = match env("API_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("API_PORT is not a valid port: {}", raw))?,
            None => file.api_port.unwrap_or(defaults.api_port),
        };

        let cors = match env("CORS_ENABLED") {
            Some(raw) => parse_bool(&raw)?,
            None => file.cors.unwrap_or(defaults.cors),
        };
        let runner = match env("DUMPDOCK_RUNNER") {
            Some(raw) => raw.parse()?,
            None => file.runner.unwrap_or(defaults.runner),
        };
        let host_gateway =
            pick("DUMPDOCK_HOST_GATEWAY", file.host_gateway).unwrap_or(defaults.host_gateway);

        let operation_timeout = match pick("OPERATION_TIMEOUT", file.operation_timeout) {
            Some(raw) => parse_duration(&raw)?,
            None => defaults.operation_timeout,
        };
        let compose_timeout = match pick("COMPOSE_TIMEOUT", file.compose_timeout) {
            Some(raw) => parse_duration(&raw)?,
            None => defaults.compose_timeout,
        };

        let require_restore_password = match env("REQUIRE_RESTORE_PASSWORD") {
            Some(raw) => parse_bool(&raw)?,
            None => file
                .require_restore_password
                .unwrap_or(defaults.require_restore_password),
        };
        let log_level = pick("LOG_LEVEL", file.log_level)
            .map(|l| l.to_lowercase())
            .unwrap_or(defaults.log_level);

        Ok(Self {
            dump_dir,
            data_file,
            api_host,
            api_port,
            cors,
            runner,
            host_gateway,
            operation_timeout,
            compose_timeout,
            require_restore_password,
            log_level,
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Expected a boolean, got '{}'", other)),
    }
}

/// Accepts humantime strings ("90s", "5m", "1h 30m") or bare seconds
fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).with_context(|| format!("Invalid duration '{}'", raw))
}
