//! Configuration loader
//!
//! Loads [`SdkConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `BIZBERRY_URL` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `BIZBERRY_URL`: Backend base URL (required for env loading)
//! - `BIZBERRY_TENANT`: Tenant identifier
//! - `BIZBERRY_TIMEOUT_SECS`: Per-request timeout in seconds
//! - `BIZBERRY_SAFETY_INTERVAL_MS`: Token expiry safety margin in milliseconds
//! - `BIZBERRY_RELATION_DEPTH`: Maximum `$rel` expansion depth
//! - `BIZBERRY_AUTO_REFRESH_SECS`: Background refresh period in seconds
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./bizberry.{json,toml}` then `./config.{json,toml}`
//! 2. The same names in the parent and grandparent directories
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use bizberry_domain::{ApiError, Result, SdkConfig};

const FILE_NAMES: [&str; 4] = ["bizberry.json", "bizberry.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `ApiError::Config` if neither source yields a configuration or a
/// file cannot be parsed.
pub fn load() -> Result<SdkConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// Only `BIZBERRY_URL` is required; every other variable falls back to the
/// [`SdkConfig`] default.
///
/// # Errors
/// Returns `ApiError::Config` if `BIZBERRY_URL` is missing or a numeric
/// variable does not parse.
pub fn load_from_env() -> Result<SdkConfig> {
    let defaults = SdkConfig::default();

    Ok(SdkConfig {
        url: Some(env_var("BIZBERRY_URL")?),
        tenant: std::env::var("BIZBERRY_TENANT").unwrap_or(defaults.tenant),
        timeout_secs: env_parse("BIZBERRY_TIMEOUT_SECS", defaults.timeout_secs)?,
        safety_interval_ms: env_parse("BIZBERRY_SAFETY_INTERVAL_MS", defaults.safety_interval_ms)?,
        relation_depth: env_parse("BIZBERRY_RELATION_DEPTH", defaults.relation_depth)?,
        auto_refresh_interval_secs: env_parse(
            "BIZBERRY_AUTO_REFRESH_SECS",
            defaults.auto_refresh_interval_secs,
        )?,
        ..defaults
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is chosen by
/// file extension.
///
/// # Errors
/// Returns `ApiError::Config` if the file is missing, unreadable or invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<SdkConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ApiError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ApiError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ApiError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<SdkConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ApiError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ApiError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(ApiError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    roots
        .iter()
        .flat_map(|root| FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| ApiError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional numeric variable, `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ApiError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}
