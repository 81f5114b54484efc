//! Configuration loading and config file resolution
//!
//! Resolution priority for the config file location:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`~/.config/onboard/<service>.toml`, `/etc/onboard/<service>.toml`)
//!
//! A missing config file is not fatal: the service starts from compiled defaults
//! and logs a warning. A config file that exists but fails to parse IS fatal.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Locate the TOML config file for `service_name`
///
/// Returns `None` when no candidate exists; callers fall back to defaults.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    service_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Some(path) = env_string(env_var_name) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: Platform config locations
    let file_name = format!("{}.toml", service_name);
    let user_config = dirs::config_dir().map(|d| d.join("onboard").join(&file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/onboard").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file into `T`
///
/// Missing file (or no path at all) yields `T::default()` with a warning.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using compiled defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = parse_toml(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Parse TOML text into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> std::result::Result<T, toml::de::Error> {
    toml::from_str(content)
}

/// Read an environment variable, trimmed; empty values count as unset
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an environment variable
///
/// Unset → `Ok(None)`. Set but unparseable → `Error::Config`.
pub fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?} is invalid: {}", name, raw, e))),
    }
}

/// Get OS-dependent default data folder for a service
pub fn default_data_dir(service_name: &str) -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("onboard").join(service_name))
        .unwrap_or_else(|| PathBuf::from("./onboard_data").join(service_name))
}
