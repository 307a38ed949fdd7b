// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{AppConfig, RawAppConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawAppConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawAppConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawAppConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Parses durations and restart policies, checks limits.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<AppConfig> {
    let raw_config = load_from_path(&path)?;
    let config = AppConfig::try_from(raw_config)?;
    Ok(config)
}

/// `Podflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Podflow.toml")
}
