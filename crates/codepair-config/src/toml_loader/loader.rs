//! Core TOML config loading: read from path or platform default.

use crate::schema::CodepairConfig;
use codepair_common::ConfigError;
use std::path::Path;
use tracing::info;

use super::paths::{create_default_config, default_config_path};

/// Load config from a specific TOML file path.
///
/// Missing fields take their serde defaults. Validation is left to the
/// caller so a bad value is reported instead of silently replaced.
pub fn load_from_path(path: &Path) -> Result<CodepairConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: CodepairConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from [`default_config_path`], writing the default template
/// there on first run.
pub fn load_default() -> Result<CodepairConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            if create_default_config(&path)? {
                Ok(CodepairConfig::default())
            } else {
                // Lost the race to another instance; use what it wrote.
                load_from_path(&path)
            }
        }
        result => result,
    }
}
