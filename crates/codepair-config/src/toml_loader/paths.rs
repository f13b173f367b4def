//! Where the relay looks for its config file, and first-run creation.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use codepair_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

/// Overrides the default config location when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "CODEPAIR_CONFIG";

/// `$CODEPAIR_CONFIG` if set, else `<config dir>/codepair/relay.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(std::env::var_os(CONFIG_PATH_ENV), dirs::config_dir())
}

fn resolve_config_path(
    env_override: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = env_override.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    config_dir
        .map(|dir| dir.join("codepair").join("relay.toml"))
        .ok_or_else(|| {
            ConfigError::ParseError(format!(
                "no platform config directory; set {CONFIG_PATH_ENV} or pass --config"
            ))
        })
}

/// Write the commented default template to `path`.
///
/// Returns `false` without touching anything when the file already exists,
/// e.g. because another relay instance created it first.
pub fn create_default_config(path: &Path) -> Result<bool, ConfigError> {
    let write_failed = |e: std::io::Error| ConfigError::WriteFailed(path.to_path_buf(), e.to_string());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_failed)?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(write_failed(e)),
    };
    file.write_all(default_config_toml().as_bytes())
        .map_err(write_failed)?;

    info!(path = %path.display(), "created default config");
    Ok(true)
}
