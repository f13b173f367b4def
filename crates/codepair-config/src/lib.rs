//! Relay configuration.
//!
//! TOML-based configuration with full validation. All sections use
//! sensible defaults so partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    ClosedCodePolicy, CodepairConfig, LoggingConfig, PairingConfig, RelayConfig, ServerConfig,
    StoreBackend, StoreConfig, SweepConfig,
};

use std::path::Path;

use codepair_common::ConfigError;

/// Load config, let `overrides` adjust it, then validate the result.
///
/// An explicit `path` must exist. Without one, the platform default file is
/// used and created on first run. Validation runs once, after overrides, so
/// a value the file leaves out can still be supplied on the command line.
pub fn load_config(
    path: Option<&Path>,
    overrides: impl FnOnce(&mut CodepairConfig),
) -> Result<CodepairConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };

    overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}
