//! Full configuration validation.
//!
//! Each section has its own validator; this orchestrator calls them all and
//! collects errors into a single `ConfigError`.

mod helpers;
mod sections;


use crate::schema::CodepairConfig;
use codepair_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &CodepairConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    sections::validate_server(&mut errors, config);
    sections::validate_pairing(&mut errors, config);
    sections::validate_store(&mut errors, config);
    sections::validate_runtime(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
