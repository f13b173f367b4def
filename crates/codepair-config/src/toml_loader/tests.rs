//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::{ClosedCodePolicy, CodepairConfig, StoreBackend};
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_codepair_relay.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, codepair_common::ConfigError::FileNotFound(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.toml");
    std::fs::write(
        &path,
        r#"
[server]
port = 9443

[pairing]
ttl_secs = 120
max_members = 4
closed_code_policy = "release"
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.server.port, 9443);
    assert_eq!(config.pairing.ttl_secs, 120);
    assert_eq!(config.pairing.max_members, 4);
    assert_eq!(config.pairing.closed_code_policy, ClosedCodePolicy::Release);
    // Defaults preserved
    assert_eq!(config.server.bind, "0.0.0.0");
    assert_eq!(config.pairing.code_length, 4);
    assert_eq!(config.store.backend, StoreBackend::Memory);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, codepair_common::ConfigError::ParseError(_)));
}

#[test]
fn create_default_config_writes_loadable_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("relay.toml");

    assert!(create_default_config(&path).unwrap());
    assert!(path.exists());

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("[pairing]"));
    assert!(content.contains("closed_code_policy"));

    let config = load_from_path(&path).unwrap();
    let defaults = CodepairConfig::default();
    assert_eq!(config.pairing.ttl_secs, defaults.pairing.ttl_secs);
    assert_eq!(config.server.port, defaults.server.port);
}

#[test]
fn default_config_path_ends_with_relay_toml() {
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("codepair/relay.toml"));
    }
}
