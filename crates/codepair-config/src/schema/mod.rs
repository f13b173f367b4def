//! Configuration schema types for the relay.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod pairing;
mod runtime;
mod server;
mod store;

pub use pairing::*;
pub use runtime::*;
pub use server::*;
pub use store::*;

use serde::{Deserialize, Serialize};

/// Root configuration for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CodepairConfig {
    pub server: ServerConfig,
    pub pairing: PairingConfig,
    pub store: StoreConfig,
    pub sweep: SweepConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_two_party_with_ten_minute_codes() {
        let config = CodepairConfig::default();
        assert_eq!(config.pairing.code_length, 4);
        assert_eq!(config.pairing.ttl_secs, 600);
        assert_eq!(config.pairing.max_members, 2);
        assert_eq!(config.pairing.max_claims(), 1);
        assert!(!config.pairing.is_group_mode());
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn group_mode_allows_members_minus_one_claims() {
        let pairing = PairingConfig {
            max_members: 5,
            ..Default::default()
        };
        assert!(pairing.is_group_mode());
        assert_eq!(pairing.max_claims(), 4);
    }

    #[test]
    fn listen_addr_joins_bind_and_port() {
        let server = ServerConfig {
            bind: "127.0.0.1".into(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(server.listen_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: CodepairConfig = toml::from_str(
            r#"
[pairing]
code_length = 6
closed_code_policy = "release"
"#,
        )
        .unwrap();
        assert_eq!(config.pairing.code_length, 6);
        assert_eq!(config.pairing.closed_code_policy, ClosedCodePolicy::Release);
        assert_eq!(config.pairing.ttl_secs, 600);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn store_backend_parses_lowercase() {
        let config: CodepairConfig = toml::from_str(
            r#"
[store]
backend = "rest"
url = "https://kv.example.com"
"#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert_eq!(config.store.url, "https://kv.example.com");
        assert_eq!(config.store.key_prefix, "codepair:code:");
    }
}
