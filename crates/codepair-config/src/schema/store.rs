use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map. Codes do not survive a restart and are not shared
    /// between relay instances.
    #[default]
    Memory,
    /// Redis-compatible key-value service spoken to over HTTP.
    Rest,
}

/// Code store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub token: String,
    pub request_timeout_secs: u64,
    /// Times a pairing call is retried when the store is unreachable.
    pub retry_attempts: u32,
    /// First retry delay; doubled on each further attempt.
    pub retry_backoff_ms: u64,
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: String::new(),
            token: String::new(),
            request_timeout_secs: 5,
            retry_attempts: 3,
            retry_backoff_ms: 100,
            key_prefix: "codepair:code:".into(),
        }
    }
}
