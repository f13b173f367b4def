//! Code store: the durable (or ephemeral) home of pairing records.
//!
//! The pairing manager only relies on the four operations below plus key
//! enumeration for sweeping. `compare_and_swap_state` must be atomic in the
//! backend itself, not merely in this process, because several relay
//! instances may share one store.

mod memory;
mod rest;

pub use memory::MemoryCodeStore;
pub use rest::RestCodeStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codepair_common::StoreError;
use codepair_config::{StoreBackend, StoreConfig};

use crate::clock::Clock;
use crate::record::{PairingRecord, Transition};

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Insert `record` under `key` unless a live entry already holds it.
    /// Returns `false` on collision.
    async fn set_if_absent(
        &self,
        key: &str,
        record: &PairingRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<PairingRecord>, StoreError>;

    /// Atomically apply `transition` to the record under `key`. Returns
    /// `false` when the key is gone or the preconditions no longer hold.
    async fn compare_and_swap_state(
        &self,
        key: &str,
        transition: &Transition,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Every key currently held, for the expiry sweep.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Build the store selected by `config`.
pub fn from_config(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn CodeStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryCodeStore::new(clock))),
        StoreBackend::Rest => Ok(Arc::new(RestCodeStore::new(
            &config.url,
            &config.token,
            &config.key_prefix,
            Duration::from_secs(config.request_timeout_secs),
        )?)),
    }
}
