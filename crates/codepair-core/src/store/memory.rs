//! In-process code store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use codepair_common::StoreError;
use tokio::sync::RwLock;

use super::CodeStore;
use crate::clock::Clock;
use crate::record::{PairingRecord, Transition};

struct Entry {
    record: PairingRecord,
    /// Store-level TTL; independent of `record.expires_at`.
    deadline: DateTime<Utc>,
}

/// Code store backed by a map behind a single lock. Every operation runs
/// under that lock, which makes the conditional updates trivially atomic
/// within one process.
pub struct MemoryCodeStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCodeStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of entries physically held, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn ttl_to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn set_if_absent(
        &self,
        key: &str,
        record: &PairingRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut map = self.entries.write().await;
        if let Some(existing) = map.get(key) {
            if existing.deadline > now {
                return Ok(false);
            }
        }
        map.insert(
            key.to_string(),
            Entry {
                record: record.clone(),
                deadline: now + ttl_to_chrono(ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<PairingRecord>, StoreError> {
        let now = self.clock.now();
        let map = self.entries.read().await;
        Ok(map
            .get(key)
            .filter(|entry| entry.deadline > now)
            .map(|entry| entry.record.clone()))
    }

    async fn compare_and_swap_state(
        &self,
        key: &str,
        transition: &Transition,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut map = self.entries.write().await;
        match map.get_mut(key) {
            Some(entry) if entry.deadline > now => Ok(entry.record.apply(transition)),
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    /// Also drops entries past their store deadline, as a TTL-evicting
    /// backend would have.
    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        let mut map = self.entries.write().await;
        map.retain(|_, entry| entry.deadline > now);
        Ok(map.keys().cloned().collect())
    }
}
