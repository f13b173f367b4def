//! Pairing and relay counters.

use std::sync::atomic::{AtomicU64, Ordering};

use codepair_common::PairingErrorKind;
use serde::Serialize;

/// Counters shared by the pairing manager, session registry and relay
/// channel. Handed to each of them explicitly; all updates are atomic.
#[derive(Debug, Default)]
pub struct PairingMetrics {
    codes_issued: AtomicU64,
    claims_accepted: AtomicU64,
    claims_not_found: AtomicU64,
    claims_already_claimed: AtomicU64,
    store_failures: AtomicU64,
    codes_expired: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_destroyed: AtomicU64,
    events_relayed: AtomicU64,
    deliveries_dropped: AtomicU64,
}

/// Point-in-time copy of [`PairingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub codes_issued: u64,
    pub claims_accepted: u64,
    pub claims_not_found: u64,
    pub claims_already_claimed: u64,
    pub store_failures: u64,
    pub codes_expired: u64,
    pub sessions_opened: u64,
    pub sessions_destroyed: u64,
    pub events_relayed: u64,
    pub deliveries_dropped: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl PairingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code_issued(&self) {
        bump(&self.codes_issued, 1);
    }

    pub fn claim_accepted(&self) {
        bump(&self.claims_accepted, 1);
    }

    pub fn claim_rejected(&self, kind: PairingErrorKind) {
        match kind {
            PairingErrorKind::NotFoundOrExpired => bump(&self.claims_not_found, 1),
            PairingErrorKind::AlreadyClaimed => bump(&self.claims_already_claimed, 1),
            PairingErrorKind::StoreUnavailable => bump(&self.store_failures, 1),
            PairingErrorKind::ExhaustedCodeSpace => {}
        }
    }

    pub fn store_failure(&self) {
        bump(&self.store_failures, 1);
    }

    pub fn codes_expired(&self, count: u64) {
        bump(&self.codes_expired, count);
    }

    pub fn session_opened(&self) {
        bump(&self.sessions_opened, 1);
    }

    pub fn session_destroyed(&self) {
        bump(&self.sessions_destroyed, 1);
    }

    pub fn event_relayed(&self) {
        bump(&self.events_relayed, 1);
    }

    pub fn delivery_dropped(&self) {
        bump(&self.deliveries_dropped, 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            codes_issued: get(&self.codes_issued),
            claims_accepted: get(&self.claims_accepted),
            claims_not_found: get(&self.claims_not_found),
            claims_already_claimed: get(&self.claims_already_claimed),
            store_failures: get(&self.store_failures),
            codes_expired: get(&self.codes_expired),
            sessions_opened: get(&self.sessions_opened),
            sessions_destroyed: get(&self.sessions_destroyed),
            events_relayed: get(&self.events_relayed),
            deliveries_dropped: get(&self.deliveries_dropped),
        }
    }
}
