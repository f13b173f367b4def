//! Pairing records as kept in the code store.

use chrono::{DateTime, Duration, Utc};
use codepair_common::{ConnectionId, SessionId};
use serde::{Deserialize, Serialize};

use crate::code::Code;

/// Lifecycle of a pairing code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairingState {
    /// Issued, still accepting claims.
    Pending,
    /// Every claim slot is taken.
    Claimed,
    /// TTL elapsed; waiting to be removed.
    Expired,
    /// All session members disconnected.
    Closed,
}

impl PairingState {
    /// Wire spelling, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Claimed => "CLAIMED",
            Self::Expired => "EXPIRED",
            Self::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingRecord {
    pub code: Code,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: PairingState,
    pub session_id: SessionId,
    /// Connections that redeemed the code, in claim order.
    #[serde(default)]
    pub claimants: Vec<ConnectionId>,
}

impl PairingRecord {
    pub fn pending(code: Code, now: DateTime<Utc>, ttl: Duration) -> Self {
        let session_id = SessionId::for_code(code.as_str(), now.timestamp_millis());
        Self {
            code,
            created_at: now,
            expires_at: now + ttl,
            state: PairingState::Pending,
            session_id,
            claimants: Vec::new(),
        }
    }

    /// Past the deadline. An expired record counts as absent even while it
    /// still physically sits in the store.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at || self.state == PairingState::Expired
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    pub fn has_claimant(&self, connection_id: &ConnectionId) -> bool {
        self.claimants.iter().any(|c| c == connection_id)
    }

    /// Apply `transition` if its preconditions hold. This is the exact
    /// check-and-set every store backend must perform atomically.
    pub fn apply(&mut self, transition: &Transition) -> bool {
        if self.state != transition.expected_state
            || self.claimants.len() != transition.expected_claims
        {
            return false;
        }
        self.state = transition.next_state;
        if let Some(claimant) = &transition.claimant {
            self.claimants.push(claimant.clone());
        }
        true
    }
}

/// Conditional state change: applies only if the record is still in
/// `expected_state` with exactly `expected_claims` claimants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub expected_state: PairingState,
    pub expected_claims: usize,
    pub next_state: PairingState,
    pub claimant: Option<ConnectionId>,
}

impl Transition {
    pub fn claim(
        expected_claims: usize,
        next_state: PairingState,
        claimant: ConnectionId,
    ) -> Self {
        Self {
            expected_state: PairingState::Pending,
            expected_claims,
            next_state,
            claimant: Some(claimant),
        }
    }

    /// Pure state change, claimants untouched.
    pub fn state_change(record: &PairingRecord, next_state: PairingState) -> Self {
        Self {
            expected_state: record.state,
            expected_claims: record.claimants.len(),
            next_state,
            claimant: None,
        }
    }
    /// Take an `EXPIRED` record for removal. The throwaway claimant bumps
    /// the claim count, so of several concurrent reapers only one applies.
    pub fn reap(record: &PairingRecord) -> Self {
        Self {
            expected_state: PairingState::Expired,
            expected_claims: record.claimants.len(),
            next_state: PairingState::Expired,
            claimant: Some(ConnectionId::new()),
        }
    }
}
