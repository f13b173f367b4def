//! Pairing code and membership settings.

use serde::{Deserialize, Serialize};

/// What happens to a code once every member of its session has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClosedCodePolicy {
    /// Keep the record in `CLOSED` until its TTL runs out; late joiners are
    /// told the code was already used.
    #[default]
    Retain,
    /// Delete the record immediately so the code string can be issued again.
    Release,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Characters per code, drawn from `A-Z0-9`.
    pub code_length: u32,
    /// Default lifetime of an issued code.
    pub ttl_secs: u64,
    /// Upper bound for a caller-requested lifetime.
    pub max_ttl_secs: u64,
    /// Collision retries before issuing gives up.
    pub issue_attempts: u32,
    /// Session size including the issuer. 2 is the plain two-party mode;
    /// anything larger turns on group pairing.
    pub max_members: u32,
    pub closed_code_policy: ClosedCodePolicy,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            code_length: 4,
            ttl_secs: 600,
            max_ttl_secs: 3600,
            issue_attempts: 5,
            max_members: 2,
            closed_code_policy: ClosedCodePolicy::Retain,
        }
    }
}

impl PairingConfig {
    /// How many parties besides the issuer may redeem one code.
    pub fn max_claims(&self) -> usize {
        self.max_members.saturating_sub(1).max(1) as usize
    }

    pub fn is_group_mode(&self) -> bool {
        self.max_members > 2
    }
}
