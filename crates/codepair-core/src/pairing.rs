//! Pairing manager: issues codes and owns every state transition of a
//! pairing record.
//!
//! Lifecycle of a record:
//!
//! ```text
//! PENDING ──claim (last slot)──▶ CLAIMED ──all members left──▶ CLOSED
//!    │                              │
//!    └──────── TTL elapsed ─────────┴──────▶ EXPIRED ──sweep──▶ (deleted)
//! ```
//!
//! Claims are a single conditional update in the store. Nothing here holds
//! an in-process lock across store calls, so several relay instances can
//! share one store without double claims.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use codepair_common::{ConnectionId, PairingError, SessionId};
use codepair_config::{ClosedCodePolicy, PairingConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::code::{Code, CodeGenerator};
use crate::metrics::PairingMetrics;
use crate::record::{PairingRecord, PairingState, Transition};
use crate::store::CodeStore;

/// Bound on compare-and-swap retries when other claimants keep winning.
/// Only group mode can lose more than once.
const CAS_ATTEMPTS: usize = 16;

/// How long an expired record may linger in the store before the store's own
/// TTL removes it, giving the sweep a chance to mark it first.
const EXPIRED_RECORD_GRACE: Duration = Duration::from_secs(300);

/// Seconds past its deadline after which an `EXPIRED` record is treated as a
/// leftover of a failed delete.
const EXPIRED_LEFTOVER_SECS: i64 = 60;

/// Result of a successful issue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCode {
    pub code: Code,
    pub expires_in_seconds: u64,
    #[serde(skip)]
    pub session_id: SessionId,
    #[serde(skip)]
    pub expires_at: DateTime<Utc>,
}

/// Read-only answer to "can this code be joined right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeStatus {
    pub code: String,
    pub joinable: bool,
    pub state: Option<PairingState>,
    pub expires_in_seconds: u64,
}

impl CodeStatus {
    fn unknown(code: &str) -> Self {
        Self {
            code: code.to_string(),
            joinable: false,
            state: None,
            expires_in_seconds: 0,
        }
    }
}

pub struct PairingManager {
    store: Arc<dyn CodeStore>,
    clock: Arc<dyn Clock>,
    generator: CodeGenerator,
    config: PairingConfig,
    key_prefix: String,
    metrics: Arc<PairingMetrics>,
}

impl PairingManager {
    pub fn new(
        store: Arc<dyn CodeStore>,
        clock: Arc<dyn Clock>,
        config: PairingConfig,
        key_prefix: impl Into<String>,
        metrics: Arc<PairingMetrics>,
    ) -> Self {
        Self {
            store,
            clock,
            generator: CodeGenerator::new(config.code_length as usize),
            config,
            key_prefix: key_prefix.into(),
            metrics,
        }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<PairingMetrics> {
        &self.metrics
    }

    fn key(&self, code: &Code) -> String {
        format!("{}{}", self.key_prefix, code)
    }

    /// Requested TTL clamped into `1..=max_ttl_secs`; `None` means default.
    fn effective_ttl(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.config.ttl_secs)
            .clamp(1, self.config.max_ttl_secs.max(1))
    }

    // -----------------------------------------------------------------------
    // Issue
    // -----------------------------------------------------------------------

    /// Issue a fresh code that collides with no live record.
    pub async fn issue(&self, ttl_secs: Option<u64>) -> Result<IssuedCode, PairingError> {
        let ttl_secs = self.effective_ttl(ttl_secs);
        let ttl = chrono::Duration::seconds(ttl_secs as i64);
        let store_ttl = Duration::from_secs(ttl_secs) + EXPIRED_RECORD_GRACE;
        let attempts = self.config.issue_attempts.max(1);

        for attempt in 1..=attempts {
            let code = self.generator.generate();
            let key = self.key(&code);
            let now = self.clock.now();
            let record = PairingRecord::pending(code.clone(), now, ttl);

            let mut inserted = self.store.set_if_absent(&key, &record, store_ttl).await?;
            if !inserted && self.reap_if_expired(&key).await? {
                // The holder was only a stale leftover.
                inserted = self.store.set_if_absent(&key, &record, store_ttl).await?;
            }

            if inserted {
                self.metrics.code_issued();
                info!(code = %code, ttl_secs, attempt, "code issued");
                return Ok(IssuedCode {
                    code,
                    expires_in_seconds: ttl_secs,
                    session_id: record.session_id,
                    expires_at: record.expires_at,
                });
            }
            debug!(code = %code, attempt, "code collision, retrying");
        }

        warn!(
            attempts,
            code_length = self.generator.length(),
            code_space = self.generator.code_space(),
            "code space exhausted; use longer codes or a shorter TTL"
        );
        Err(PairingError::ExhaustedCodeSpace { attempts })
    }

    // -----------------------------------------------------------------------
    // Claim / bind
    // -----------------------------------------------------------------------

    /// Redeem `raw_code` for `connection_id`. At most `max_claims` callers
    /// ever succeed per code, however many race.
    pub async fn claim(
        &self,
        raw_code: &str,
        connection_id: &ConnectionId,
    ) -> Result<SessionId, PairingError> {
        let result = self.try_claim(raw_code, connection_id).await;
        match &result {
            Ok(session_id) => {
                self.metrics.claim_accepted();
                info!(code = %raw_code.trim(), session = %session_id, conn = %connection_id, "code claimed");
            }
            Err(e) => {
                self.metrics.claim_rejected(e.kind());
                debug!(code = %raw_code.trim(), conn = %connection_id, error = %e, "claim rejected");
            }
        }
        result
    }

    async fn try_claim(
        &self,
        raw_code: &str,
        connection_id: &ConnectionId,
    ) -> Result<SessionId, PairingError> {
        let code = Code::parse(raw_code).ok_or(PairingError::NotFoundOrExpired)?;
        let key = self.key(&code);
        let max_claims = self.config.max_claims();

        for _ in 0..CAS_ATTEMPTS {
            let record = self.live_record(&key).await?;

            // A retried call whose first attempt already landed.
            if record.has_claimant(connection_id) {
                return Ok(record.session_id);
            }

            match record.state {
                PairingState::Pending => {}
                PairingState::Claimed | PairingState::Closed => {
                    return Err(PairingError::AlreadyClaimed)
                }
                PairingState::Expired => return Err(PairingError::NotFoundOrExpired),
            }

            let claims = record.claimants.len();
            if claims >= max_claims {
                return Err(PairingError::AlreadyClaimed);
            }
            let next_state = if claims + 1 >= max_claims {
                PairingState::Claimed
            } else {
                PairingState::Pending
            };

            let transition = Transition::claim(claims, next_state, connection_id.clone());
            if self.store.compare_and_swap_state(&key, &transition).await? {
                return Ok(record.session_id);
            }
            // Someone else moved the record first; look again.
        }

        Err(PairingError::AlreadyClaimed)
    }

    /// Admit the code's own issuer to its session without spending a claim.
    ///
    /// Callers are responsible for only routing the issuing party here.
    pub async fn bind_generator(
        &self,
        raw_code: &str,
        connection_id: &ConnectionId,
    ) -> Result<SessionId, PairingError> {
        let code = Code::parse(raw_code).ok_or(PairingError::NotFoundOrExpired)?;
        let record = self.live_record(&self.key(&code)).await?;
        match record.state {
            PairingState::Pending | PairingState::Claimed => {
                info!(code = %code, session = %record.session_id, conn = %connection_id, "issuer bound");
                Ok(record.session_id)
            }
            PairingState::Closed => Err(PairingError::AlreadyClaimed),
            PairingState::Expired => Err(PairingError::NotFoundOrExpired),
        }
    }

    /// Fetch a record, treating anything past its deadline as absent.
    async fn live_record(&self, key: &str) -> Result<PairingRecord, PairingError> {
        let record = self
            .store
            .get(key)
            .await?
            .ok_or(PairingError::NotFoundOrExpired)?;
        if record.is_expired_at(self.clock.now()) {
            return Err(PairingError::NotFoundOrExpired);
        }
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Validate / close
    // -----------------------------------------------------------------------

    /// Whether `raw_code` would currently accept a claim. Never writes.
    pub async fn validate(&self, raw_code: &str) -> Result<CodeStatus, PairingError> {
        let Some(code) = Code::parse(raw_code) else {
            return Ok(CodeStatus::unknown(raw_code.trim()));
        };
        let now = self.clock.now();
        let status = match self.store.get(&self.key(&code)).await? {
            Some(record) if !record.is_expired_at(now) => CodeStatus {
                code: code.to_string(),
                joinable: record.state == PairingState::Pending
                    && record.claimants.len() < self.config.max_claims(),
                state: Some(record.state),
                expires_in_seconds: record.remaining_at(now).num_seconds().max(0) as u64,
            },
            _ => CodeStatus::unknown(code.as_str()),
        };
        Ok(status)
    }

    /// Mark the record behind `session_id` closed once its session is gone.
    /// A record that has since expired or been reissued is left alone, and so
    /// is one nobody has claimed yet: the issuer may still hand it out.
    pub async fn close(&self, session_id: &SessionId) -> Result<(), PairingError> {
        let Some(code) = Code::parse(session_id.code()) else {
            return Ok(());
        };
        let key = self.key(&code);

        for _ in 0..CAS_ATTEMPTS {
            let Some(record) = self.store.get(&key).await? else {
                return Ok(());
            };
            if record.session_id != *session_id || record.claimants.is_empty() {
                return Ok(());
            }

            match self.config.closed_code_policy {
                ClosedCodePolicy::Release => {
                    self.store.delete(&key).await?;
                    info!(code = %code, session = %session_id, "code released");
                    return Ok(());
                }
                ClosedCodePolicy::Retain => {
                    if matches!(record.state, PairingState::Closed | PairingState::Expired) {
                        return Ok(());
                    }
                    let transition = Transition::state_change(&record, PairingState::Closed);
                    if self.store.compare_and_swap_state(&key, &transition).await? {
                        info!(code = %code, session = %session_id, "code closed");
                        return Ok(());
                    }
                }
            }
        }

        warn!(session = %session_id, "gave up closing code after repeated conflicts");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    /// Mark and remove every record past its deadline. Returns how many
    /// records this call removed; a second call right after returns 0.
    pub async fn expire_sweep(&self) -> Result<usize, PairingError> {
        let mut removed = 0;
        for key in self.store.keys().await? {
            if !key.starts_with(&self.key_prefix) {
                continue;
            }
            match self.reap_if_expired(&key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    self.metrics.store_failure();
                    warn!(key = %key, error = %e, "sweep step failed");
                }
            }
        }
        if removed > 0 {
            self.metrics.codes_expired(removed as u64);
            info!(removed, "expired codes swept");
        }
        Ok(removed)
    }

    /// Move one expired record to `EXPIRED` and delete it. Only the caller
    /// whose conditional update wins deletes, so a fresh record issued under
    /// the same key afterwards is never touched.
    ///
    /// A record already in `EXPIRED` is normally mid-removal by whoever moved
    /// it there. Once it is [`EXPIRED_LEFTOVER_SECS`] past its deadline that removal
    /// is taken to have failed, and the record is reaped again.
    async fn reap_if_expired(&self, key: &str) -> Result<bool, PairingError> {
        let Some(record) = self.store.get(key).await? else {
            return Ok(false);
        };
        let now = self.clock.now();
        let transition = if record.state == PairingState::Expired {
            if now < record.expires_at + chrono::Duration::seconds(EXPIRED_LEFTOVER_SECS) {
                return Ok(false);
            }
            Transition::reap(&record)
        } else if record.is_expired_at(now) {
            Transition::state_change(&record, PairingState::Expired)
        } else {
            return Ok(false);
        };
        if !self.store.compare_and_swap_state(key, &transition).await? {
            return Ok(false);
        }
        self.store.delete(key).await?;
        debug!(code = %record.code, "expired record removed");
        Ok(true)
    }
}
