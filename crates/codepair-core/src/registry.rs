//! Session registry: which live connections belong to which session.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use codepair_common::{ConnectionId, SessionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::metrics::PairingMetrics;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session {session_id} is full ({max_members} members)")]
    SessionFull {
        session_id: SessionId,
        max_members: usize,
    },
}

/// A live relay scope.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub members: BTreeSet<ConnectionId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// This join created the session.
    pub created: bool,
    pub member_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Others are still in the session.
    Remaining(Vec<ConnectionId>),
    /// The last member left and the session is gone.
    Destroyed,
    /// The connection was not a member.
    NotMember,
}

/// Membership per session. Mutations on one session are serialized by the
/// map's entry lock; different sessions do not contend.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
    max_members: usize,
    clock: Arc<dyn Clock>,
    metrics: Arc<PairingMetrics>,
}

impl SessionRegistry {
    pub fn new(max_members: usize, clock: Arc<dyn Clock>, metrics: Arc<PairingMetrics>) -> Self {
        Self {
            sessions: DashMap::new(),
            max_members: max_members.max(1),
            clock,
            metrics,
        }
    }

    /// Add `connection_id` to the session, creating the session on first
    /// join. Joining twice is a no-op.
    pub fn join(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Result<JoinOutcome, RegistryError> {
        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                if !session.members.contains(connection_id)
                    && session.members.len() >= self.max_members
                {
                    return Err(RegistryError::SessionFull {
                        session_id: session_id.clone(),
                        max_members: self.max_members,
                    });
                }
                session.members.insert(connection_id.clone());
                debug!(session = %session_id, conn = %connection_id, members = session.members.len(), "joined session");
                Ok(JoinOutcome {
                    created: false,
                    member_count: session.members.len(),
                })
            }
            Entry::Vacant(entry) => {
                let mut members = BTreeSet::new();
                members.insert(connection_id.clone());
                entry.insert(Session {
                    session_id: session_id.clone(),
                    members,
                    created_at: self.clock.now(),
                });
                self.metrics.session_opened();
                info!(session = %session_id, conn = %connection_id, "session created");
                Ok(JoinOutcome {
                    created: true,
                    member_count: 1,
                })
            }
        }
    }

    /// Remove `connection_id`; destroys the session when it empties.
    pub fn leave(&self, session_id: &SessionId, connection_id: &ConnectionId) -> LeaveOutcome {
        let Entry::Occupied(mut entry) = self.sessions.entry(session_id.clone()) else {
            return LeaveOutcome::NotMember;
        };
        if !entry.get_mut().members.remove(connection_id) {
            return LeaveOutcome::NotMember;
        }
        if entry.get().members.is_empty() {
            let session = entry.remove();
            let lifetime = self.clock.now() - session.created_at;
            self.metrics.session_destroyed();
            info!(session = %session_id, lifetime_secs = lifetime.num_seconds(), "session destroyed");
            return LeaveOutcome::Destroyed;
        }
        let remaining = entry.get().members.iter().cloned().collect();
        debug!(session = %session_id, conn = %connection_id, "left session");
        LeaveOutcome::Remaining(remaining)
    }

    /// Snapshot of the current members. Empty for unknown sessions.
    pub fn members(&self, session_id: &SessionId) -> Vec<ConnectionId> {
        self.sessions
            .get(session_id)
            .map(|s| s.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
