//! Connection lifecycle: binds transport connections to sessions and cleans
//! up after them.
//!
//! Per connection:
//!
//! ```text
//! UNBOUND ──join succeeds──▶ BOUND(session) ──leave / disconnect──▶ CLOSED
//!    └────────────────────────── leave ────────────────────────────────┘
//! ```
//!
//! `CLOSED` is terminal. The transport adapter owns the [`Connection`] value
//! and feeds every decoded frame through [`LifecycleHandler::handle`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use codepair_common::{ConnectionId, PairingError, SessionId};
use codepair_config::StoreConfig;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::code::Code;
use crate::pairing::PairingManager;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{LeaveOutcome, RegistryError, SessionRegistry};
use crate::relay::{Outbox, RelayChannel};

/// Bounded retry with doubling backoff for calls that fail with
/// `StoreUnavailable`. Every other error is returned on first sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, initial_backoff: Duration) -> Self {
        Self {
            retries,
            initial_backoff,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff.saturating_mul(1 << retry.min(16))
    }

    pub async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, PairingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PairingError>>,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Err(e) if e.is_retryable() && retry < self.retries => {
                    let delay = self.backoff(retry);
                    retry += 1;
                    warn!(
                        op,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Bound(SessionId),
    /// Left its session. Nothing but `ping` is accepted any more.
    Closed,
}

/// Per-connection pairing state, owned by the transport task.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    /// Normalized codes this connection issued; joining one of them binds
    /// the issuer instead of spending a claim.
    issued_codes: HashSet<String>,
}

impl Connection {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match &self.state {
            ConnectionState::Bound(session_id) => Some(session_id),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}

pub struct LifecycleHandler {
    pairing: Arc<PairingManager>,
    registry: Arc<SessionRegistry>,
    relay: Arc<RelayChannel>,
    retry: RetryPolicy,
}

impl LifecycleHandler {
    pub fn new(
        pairing: Arc<PairingManager>,
        registry: Arc<SessionRegistry>,
        relay: Arc<RelayChannel>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pairing,
            registry,
            relay,
            retry,
        }
    }

    pub fn pairing(&self) -> &Arc<PairingManager> {
        &self.pairing
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn relay(&self) -> &Arc<RelayChannel> {
        &self.relay
    }

    /// Register a new transport connection. It starts unbound.
    pub fn connect(&self, outbox: Outbox) -> Connection {
        let id = ConnectionId::new();
        self.relay.attach(id.clone(), outbox);
        debug!(conn = %id, "connection attached");
        Connection {
            id,
            state: ConnectionState::Unbound,
            issued_codes: HashSet::new(),
        }
    }

    pub async fn handle(&self, conn: &mut Connection, message: ClientMessage) {
        if conn.is_closed() && message != ClientMessage::Ping {
            self.reply(conn, ServerMessage::error("connection has already left its session"));
            return;
        }

        match message {
            ClientMessage::IssueCode { ttl_secs } => self.issue(conn, ttl_secs).await,
            ClientMessage::ValidateCode { code } => self.validate(conn, &code).await,
            ClientMessage::JoinWithCode { code } => self.join(conn, &code).await,
            ClientMessage::Relay { event, payload } => self.relay_event(conn, event, payload),
            ClientMessage::Leave => self.leave(conn).await,
            ClientMessage::Ping => self.reply(conn, ServerMessage::Pong),
        }
    }

    /// Answer a frame that could not be decoded. The connection stays open.
    pub fn reject_invalid(&self, conn: &Connection, reason: &str) {
        warn!(conn = %conn.id, reason, "invalid client message");
        self.reply(conn, ServerMessage::error(format!("invalid message: {reason}")));
    }

    /// Transport went away: leave the session (if any) and forget the outbox.
    pub async fn disconnect(&self, mut conn: Connection) {
        if let ConnectionState::Bound(session_id) =
            std::mem::replace(&mut conn.state, ConnectionState::Closed)
        {
            self.leave_session(&session_id, &conn.id).await;
        }
        self.relay.detach(&conn.id);
        debug!(conn = %conn.id, "connection detached");
    }

    fn reply(&self, conn: &Connection, message: ServerMessage) {
        self.relay.send_to(&conn.id, message);
    }

    async fn issue(&self, conn: &mut Connection, ttl_secs: Option<u64>) {
        let pairing = &*self.pairing;
        match self.retry.run("issue", || pairing.issue(ttl_secs)).await {
            Ok(issued) => {
                conn.issued_codes.insert(issued.code.to_string());
                self.reply(conn, ServerMessage::from(&issued));
            }
            Err(e) => {
                warn!(conn = %conn.id, error = %e, "issue failed");
                self.reply(conn, ServerMessage::from(&e));
            }
        }
    }

    async fn validate(&self, conn: &Connection, raw_code: &str) {
        let pairing = &*self.pairing;
        match self.retry.run("validate", || pairing.validate(raw_code)).await {
            Ok(status) => self.reply(conn, status.into()),
            Err(e) => self.reply(conn, ServerMessage::from(&e)),
        }
    }

    async fn join(&self, conn: &mut Connection, raw_code: &str) {
        if conn.session_id().is_some() {
            self.reply(conn, ServerMessage::error("already paired; leave first"));
            return;
        }

        let pairing = &*self.pairing;
        let id = &conn.id;
        let issued_here = Code::parse(raw_code)
            .is_some_and(|code| conn.issued_codes.contains(code.as_str()));
        let result = if issued_here {
            self.retry
                .run("bind", || pairing.bind_generator(raw_code, id))
                .await
        } else {
            self.retry.run("claim", || pairing.claim(raw_code, id)).await
        };

        let session_id = match result {
            Ok(session_id) => session_id,
            Err(e) => {
                self.reply(conn, ServerMessage::from(&e));
                return;
            }
        };

        if let Err(RegistryError::SessionFull {
            session_id,
            max_members,
        }) = self.registry.join(&session_id, &conn.id)
        {
            warn!(session = %session_id, conn = %conn.id, max_members, "session full");
            self.reply(conn, ServerMessage::from(&PairingError::AlreadyClaimed));
            return;
        }

        info!(session = %session_id, conn = %conn.id, issuer = issued_here, "paired");
        conn.state = ConnectionState::Bound(session_id.clone());
        self.reply(
            conn,
            ServerMessage::Paired {
                session_id: session_id.clone(),
            },
        );
        self.relay.publish(
            &session_id,
            &ServerMessage::PeerJoined {
                connection_id: conn.id.clone(),
            },
            Some(&conn.id),
        );
    }

    fn relay_event(&self, conn: &Connection, event: String, payload: Value) {
        let Some(session_id) = conn.session_id() else {
            self.reply(conn, ServerMessage::error("not paired; join with a code first"));
            return;
        };
        let delivered = self.relay.relay(session_id, &conn.id, event, payload);
        debug!(session = %session_id, conn = %conn.id, delivered, "event relayed");
    }

    async fn leave(&self, conn: &mut Connection) {
        if let ConnectionState::Bound(session_id) =
            std::mem::replace(&mut conn.state, ConnectionState::Closed)
        {
            self.leave_session(&session_id, &conn.id).await;
        }
        info!(conn = %conn.id, "connection left");
    }

    async fn leave_session(&self, session_id: &SessionId, conn_id: &ConnectionId) {
        match self.registry.leave(session_id, conn_id) {
            LeaveOutcome::Remaining(members) => {
                self.relay.publish(
                    session_id,
                    &ServerMessage::PeerLeft {
                        connection_id: conn_id.clone(),
                    },
                    None,
                );
                debug!(session = %session_id, conn = %conn_id, remaining = members.len(), "peer left");
            }
            LeaveOutcome::Destroyed => self.close_if_vacant(session_id).await,
            LeaveOutcome::NotMember => {
                debug!(session = %session_id, conn = %conn_id, "leave for non-member");
            }
        }
    }

    /// Close the code behind an emptied session, unless a claimant that was
    /// already admitted by the store has recreated the session meanwhile.
    /// The check and the close are not atomic; a join landing in between
    /// still gets its session, and the closed code only stops new claims.
    async fn close_if_vacant(&self, session_id: &SessionId) {
        if self.registry.contains(session_id) {
            debug!(session = %session_id, "session recreated, keeping code open");
            return;
        }
        let pairing = &*self.pairing;
        if let Err(e) = self.retry.run("close", || pairing.close(session_id)).await {
            // TTL expiry still cleans the record up.
            warn!(session = %session_id, error = %e, "failed to close code");
        }
    }
}
