//! Relay channel: per-session fan-out to registered connections.

use std::sync::Arc;

use codepair_common::{ConnectionId, SessionId};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::metrics::PairingMetrics;
use crate::protocol::ServerMessage;
use crate::registry::SessionRegistry;

/// Outbound queue of one connection. The transport drains it.
pub type Outbox = mpsc::Sender<ServerMessage>;

pub struct RelayChannel {
    outboxes: DashMap<ConnectionId, Outbox>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<PairingMetrics>,
}

impl RelayChannel {
    pub fn new(registry: Arc<SessionRegistry>, metrics: Arc<PairingMetrics>) -> Self {
        Self {
            outboxes: DashMap::new(),
            registry,
            metrics,
        }
    }

    pub fn attach(&self, connection_id: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(connection_id, outbox);
    }

    pub fn detach(&self, connection_id: &ConnectionId) {
        self.outboxes.remove(connection_id);
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Queue `message` for one connection without waiting. Returns whether
    /// it was queued.
    pub fn send_to(&self, connection_id: &ConnectionId, message: ServerMessage) -> bool {
        // Clone the sender so no map guard is held while queueing.
        let Some(outbox) = self.outboxes.get(connection_id).map(|o| o.clone()) else {
            debug!(conn = %connection_id, "no outbox for connection");
            return false;
        };
        match outbox.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.delivery_dropped();
                warn!(conn = %connection_id, "outbound queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.delivery_dropped();
                debug!(conn = %connection_id, "outbound queue closed, message dropped");
                false
            }
        }
    }

    /// Deliver `message` to every member of `session_id` except `exclude`.
    ///
    /// Membership is snapshotted first and no lock is held while delivering.
    /// Each recipient gets messages in the order publish was called; a full
    /// or closed recipient only loses its own copy. Returns how many copies
    /// were queued. An unknown session simply has no recipients.
    pub fn publish(
        &self,
        session_id: &SessionId,
        message: &ServerMessage,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let members = self.registry.members(session_id);
        members
            .iter()
            .filter(|member| Some(*member) != exclude)
            .filter(|member| self.send_to(member, message.clone()))
            .count()
    }

    /// Forward a client event to the rest of its session.
    pub fn relay(
        &self,
        session_id: &SessionId,
        sender: &ConnectionId,
        event: String,
        payload: Value,
    ) -> usize {
        let message = ServerMessage::Relay {
            event,
            payload,
            sender_id: sender.clone(),
        };
        let delivered = self.publish(session_id, &message, Some(sender));
        self.metrics.event_relayed();
        delivered
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    struct Fixture {
        registry: Arc<SessionRegistry>,
        relay: RelayChannel,
        metrics: Arc<PairingMetrics>,
    }

    fn fixture() -> Fixture {
        let metrics = Arc::new(PairingMetrics::new());
        let registry = Arc::new(SessionRegistry::new(
            4,
            Arc::new(ManualClock::default()),
            metrics.clone(),
        ));
        let relay = RelayChannel::new(registry.clone(), metrics.clone());
        Fixture {
            registry,
            relay,
            metrics,
        }
    }

    fn sid() -> SessionId {
        SessionId::for_code("AB12", 1)
    }

    fn member(f: &Fixture, name: &str, buffer: usize) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId::from(name);
        let (tx, rx) = mpsc::channel(buffer);
        f.relay.attach(id.clone(), tx);
        f.registry.join(&sid(), &id).unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn publish_excludes_sender() {
        let f = fixture();
        let (a, mut rx_a) = member(&f, "a", 8);
        let (_b, mut rx_b) = member(&f, "b", 8);

        let delivered = f.relay.relay(&sid(), &a, "msg".into(), json!({"text": "hi"}));
        assert_eq!(delivered, 1);

        let got = rx_b.recv().await.unwrap();
        assert_eq!(
            got,
            ServerMessage::Relay {
                event: "msg".into(),
                payload: json!({"text": "hi"}),
                sender_id: a.clone(),
            }
        );
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_exclusion_reaches_everyone() {
        let f = fixture();
        let (_a, mut rx_a) = member(&f, "a", 8);
        let (_b, mut rx_b) = member(&f, "b", 8);

        assert_eq!(f.relay.publish(&sid(), &ServerMessage::Pong, None), 2);
        assert_eq!(rx_a.recv().await.unwrap(), ServerMessage::Pong);
        assert_eq!(rx_b.recv().await.unwrap(), ServerMessage::Pong);
    }

    #[test]
    fn publish_to_destroyed_session_reaches_nobody() {
        let f = fixture();
        let (a, _rx) = member(&f, "a", 8);
        f.registry.leave(&sid(), &a);
        assert_eq!(f.relay.publish(&sid(), &ServerMessage::Pong, None), 0);
    }

    #[tokio::test]
    async fn full_recipient_does_not_block_others() {
        let f = fixture();
        let (a, _rx_a) = member(&f, "a", 8);
        let (_slow, _rx_slow) = member(&f, "slow", 1);
        let (_fast, mut rx_fast) = member(&f, "fast", 8);

        for i in 0..3 {
            f.relay.relay(&sid(), &a, "tick".into(), json!(i));
        }

        for i in 0..3 {
            match rx_fast.recv().await.unwrap() {
                ServerMessage::Relay { payload, .. } => assert_eq!(payload, json!(i)),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(f.metrics.snapshot().deliveries_dropped, 2);
        assert_eq!(f.metrics.snapshot().events_relayed, 3);
    }

    #[test]
    fn closed_recipient_counts_as_dropped() {
        let f = fixture();
        let (a, _rx_a) = member(&f, "a", 8);
        let (_b, rx_b) = member(&f, "b", 8);
        drop(rx_b);

        assert_eq!(f.relay.relay(&sid(), &a, "x".into(), Value::Null), 0);
        assert_eq!(f.metrics.snapshot().deliveries_dropped, 1);
    }

    #[test]
    fn send_to_detached_connection_fails() {
        let f = fixture();
        let (a, _rx) = member(&f, "a", 8);
        f.relay.detach(&a);
        assert!(!f.relay.send_to(&a, ServerMessage::Pong));
        assert_eq!(f.relay.connection_count(), 0);
    }

    #[tokio::test]
    async fn per_recipient_order_follows_publish_order() {
        let f = fixture();
        let (a, _rx_a) = member(&f, "a", 64);
        let (b, _rx_b) = member(&f, "b", 64);
        let (_c, mut rx_c) = member(&f, "c", 64);

        for i in 0..10 {
            let sender = if i % 2 == 0 { &a } else { &b };
            f.relay.relay(&sid(), sender, "n".into(), json!(i));
        }
        for i in 0..10 {
            match rx_c.recv().await.unwrap() {
                ServerMessage::Relay { payload, .. } => assert_eq!(payload, json!(i)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
