//! Wiring and the accept loop.

use std::sync::Arc;
use std::time::Duration;

use codepair_common::StoreError;
use codepair_config::CodepairConfig;
use codepair_core::{
    store, Clock, LifecycleHandler, PairingManager, PairingMetrics, RelayChannel, RetryPolicy,
    SessionRegistry, SystemClock,
};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;

use crate::connection::handle_connection;

/// Per-connection transport settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub handshake_timeout: Duration,
    pub outbound_buffer: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &CodepairConfig) -> Self {
        Self {
            handshake_timeout: Duration::from_secs(config.server.handshake_timeout_secs),
            outbound_buffer: config.relay.outbound_buffer.max(1),
        }
    }
}

/// Assemble store, pairing manager, registry and relay channel.
pub fn build_handler(config: &CodepairConfig) -> Result<Arc<LifecycleHandler>, StoreError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(PairingMetrics::new());
    let store = store::from_config(&config.store, clock.clone())?;

    let pairing = Arc::new(PairingManager::new(
        store,
        clock.clone(),
        config.pairing.clone(),
        config.store.key_prefix.clone(),
        metrics.clone(),
    ));
    let registry = Arc::new(SessionRegistry::new(
        config.pairing.max_members as usize,
        clock,
        metrics.clone(),
    ));
    let relay = Arc::new(RelayChannel::new(registry.clone(), metrics));

    Ok(Arc::new(LifecycleHandler::new(
        pairing,
        registry,
        relay,
        RetryPolicy::from_config(&config.store),
    )))
}

/// Accept connections until `cancel` fires. Open connections are told to
/// close through the same token.
pub async fn run(
    listener: TcpListener,
    handler: Arc<LifecycleHandler>,
    settings: ConnectionSettings,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("accept loop stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let handler = handler.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        match tokio::time::timeout(settings.handshake_timeout, accept_async(stream)).await {
                            Ok(Ok(ws)) => {
                                handle_connection(ws, addr, handler, settings.outbound_buffer, cancel).await
                            }
                            Ok(Err(e)) => {
                                tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                            }
                            Err(_) => {
                                tracing::warn!(peer = %addr, "WS handshake timed out");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::*;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct TestServer {
        url: String,
        addr: std::net::SocketAddr,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    async fn start(settings: ConnectionSettings) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = build_handler(&CodepairConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(listener, handler, settings, cancel.clone()));
        TestServer {
            url: format!("ws://{addr}"),
            addr,
            cancel,
            task,
        }
    }

    async fn client(server: &TestServer) -> Client {
        connect_async(server.url.as_str()).await.unwrap().0
    }

    async fn send(ws: &mut Client, value: Value) {
        ws.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("ws error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn stop(server: TestServer) {
        server.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), server.task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn two_clients_pair_relay_and_part() {
        let server = start(ConnectionSettings::from_config(&CodepairConfig::default())).await;
        let mut host = client(&server).await;
        let mut guest = client(&server).await;

        send(&mut host, json!({"type": "issue-code"})).await;
        let issued = recv(&mut host).await;
        assert_eq!(issued["type"], "code-issued");
        assert_eq!(issued["expires_in_seconds"], 600);
        let code = issued["code"].as_str().unwrap().to_string();

        send(&mut guest, json!({"type": "join-with-code", "code": code})).await;
        let paired = recv(&mut guest).await;
        assert_eq!(paired["type"], "paired");
        let session_id = paired["session_id"].clone();

        send(&mut host, json!({"type": "join-with-code", "code": code})).await;
        let paired = recv(&mut host).await;
        assert_eq!(paired["type"], "paired");
        assert_eq!(paired["session_id"], session_id);
        let joined = recv(&mut guest).await;
        assert_eq!(joined["type"], "peer-joined");

        send(
            &mut guest,
            json!({"type": "relay", "event": "msg", "payload": {"text": "hi"}}),
        )
        .await;
        let relayed = recv(&mut host).await;
        assert_eq!(relayed["type"], "relay");
        assert_eq!(relayed["event"], "msg");
        assert_eq!(relayed["payload"], json!({"text": "hi"}));

        guest.close(None).await.unwrap();
        let left = recv(&mut host).await;
        assert_eq!(left["type"], "peer-left");

        stop(server).await;
    }

    #[tokio::test]
    async fn third_client_is_told_code_was_used() {
        let server = start(ConnectionSettings::from_config(&CodepairConfig::default())).await;
        let mut host = client(&server).await;
        let mut guest = client(&server).await;
        let mut late = client(&server).await;

        send(&mut host, json!({"type": "issue-code", "ttl_secs": 30})).await;
        let code = recv(&mut host).await["code"].as_str().unwrap().to_string();

        send(&mut guest, json!({"type": "join-with-code", "code": code})).await;
        assert_eq!(recv(&mut guest).await["type"], "paired");

        send(&mut late, json!({"type": "join-with-code", "code": code})).await;
        let rejected = recv(&mut late).await;
        assert_eq!(rejected["type"], "pairing-error");
        assert_eq!(rejected["kind"], "already-claimed");

        stop(server).await;
    }

    #[tokio::test]
    async fn malformed_frame_gets_error_and_connection_survives() {
        let server = start(ConnectionSettings::from_config(&CodepairConfig::default())).await;
        let mut ws = client(&server).await;

        ws.send(Message::Text("not json".to_string().into())).await.unwrap();
        assert_eq!(recv(&mut ws).await["type"], "error");

        send(&mut ws, json!({"type": "launch-missiles"})).await;
        assert_eq!(recv(&mut ws).await["type"], "error");

        send(&mut ws, json!({"type": "ping"})).await;
        assert_eq!(recv(&mut ws).await["type"], "pong");

        stop(server).await;
    }

    #[tokio::test]
    async fn stalled_handshake_is_dropped() {
        let server = start(ConnectionSettings {
            handshake_timeout: Duration::from_millis(100),
            outbound_buffer: 8,
        })
        .await;

        let mut tcp = TcpStream::connect(server.addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), tcp.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));

        stop(server).await;
    }
}
