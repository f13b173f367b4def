//! Per-connection transport adapter: decode frames, hand them to the
//! lifecycle handler, drain the outbound queue.

use std::net::SocketAddr;
use std::sync::Arc;

use codepair_core::{ClientMessage, LifecycleHandler, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

/// Handle a single WebSocket connection until it closes or the server
/// shuts down, then run disconnect cleanup.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    handler: Arc<LifecycleHandler>,
    outbound_buffer: usize,
    cancel: CancellationToken,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(outbound_buffer);
    let mut conn = handler.connect(tx);

    tracing::info!(peer = %addr, conn = %conn.id(), "client connected");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            // Queued server messages → this client's WebSocket
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.to_json().into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(message) => handler.handle(&mut conn, message).await,
                            Err(e) => handler.reject_invalid(&conn, &e.to_string()),
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        handler.reject_invalid(&conn, "binary frames are not supported");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(
        peer = %addr,
        conn = %conn.id(),
        session = ?conn.session_id(),
        "client disconnected"
    );

    handler.disconnect(conn).await;
}
