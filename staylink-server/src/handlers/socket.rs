//! WebSocket endpoint.
//!
//! One task pumps outbound events from the registry channel onto the socket,
//! the handler task itself drains inbound frames. A malformed frame earns an
//! error ack on the same connection; the connection stays up.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Extension;
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use shared::events::{ClientEvent, SendMessageAck, ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::router::EventRouter;

/// Outbound buffer per connection; emit backpressure kicks in beyond this.
const OUTBOUND_BUFFER: usize = 64;

pub async fn ws_handler(
    Extension(router): Extension<Arc<EventRouter>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(socket, router))
}

async fn handle_socket(socket: WebSocket, router: Arc<EventRouter>) {
    let conn = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    router.registry().register(conn, tx.clone()).await;
    counter!("staylink_connections_total").increment(1);
    gauge!("staylink_connections_active").increment(1.0);
    debug!(%conn, "socket connected");

    let outbound = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(%error, "failed to encode server event");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(_) => break,
        };

        match frame {
            WsMessage::Text(text) => {
                let event: ClientEvent = match serde_json::from_str(&text) {
                    Ok(event) => event,
                    Err(error) => {
                        debug!(%conn, %error, "discarding malformed frame");
                        counter!("staylink_frames_malformed_total").increment(1);
                        let ack = ServerEvent::MessageSent(SendMessageAck::error(
                            "malformed event frame",
                        ));
                        if tx.send(ack).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                if let Some(ack) = router.handle_event(conn, event).await {
                    if tx.send(ack).await.is_err() {
                        break;
                    }
                }
            }
            WsMessage::Close(_) => break,
            // Ping/pong is answered by axum itself; binary frames are not
            // part of the protocol.
            _ => {}
        }
    }

    router.handle_disconnect(conn).await;
    outbound.abort();
    gauge!("staylink_connections_active").decrement(1.0);
    debug!(%conn, "socket disconnected");
}
