//! Socket transport behind the messaging context.
//!
//! The context talks to the realtime server through the connector/sink/stream
//! traits so reconnect handling and event dispatch can be tested over plain
//! channels. Production wires in `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use shared::events::{ClientEvent, ServerEvent};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::warn;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to encode event frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection closed")]
    Closed,
}

/// Outbound half of one socket connection.
#[async_trait]
pub trait SocketSink: Send {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError>;
}

/// Inbound half of one socket connection. `None` means the connection ended.
#[async_trait]
pub trait SocketStream: Send {
    async fn next_event(&mut self) -> Option<ServerEvent>;
}

pub type SocketPair = (Box<dyn SocketSink>, Box<dyn SocketStream>);

/// Factory for socket connections; called again on every reconnect attempt.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self) -> Result<SocketPair, TransportError>;
}

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for the realtime server's `/ws` endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self) -> Result<SocketPair, TransportError> {
        let (connection, _response) = connect_async(self.url.as_str()).await?;
        let (sink, stream) = connection.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsStream { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsConnection, WsMessage>,
}

#[async_trait]
impl SocketSink for WsSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let frame = serde_json::to_string(event)?;
        self.sink.send(WsMessage::Text(frame.into())).await?;
        Ok(())
    }
}

struct WsStream {
    stream: SplitStream<WsConnection>,
}

#[async_trait]
impl SocketStream for WsStream {
    async fn next_event(&mut self) -> Option<ServerEvent> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(%error, "socket read failed");
                    return None;
                }
            };

            match frame {
                WsMessage::Text(text) => match serde_json::from_str(&text) {
                    Ok(event) => return Some(event),
                    Err(error) => {
                        // Unknown frames from a newer server are skipped, not
                        // treated as a dead connection.
                        warn!(%error, "discarding unrecognized server frame");
                    }
                },
                WsMessage::Close(_) => return None,
                _ => {}
            }
        }
    }
}
