//! Server-side event router.
//!
//! Validates inbound realtime events, drives the persistence transition, and
//! computes the fan-out set. Handler bodies are serial per event; different
//! connections interleave freely, so every conversation mutation goes
//! through the store's atomic primitives rather than local state.
//!
//! Connection lifecycle: `Connected -> Identified -> (Joined)* ->
//! Disconnected`. Identification is idempotent and re-sent by clients after
//! every reconnect because room membership does not survive a disconnect.

use std::sync::Arc;

use metrics::counter;
use shared::events::{
    AckStatus, ClientEvent, IdentifyAck, JoinRoomAck, SendMessageAck, SendMessageRequest,
    ServerEvent,
};
use tracing::{info, warn};

use crate::registry::{ConnectionId, RoomRegistry};
use crate::store::ChatStore;

pub struct EventRouter {
    store: Arc<dyn ChatStore>,
    registry: Arc<dyn RoomRegistry>,
}

impl EventRouter {
    pub fn new(store: Arc<dyn ChatStore>, registry: Arc<dyn RoomRegistry>) -> Self {
        Self { store, registry }
    }

    /// The injected registry, shared with the transport layer for
    /// connection registration and teardown.
    #[must_use]
    pub fn registry(&self) -> Arc<dyn RoomRegistry> {
        Arc::clone(&self.registry)
    }

    /// Dispatch one inbound event. Returns the ack to deliver to the
    /// originating connection, when the event has one.
    pub async fn handle_event(
        &self,
        conn: ConnectionId,
        event: ClientEvent,
    ) -> Option<ServerEvent> {
        match event {
            ClientEvent::Identify(request) => {
                self.registry.join_room(conn, &request.user_id).await;
                Some(ServerEvent::Identified(IdentifyAck {
                    status: AckStatus::Ok,
                    user_id: request.user_id,
                }))
            }
            // No membership check beyond possession of the id; the upstream
            // contract is deliberately permissive here.
            ClientEvent::JoinRoom(request) => {
                self.registry.join_room(conn, &request.room_id).await;
                Some(ServerEvent::RoomJoined(JoinRoomAck {
                    status: AckStatus::Ok,
                    room: request.room_id,
                }))
            }
            ClientEvent::SendMessage(request) => Some(self.handle_send(request).await),
            ClientEvent::BookingRequest(notice) => {
                self.registry
                    .emit_to_room(
                        &notice.owner_id,
                        &ServerEvent::ReceiveBookingRequest(notice.pending),
                    )
                    .await;
                counter!("staylink_booking_events_total", "kind" => "request").increment(1);
                None
            }
            ClientEvent::BookingStatusUpdate(notice) => {
                self.registry
                    .emit_to_room(
                        &notice.buyer_id,
                        &ServerEvent::ReceiveBookingStatusUpdate(notice.pending),
                    )
                    .await;
                counter!("staylink_booking_events_total", "kind" => "status").increment(1);
                None
            }
            ClientEvent::BookingCleared(notice) => {
                self.registry
                    .emit_to_room(
                        &notice.user_id,
                        &ServerEvent::ReceiveBookingCleared(notice.pending_id),
                    )
                    .await;
                counter!("staylink_booking_events_total", "kind" => "cleared").increment(1);
                None
            }
        }
    }

    /// Release everything the connection held. In-flight sends are not
    /// cancelled; fan-out already dispatched stands.
    pub async fn handle_disconnect(&self, conn: ConnectionId) {
        self.registry.drop_connection(conn).await;
    }

    async fn handle_send(&self, request: SendMessageRequest) -> ServerEvent {
        let (conversation_id, sender_id, content) = match validate_send(&request) {
            Ok(fields) => fields,
            Err(message) => {
                counter!("staylink_sends_rejected_total").increment(1);
                return ServerEvent::MessageSent(SendMessageAck::error(message));
            }
        };

        // Persistence failure must prevent fan-out; the sender alone sees
        // the error.
        let outcome = match self
            .store
            .append_message(conversation_id, sender_id, content)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(conversation_id, %error, "failed to persist message");
                counter!("staylink_sends_failed_total").increment(1);
                return ServerEvent::MessageSent(SendMessageAck::error(error.to_string()));
            }
        };

        let payload = ServerEvent::ReceiveMessage(outcome.message.clone());

        // Dual fan-out: the conversation room covers anyone currently
        // viewing; identity rooms cover connected members who are not, so
        // their global unread badges still update.
        self.registry.emit_to_room(conversation_id, &payload).await;
        for participant in &outcome.participants {
            self.registry.emit_to_room(participant, &payload).await;
        }

        info!(
            conversation_id,
            message_id = %outcome.message.id,
            "message persisted and fanned out"
        );
        counter!("staylink_messages_sent_total").increment(1);

        ServerEvent::MessageSent(SendMessageAck::sent(outcome.message.id))
    }
}

fn validate_send(request: &SendMessageRequest) -> Result<(&str, &str, &str), &'static str> {
    let conversation_id = request
        .conversation_id
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or("conversationId is required")?;
    let sender_id = request
        .sender_id
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or("senderId is required")?;
    let content = request
        .content
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .ok_or("content is required")?;

    Ok((conversation_id, sender_id, content))
}
