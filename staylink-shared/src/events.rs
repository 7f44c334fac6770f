//! Socket wire protocol.
//!
//! Every frame on the realtime connection is one JSON object with an `event`
//! name and a `data` payload. Client and server enums cover the full handler
//! set: identification, room joins, message sends, and the directed booking
//! notifications. Acks travel back on the same connection as server events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Message;

/// Events a client may emit to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Subscribe this connection to the sender's identity room.
    Identify(IdentifyRequest),
    /// Subscribe this connection to a conversation room.
    JoinRoom(JoinRoomRequest),
    /// Persist a message and fan it out.
    SendMessage(SendMessageRequest),
    /// Notify a listing owner about a new booking request.
    BookingRequest(BookingRequestNotice),
    /// Notify a buyer that a booking's status changed.
    BookingStatusUpdate(BookingStatusNotice),
    /// Notify a user that a pending booking was cleared.
    BookingCleared(BookingClearedNotice),
}

/// Events the server emits to clients, acks included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Ack for `identify`.
    Identified(IdentifyAck),
    /// Ack for `join-room`.
    RoomJoined(JoinRoomAck),
    /// Ack for `send-message`, success or failure.
    MessageSent(SendMessageAck),
    /// A persisted message fanned out to a room.
    ReceiveMessage(Message),
    /// Relayed booking request payload.
    ReceiveBookingRequest(Value),
    /// Relayed booking status payload.
    ReceiveBookingStatusUpdate(Value),
    /// Id of the pending booking that was cleared.
    ReceiveBookingCleared(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: String,
}

/// Payload of `send-message`.
///
/// Fields are optional on the wire so that an incomplete frame still reaches
/// the router and earns a proper error ack instead of a silent parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessageRequest {
    pub conversation_id: Option<String>,
    pub sender_id: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequestNotice {
    pub owner_id: String,
    pub pending: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingStatusNotice {
    pub buyer_id: String,
    pub pending: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookingClearedNotice {
    pub user_id: String,
    pub pending_id: String,
}

/// Ack status vocabulary shared by all acks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Sent,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyAck {
    pub status: AckStatus,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomAck {
    pub status: AckStatus,
    pub room: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageAck {
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendMessageAck {
    /// Success ack carrying the persisted message id.
    #[must_use]
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Sent,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    /// Failure ack; no message was persisted or fanned out.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            message_id: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timestamp;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_client_event_names_are_kebab_case() {
        let event = ClientEvent::SendMessage(SendMessageRequest {
            conversation_id: Some("c1".into()),
            sender_id: Some("u1".into()),
            content: Some("hi".into()),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"send-message\""));
        assert!(json.contains("\"conversationId\":\"c1\""));
    }

    #[test]
    fn test_identify_round_trip() {
        let event = ClientEvent::Identify(IdentifyRequest {
            user_id: "u1".into(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"identify","data":{"userId":"u1"}}"#);

        let back: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_incomplete_send_message_still_parses() {
        let json = r#"{"event":"send-message","data":{"conversationId":"c1"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();

        match event {
            ClientEvent::SendMessage(request) => {
                assert_eq!(request.conversation_id.as_deref(), Some("c1"));
                assert_eq!(request.sender_id, None);
                assert_eq!(request.content, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_send_ack_skips_absent_fields() {
        let ack = ServerEvent::MessageSent(SendMessageAck::sent("m1"));
        let json = serde_json::to_string(&ack).unwrap();

        assert!(json.contains("\"status\":\"sent\""));
        assert!(json.contains("\"messageId\":\"m1\""));
        assert!(!json.contains("error"));

        let ack = ServerEvent::MessageSent(SendMessageAck::error("content is required"));
        let json = serde_json::to_string(&ack).unwrap();

        assert!(json.contains("\"status\":\"error\""));
        assert!(!json.contains("messageId"));
    }

    #[test]
    fn test_receive_message_payload_shape() {
        let event = ServerEvent::ReceiveMessage(Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "u1".into(),
            content: "hi".into(),
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"receive-message\""));
        assert!(json.contains("\"_id\":\"m1\""));
    }

    #[test]
    fn test_booking_cleared_round_trip() {
        let event = ClientEvent::BookingCleared(BookingClearedNotice {
            user_id: "u9".into(),
            pending_id: "p3".into(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"booking-cleared\""));
        assert!(json.contains("\"pendingId\":\"p3\""));

        let back: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
