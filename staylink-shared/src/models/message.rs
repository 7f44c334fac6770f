use serde::{Deserialize, Serialize};

use super::Timestamp;

/// A single chat message.
///
/// Messages are immutable once created and ordered by `created_at` ascending
/// within their conversation. This struct doubles as the `receive-message`
/// fan-out payload, so field names match the socket contract exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier for the message.
    #[serde(rename = "_id")]
    pub id: String,

    /// ID of the conversation this message belongs to.
    pub conversation_id: String,

    /// ID of the user who sent the message.
    pub sender_id: String,

    /// The message body. Never empty for an accepted message.
    pub content: String,

    /// Timestamp when the message was persisted.
    pub created_at: Timestamp,
}

/// Response shape for the marketplace `GET /messages` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> Message {
        Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "u1".into(),
            content: "hi".into(),
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()),
        }
    }

    #[test]
    fn test_message_serialization_matches_wire_contract() {
        let json = serde_json::to_string(&sample()).unwrap();

        assert!(json.contains("\"_id\":\"m1\""));
        assert!(json.contains("\"conversationId\":\"c1\""));
        assert!(json.contains("\"senderId\":\"u1\""));
        assert!(json.contains("\"createdAt\":\"2025-03-08T14:30:00Z\""));
    }

    #[test]
    fn test_message_round_trip() {
        let message = sample();
        let serialized = serde_json::to_string(&message).unwrap();
        let deserialized: Message = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, message);
    }
}
