use serde::{Deserialize, Serialize};

use super::{Timestamp, UserSummary};

/// A two-party conversation document.
///
/// The participant pair is unordered for lookup purposes: the pair `{A,B}`
/// always resolves to the same conversation as `{B,A}`. `unread_by` has set
/// semantics and is always a subset of the participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier for the conversation.
    #[serde(rename = "_id")]
    pub id: String,

    /// The two participants, with display data resolved where available.
    pub participants: Vec<UserSummary>,

    /// Body of the most recent message; a denormalized, stale-tolerant cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,

    /// User ids that have not yet acknowledged the latest state.
    pub unread_by: Vec<String>,

    /// Bumped on every accepted message.
    pub updated_at: Timestamp,
}

impl Conversation {
    /// Whether the given user is one of the two participants.
    #[must_use]
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    /// Whether the given user still has unseen activity here.
    #[must_use]
    pub fn is_unread_for(&self, user_id: &str) -> bool {
        self.unread_by.iter().any(|id| id == user_id)
    }
}

/// Request shape for the marketplace `POST /conversations` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    /// The other participant; the current user is taken from the session.
    pub participant_id: String,
}

/// Response shape for `POST /conversations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResponse {
    pub conversation_id: String,
}

/// Response shape for `GET /conversations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

/// Request shape for the idempotent `POST /read` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub conversation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> Conversation {
        Conversation {
            id: "c1".into(),
            participants: vec![UserSummary::bare("u1"), UserSummary::bare("u2")],
            last_message: Some("see you then".into()),
            unread_by: vec!["u2".into()],
            updated_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()),
        }
    }

    #[test]
    fn test_conversation_participant_lookup() {
        let conversation = sample();

        assert!(conversation.has_participant("u1"));
        assert!(conversation.has_participant("u2"));
        assert!(!conversation.has_participant("u3"));
    }

    #[test]
    fn test_conversation_unread_lookup() {
        let conversation = sample();

        assert!(conversation.is_unread_for("u2"));
        assert!(!conversation.is_unread_for("u1"));
    }

    #[test]
    fn test_conversation_serialization_matches_wire_contract() {
        let json = serde_json::to_string(&sample()).unwrap();

        assert!(json.contains("\"_id\":\"c1\""));
        assert!(json.contains("\"lastMessage\":\"see you then\""));
        assert!(json.contains("\"unreadBy\":[\"u2\"]"));
        assert!(json.contains("\"updatedAt\""));
    }

    #[test]
    fn test_conversation_round_trip() {
        let conversation = sample();
        let serialized = serde_json::to_string(&conversation).unwrap();
        let deserialized: Conversation = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, conversation);
    }
}
