//! In-memory chat store.
//!
//! Backs the router and property tests; mirrors the PostgreSQL
//! implementation's semantics, including the unordered-pair identity and the
//! set-based unread transition, behind a single async mutex.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::models::{Conversation, Message, Timestamp, UserSummary};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ChatStore, ChatStoreError, ChatStoreResult, SendOutcome, normalize_pair};

#[derive(Debug, Clone)]
struct ConversationRecord {
    id: String,
    participant_lo: String,
    participant_hi: String,
    last_message: Option<String>,
    unread_by: BTreeSet<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    conversations: HashMap<String, ConversationRecord>,
    pair_index: HashMap<(String, String), String>,
    messages: HashMap<String, Vec<Message>>,
    user_names: HashMap<String, String>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Timestamps must be strictly increasing per store so message order by
    /// `created_at` matches insertion order even under a coarse clock.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn to_conversation(&self, record: &ConversationRecord) -> Conversation {
        let summary = |id: &str| UserSummary {
            id: id.to_string(),
            name: self.user_names.get(id).cloned(),
        };

        Conversation {
            id: record.id.clone(),
            participants: vec![
                summary(&record.participant_lo),
                summary(&record.participant_hi),
            ],
            last_message: record.last_message.clone(),
            unread_by: record.unread_by.iter().cloned().collect(),
            updated_at: Timestamp(record.updated_at),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryChatStore {
    inner: Mutex<MemoryState>,
}

impl MemoryChatStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register display data the way the marketplace projection would.
    pub async fn insert_user(&self, id: impl Into<String>, name: impl Into<String>) {
        let mut state = self.inner.lock().await;
        state.user_names.insert(id.into(), name.into());
    }

    fn new_object_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn find_or_create_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> ChatStoreResult<Conversation> {
        let (lo, hi) = normalize_pair(user_a, user_b);
        let key = (lo.to_string(), hi.to_string());

        let mut state = self.inner.lock().await;
        if let Some(id) = state.pair_index.get(&key) {
            let record = state.conversations[id].clone();
            return Ok(state.to_conversation(&record));
        }

        let record = ConversationRecord {
            id: Self::new_object_id(),
            participant_lo: lo.to_string(),
            participant_hi: hi.to_string(),
            last_message: None,
            unread_by: BTreeSet::new(),
            updated_at: state.next_timestamp(),
        };

        state.pair_index.insert(key, record.id.clone());
        state
            .conversations
            .insert(record.id.clone(), record.clone());

        Ok(state.to_conversation(&record))
    }

    async fn list_conversations(&self, user_id: &str) -> ChatStoreResult<Vec<Conversation>> {
        let state = self.inner.lock().await;

        let mut records: Vec<&ConversationRecord> = state
            .conversations
            .values()
            .filter(|record| {
                record.participant_lo == user_id || record.participant_hi == user_id
            })
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(records
            .into_iter()
            .map(|record| state.to_conversation(record))
            .collect())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> ChatStoreResult<SendOutcome> {
        let mut state = self.inner.lock().await;

        if !state.conversations.contains_key(conversation_id) {
            return Err(ChatStoreError::NotFound(conversation_id.to_string()));
        }

        let created_at = state.next_timestamp();
        let message = Message {
            id: Self::new_object_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: Timestamp(created_at),
        };

        let record = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ChatStoreError::NotFound(conversation_id.to_string()))?;

        record.last_message = Some(content.to_string());
        record.updated_at = created_at;
        record.unread_by.remove(sender_id);

        let participants = vec![
            record.participant_lo.clone(),
            record.participant_hi.clone(),
        ];
        for participant in participants.iter().filter(|p| *p != sender_id) {
            record.unread_by.insert(participant.clone());
        }

        state
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());

        Ok(SendOutcome {
            message,
            participants,
        })
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> ChatStoreResult<Vec<Message>> {
        let state = self.inner.lock().await;
        let messages = state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();

        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn mark_read(&self, conversation_id: &str, user_id: &str) -> ChatStoreResult<()> {
        let mut state = self.inner.lock().await;
        if let Some(record) = state.conversations.get_mut(conversation_id) {
            record.unread_by.remove(user_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn find_or_create_treats_pair_as_unordered() {
        let store = MemoryChatStore::new();

        let first = store.find_or_create_conversation("u1", "u2").await.unwrap();
        let second = store.find_or_create_conversation("u2", "u1").await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.unread_by.is_empty());
    }

    #[tokio::test]
    async fn concurrent_first_calls_create_one_conversation() {
        let store = Arc::new(MemoryChatStore::new());

        let a = Arc::clone(&store);
        let b = Arc::clone(&store);
        let (first, second) = tokio::join!(
            tokio::spawn(async move { a.find_or_create_conversation("u1", "u2").await }),
            tokio::spawn(async move { b.find_or_create_conversation("u2", "u1").await }),
        );

        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();
        assert_eq!(first.id, second.id);

        let listed = store.list_conversations("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn append_message_normalizes_unread_set() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create_conversation("u1", "u2").await.unwrap();

        // Pre-existing unread state for the sender must be cleared.
        store
            .append_message(&conversation.id, "u2", "first")
            .await
            .unwrap();
        let outcome = store
            .append_message(&conversation.id, "u1", "reply")
            .await
            .unwrap();

        assert_eq!(outcome.message.content, "reply");
        assert_eq!(outcome.participants, vec!["u1", "u2"]);

        let listed = store.list_conversations("u1").await.unwrap();
        assert_eq!(listed[0].unread_by, vec!["u2".to_string()]);
        assert_eq!(listed[0].last_message.as_deref(), Some("reply"));
    }

    #[tokio::test]
    async fn append_message_bumps_updated_at() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create_conversation("u1", "u2").await.unwrap();

        store
            .append_message(&conversation.id, "u1", "hello")
            .await
            .unwrap();

        let listed = store.list_conversations("u2").await.unwrap();
        assert!(listed[0].updated_at > conversation.updated_at);
    }

    #[tokio::test]
    async fn append_message_to_unknown_conversation_fails() {
        let store = MemoryChatStore::new();

        let result = store.append_message("missing", "u1", "hi").await;
        assert!(matches!(result, Err(ChatStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create_conversation("u1", "u2").await.unwrap();
        store
            .append_message(&conversation.id, "u1", "hi")
            .await
            .unwrap();

        store.mark_read(&conversation.id, "u2").await.unwrap();
        let listed = store.list_conversations("u2").await.unwrap();
        assert!(listed[0].unread_by.is_empty());

        // Second call is a no-op, not an error.
        store.mark_read(&conversation.id, "u2").await.unwrap();
        let listed = store.list_conversations("u2").await.unwrap();
        assert!(listed[0].unread_by.is_empty());
    }

    #[tokio::test]
    async fn list_messages_returns_recent_window_in_ascending_order() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create_conversation("u1", "u2").await.unwrap();

        for index in 0..10 {
            store
                .append_message(&conversation.id, "u1", &format!("message {index}"))
                .await
                .unwrap();
        }

        let window = store.list_messages(&conversation.id, 3).await.unwrap();
        assert_eq!(window.len(), 3);

        // The most recent three, oldest of them first.
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 7", "message 8", "message 9"]);

        for pair in window.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn list_recent_messages_caps_at_the_default_window() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create_conversation("u1", "u2").await.unwrap();

        let total = crate::store::DEFAULT_MESSAGE_LIMIT + 5;
        for index in 0..total {
            store
                .append_message(&conversation.id, "u1", &format!("message {index}"))
                .await
                .unwrap();
        }

        let window = store.list_recent_messages(&conversation.id).await.unwrap();
        assert_eq!(
            window.len(),
            usize::try_from(crate::store::DEFAULT_MESSAGE_LIMIT).unwrap()
        );

        // The oldest rows fall outside the window; the newest is last.
        assert_eq!(window[0].content, "message 5");
        assert_eq!(
            window.last().unwrap().content,
            format!("message {}", total - 1)
        );
    }

    #[tokio::test]
    async fn list_conversations_orders_by_recent_activity() {
        let store = MemoryChatStore::new();
        store.insert_user("u2", "Blake").await;

        let first = store.find_or_create_conversation("u1", "u2").await.unwrap();
        let second = store.find_or_create_conversation("u1", "u3").await.unwrap();

        store.append_message(&first.id, "u2", "newest").await.unwrap();

        let listed = store.list_conversations("u1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);

        // Display data is resolved where the projection has it.
        let blake = listed[0]
            .participants
            .iter()
            .find(|p| p.id == "u2")
            .unwrap();
        assert_eq!(blake.name.as_deref(), Some("Blake"));
    }
}
