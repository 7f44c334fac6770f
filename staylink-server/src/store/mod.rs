//! Persistence adapter for conversations and messages.
//!
//! The router talks to storage through the object-safe [`ChatStore`] trait so
//! the event handling logic can be exercised against the in-memory
//! implementation while production runs on PostgreSQL.

use async_trait::async_trait;
use shared::models::{Conversation, Message};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;

/// Cap applied when the caller does not specify one.
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;

#[derive(Debug, Error)]
pub enum ChatStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
}

pub type ChatStoreResult<T> = Result<T, ChatStoreError>;

/// Result of an accepted send: the stored message plus the participant list,
/// so the caller can compute the fan-out set without a second read.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: Message,
    pub participants: Vec<String>,
}

/// Storage operations owned by the messaging core.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Look up the conversation for an unordered participant pair, creating
    /// it with an empty unread set when absent. Concurrent first calls for
    /// the same pair must resolve to a single conversation.
    async fn find_or_create_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> ChatStoreResult<Conversation>;

    /// All conversations the user participates in, newest activity first,
    /// with participant display data resolved.
    async fn list_conversations(&self, user_id: &str) -> ChatStoreResult<Vec<Conversation>>;

    /// Insert a message and apply the conversation transition
    /// (`last_message`, `updated_at`, unread set: sender removed, every
    /// other participant added) as one atomic unit. Nothing may be emitted
    /// downstream if any part fails.
    async fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> ChatStoreResult<SendOutcome>;

    /// The most recent `limit` messages, returned in ascending `created_at`
    /// order.
    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> ChatStoreResult<Vec<Message>>;

    /// [`ChatStore::list_messages`] with [`DEFAULT_MESSAGE_LIMIT`] applied.
    async fn list_recent_messages(&self, conversation_id: &str) -> ChatStoreResult<Vec<Message>> {
        self.list_messages(conversation_id, DEFAULT_MESSAGE_LIMIT)
            .await
    }

    /// Idempotently remove the user from the conversation's unread set.
    async fn mark_read(&self, conversation_id: &str, user_id: &str) -> ChatStoreResult<()>;
}

/// Normalize an unordered participant pair into a stable ordered form so
/// `{A,B}` and `{B,A}` address the same conversation row.
#[must_use]
pub fn normalize_pair<'a>(user_a: &'a str, user_b: &'a str) -> (&'a str, &'a str) {
    if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    }
}
