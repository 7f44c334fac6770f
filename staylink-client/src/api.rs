//! REST access to the marketplace backend.

use async_trait::async_trait;
use shared::models::{
    Conversation, ConversationsResponse, CreateConversationRequest, CreateConversationResponse,
    MarkReadRequest, Message, MessagesResponse, MeResponse, UserSummary,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The marketplace endpoints the messaging context consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Resolve the marketplace-local identity of the current session.
    async fn me(&self) -> Result<UserSummary, ApiError>;

    /// Find or create the conversation with the given participant.
    async fn ensure_conversation(&self, participant_id: &str) -> Result<String, ApiError>;

    /// All conversations for the current user, newest activity first.
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    /// The recent message window for one conversation, ascending.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ApiError>;

    /// Idempotently clear the current user's unread flag.
    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError>;
}

/// `reqwest`-backed implementation against the marketplace REST API.
#[derive(Clone, Debug)]
pub struct RestMarketplaceApi {
    base_url: String,
    client: reqwest::Client,
}

impl RestMarketplaceApi {
    /// Create a new API client with the provided base URL.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl MarketplaceApi for RestMarketplaceApi {
    async fn me(&self) -> Result<UserSummary, ApiError> {
        let response: MeResponse = self
            .client
            .get(self.api_url("me"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.user)
    }

    async fn ensure_conversation(&self, participant_id: &str) -> Result<String, ApiError> {
        let response: CreateConversationResponse = self
            .client
            .post(self.api_url("conversations"))
            .json(&CreateConversationRequest {
                participant_id: participant_id.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.conversation_id)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let response: ConversationsResponse = self
            .client
            .get(self.api_url("conversations"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.conversations)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ApiError> {
        let response: MessagesResponse = self
            .client
            .get(self.api_url("messages"))
            .query(&[("conversationId", conversation_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.messages)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.client
            .post(self.api_url("read"))
            .json(&MarkReadRequest {
                conversation_id: conversation_id.to_string(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
