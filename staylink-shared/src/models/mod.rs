pub mod conversation;
pub mod message;
pub mod timestamp;
pub mod user;

pub use conversation::{
    Conversation, ConversationsResponse, CreateConversationRequest, CreateConversationResponse,
    MarkReadRequest,
};
pub use message::{Message, MessagesResponse};
pub use timestamp::Timestamp;
pub use user::{MeResponse, UserSummary};
