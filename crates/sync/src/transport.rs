use async_trait::async_trait;
use livechat_api::{
    ConversationId, ConversationSnapshot, Message, MessageBatch, PostMessageRequest,
    StartConversationRequest, Timestamp,
};
use livechat_api_client::{ApiClient, ApiError};

/// The four backend operations the engine consumes.
///
/// Implementations map requests to responses and validate records; they hold
/// no synchronization state of their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Idempotent. `Ok(None)` when the visitor has no conversation yet.
    async fn lookup_conversation(
        &self,
        visitor_id: &str,
    ) -> Result<Option<ConversationSnapshot>, ApiError>;

    /// Not idempotent: creates the conversation and its first message.
    async fn start_conversation(
        &self,
        request: &StartConversationRequest,
    ) -> Result<ConversationSnapshot, ApiError>;

    /// Not idempotent: appends one message.
    async fn post_message(&self, request: &PostMessageRequest) -> Result<Message, ApiError>;

    /// Idempotent incremental fetch.
    async fn list_messages_since(
        &self,
        conversation: &ConversationId,
        since: Timestamp,
    ) -> Result<MessageBatch, ApiError>;
}

#[async_trait]
impl Transport for ApiClient {
    async fn lookup_conversation(
        &self,
        visitor_id: &str,
    ) -> Result<Option<ConversationSnapshot>, ApiError> {
        ApiClient::lookup_conversation(self, visitor_id).await
    }

    async fn start_conversation(
        &self,
        request: &StartConversationRequest,
    ) -> Result<ConversationSnapshot, ApiError> {
        ApiClient::start_conversation(self, request).await
    }

    async fn post_message(&self, request: &PostMessageRequest) -> Result<Message, ApiError> {
        ApiClient::post_message(self, request).await
    }

    async fn list_messages_since(
        &self,
        conversation: &ConversationId,
        since: Timestamp,
    ) -> Result<MessageBatch, ApiError> {
        ApiClient::list_messages_since(self, conversation, since).await
    }
}
