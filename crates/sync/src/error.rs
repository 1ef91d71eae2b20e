use livechat_api::ConversationId;
use livechat_api_client::ApiError;
use thiserror::Error;

/// Failures surfaced to the caller of [`crate::ChatWidget::send`].
///
/// Poll cycles never produce these; they log and wait for the next tick.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("no visitor id configured")]
    NoVisitor,

    #[error("send failed: {0}")]
    Send(#[from] ApiError),

    #[error("backend returned conversation {returned} but {active} is already active")]
    ConversationConflict {
        active: ConversationId,
        returned: ConversationId,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
