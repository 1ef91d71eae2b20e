//! JSON records exchanged with the chat backend.
//!
//! Every field of an incoming record is optional here; [`crate::validate`]
//! decides what a usable record looks like.

use serde::{Deserialize, Serialize};

use crate::{ConversationId, RecordId, Timestamp};

/// A message as serialized by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Owning conversation. Usually omitted because the endpoint is scoped.
    #[serde(default)]
    pub chat: Option<RecordId>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

/// A conversation as returned by the lookup and start endpoints.
///
/// Messages are kept as raw JSON so one malformed entry cannot fail the whole
/// record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

/// Body of `POST start/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConversationRequest {
    pub visitor_id: String,
    pub website_id: String,
    pub message: String,
}

/// Body of `POST message/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub chat_id: ConversationId,
    pub message: String,
    pub is_admin: bool,
}
