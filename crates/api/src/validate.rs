use serde_json::Value;
use thiserror::Error;

use crate::{AuthorRole, ConversationId, Message, MessageId, MessageRecord, wire::ConversationRecord};

/// Why a backend record was not admitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordError {
    #[error("malformed record: {reason}")]
    Malformed { reason: String },
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("message {id} belongs to conversation {actual}, expected {expected}")]
    ForeignConversation {
        id: MessageId,
        expected: ConversationId,
        actual: ConversationId,
    },
}

/// Messages that survived validation plus the reasons the rest were dropped.
#[derive(Debug, Clone, Default)]
pub struct MessageBatch {
    pub messages: Vec<Message>,
    pub rejected: Vec<RecordError>,
}

/// Turn one wire record into a [`Message`] scoped to `conversation`.
pub fn validate_message(
    record: MessageRecord,
    conversation: &ConversationId,
) -> Result<Message, RecordError> {
    let id = MessageId(record.id.ok_or(RecordError::MissingField { field: "id" })?);
    let created_at = record
        .created_at
        .ok_or(RecordError::MissingField { field: "created_at" })?;
    let body = record
        .message
        .ok_or(RecordError::MissingField { field: "message" })?;
    let is_admin = record
        .is_admin
        .ok_or(RecordError::MissingField { field: "is_admin" })?;

    if let Some(chat) = record.chat {
        let actual = ConversationId(chat);
        if &actual != conversation {
            return Err(RecordError::ForeignConversation {
                id,
                expected: conversation.clone(),
                actual,
            });
        }
    }

    Ok(Message {
        id,
        conversation_id: conversation.clone(),
        author: AuthorRole::from_is_admin(is_admin),
        body,
        created_at,
    })
}

/// Validate a list of raw JSON records, keeping the good ones in input order.
pub fn validate_batch(values: Vec<Value>, conversation: &ConversationId) -> MessageBatch {
    let mut batch = MessageBatch::default();
    for value in values {
        let parsed = serde_json::from_value::<MessageRecord>(value)
            .map_err(|e| RecordError::Malformed {
                reason: e.to_string(),
            })
            .and_then(|record| validate_message(record, conversation));
        match parsed {
            Ok(message) => batch.messages.push(message),
            Err(e) => batch.rejected.push(e),
        }
    }
    batch
}

/// A conversation handle together with the messages bundled in its record.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub id: ConversationId,
    pub bundle: MessageBatch,
}

/// Decode a conversation record. `None` means the backend has no conversation.
pub fn validate_conversation(record: ConversationRecord) -> Option<ConversationSnapshot> {
    let id = ConversationId(record.id?);
    let bundle = validate_batch(record.messages, &id);
    Some(ConversationSnapshot { id, bundle })
}
