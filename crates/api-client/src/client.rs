use std::time::Duration;

use livechat_api::validate::{validate_batch, validate_conversation, validate_message};
use livechat_api::*;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, Result};
use crate::retry::{RetryConfig, retry_unsent};

/// Typed HTTP client for the chat backend.
///
/// `base_url` is the chat root (for example `https://example.com/api/chat`);
/// every endpoint is resolved relative to it. Responses are validated here, so
/// callers only ever see [`Message`]s and [`ConversationSnapshot`]s.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl ApiClient {
    /// Create a new client with the given base URL and per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn set_retry(&mut self, retry: RetryConfig) {
        self.retry = retry;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // ── Conversations ─────────────────────────────────────────────────────

    /// Look up the visitor's conversation. `Ok(None)` when there is none.
    pub async fn lookup_conversation(&self, visitor_id: &str) -> Result<Option<ConversationSnapshot>> {
        let path = format!("visitor/{}/chat/", urlencoding::encode(visitor_id));
        let resp = self
            .client
            .get(self.url(&path))
            .header("Accept", "application/json")
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record: Option<ConversationRecord> = parse_response(resp).await?;
        Ok(record.and_then(validate_conversation))
    }

    /// Create a conversation together with its first message.
    pub async fn start_conversation(
        &self,
        req: &StartConversationRequest,
    ) -> Result<ConversationSnapshot> {
        let record: ConversationRecord = retry_unsent(&self.retry, "start conversation", || async {
            let resp = self
                .client
                .post(self.url("start/"))
                .header("Accept", "application/json")
                .json(req)
                .send()
                .await?;
            parse_response(resp).await
        })
        .await?;

        validate_conversation(record).ok_or(ApiError::Protocol(RecordError::MissingField {
            field: "id",
        }))
    }

    // ── Messages ──────────────────────────────────────────────────────────

    /// Append one message and return it as stored by the backend.
    pub async fn post_message(&self, req: &PostMessageRequest) -> Result<Message> {
        let record: MessageRecord = retry_unsent(&self.retry, "post message", || async {
            let resp = self
                .client
                .post(self.url("message/"))
                .header("Accept", "application/json")
                .json(req)
                .send()
                .await?;
            parse_response(resp).await
        })
        .await?;

        Ok(validate_message(record, &req.chat_id)?)
    }

    /// Incremental fetch of everything the backend has after `since`.
    pub async fn list_messages_since(
        &self,
        conversation: &ConversationId,
        since: Timestamp,
    ) -> Result<MessageBatch> {
        let resp = self
            .client
            .get(self.url(&format!("{conversation}/messages/")))
            .header("Accept", "application/json")
            .query(&[("since", since.to_query_param())])
            .send()
            .await?;

        let records: Option<Vec<serde_json::Value>> = parse_response(resp).await?;
        Ok(validate_batch(records.unwrap_or_default(), conversation))
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or an error containing the status and body text.
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
