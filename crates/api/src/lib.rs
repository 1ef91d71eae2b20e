//! Shared types for the livechat widget.
//!
//! This crate is the typed boundary between the backend's JSON records and the
//! synchronization engine. Domain types ([`Message`], [`ConversationId`],
//! [`Timestamp`]) live here next to the raw wire records in [`wire`]; records
//! are turned into domain types only through [`validate`], so nothing past this
//! crate ever sees a half-populated message.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod validate;
pub mod wire;

pub use validate::{ConversationSnapshot, MessageBatch, RecordError};
pub use wire::{ConversationRecord, MessageRecord, PostMessageRequest, StartConversationRequest};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Opaque backend identifier. The backend hands out integers today, but any
/// string is accepted so the engine never has to care.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Num(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Identifier of a message, unique within its conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub RecordId);

impl<T: Into<RecordId>> From<T> for MessageId {
    fn from(value: T) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a conversation ("chat" on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub RecordId);

impl<T: Into<RecordId>> From<T> for ConversationId {
    fn from(value: T) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// A point in time as reported by the backend.
///
/// Accepts RFC 3339 strings and epoch milliseconds when decoding, always
/// encodes as RFC 3339 UTC. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The zero watermark used before anything has been observed.
    pub const EPOCH: Timestamp = Timestamp(DateTime::<Utc>::UNIX_EPOCH);

    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn is_epoch(&self) -> bool {
        *self == Self::EPOCH
    }

    /// Encoding used for the `since` query parameter. Keeps every sub-second
    /// digit the value has, so the cursor round-trips exactly.
    pub fn to_query_param(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    fn parse_text(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(millis) = raw.parse::<i64>() {
            return Self::from_millis(millis);
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_param())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_query_param())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(i64),
            Fractional(f64),
            Text(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Timestamp::from_millis(ms),
            Raw::Fractional(ms) if ms.is_finite() => Timestamp::from_millis(ms as i64),
            Raw::Fractional(_) => None,
            Raw::Text(s) => Timestamp::parse_text(&s),
        };
        parsed.ok_or_else(|| serde::de::Error::custom("unrecognized timestamp"))
    }
}

// ─── Messages ────────────────────────────────────────────────────────────────

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Visitor,
    Agent,
}

impl AuthorRole {
    pub fn from_is_admin(is_admin: bool) -> Self {
        if is_admin { Self::Agent } else { Self::Visitor }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Agent)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Visitor => "visitor",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated chat message. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub author: AuthorRole,
    pub body: String,
    pub created_at: Timestamp,
}

impl Message {
    /// Agent-authored messages are the ones that notify the visitor.
    pub fn is_inbound(&self) -> bool {
        self.author.is_admin()
    }

    /// Chronological sort key with the id as a deterministic tie-break.
    pub fn order_key(&self) -> (Timestamp, &MessageId) {
        (self.created_at, &self.id)
    }
}
