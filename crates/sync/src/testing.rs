//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use livechat_api::{
    AuthorRole, ConversationId, ConversationSnapshot, Message, MessageBatch, MessageId,
    PostMessageRequest, StartConversationRequest, Timestamp,
};
use livechat_api_client::ApiError;
use livechat_runtime_config::NotificationPermission;
use tokio::sync::watch;

use crate::notify::{BoxError, Notifier};
use crate::transport::Transport;

pub const CHAT: i64 = 1;

fn message(id: i64, millis: i64, body: &str, author: AuthorRole) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: ConversationId::from(CHAT),
        author,
        body: body.to_string(),
        created_at: Timestamp::from_millis(millis).unwrap(),
    }
}

pub fn agent(id: i64, millis: i64, body: &str) -> Message {
    message(id, millis, body, AuthorRole::Agent)
}

pub fn visitor(id: i64, millis: i64, body: &str) -> Message {
    message(id, millis, body, AuthorRole::Visitor)
}

pub fn batch(messages: Vec<Message>) -> MessageBatch {
    MessageBatch {
        messages,
        rejected: Vec::new(),
    }
}

pub fn snapshot(id: i64, messages: Vec<Message>) -> ConversationSnapshot {
    let id = ConversationId::from(id);
    let messages = messages
        .into_iter()
        .map(|m| Message {
            conversation_id: id.clone(),
            ..m
        })
        .collect();
    ConversationSnapshot {
        id,
        bundle: batch(messages),
    }
}

pub fn transient() -> ApiError {
    ApiError::Status {
        status: reqwest::StatusCode::BAD_GATEWAY,
        body: "upstream down".into(),
    }
}

type Script<T> = Mutex<VecDeque<Result<T, ApiError>>>;

fn next<T>(script: &Script<T>, fallback: impl FnOnce() -> Result<T, ApiError>) -> Result<T, ApiError> {
    script.lock().unwrap().pop_front().unwrap_or_else(fallback)
}

/// In-memory backend. Unscripted calls answer "nothing there".
#[derive(Default)]
pub struct FakeTransport {
    lookup_script: Script<Option<ConversationSnapshot>>,
    start_script: Script<ConversationSnapshot>,
    post_script: Script<Message>,
    list_script: Script<MessageBatch>,
    delay: Option<Duration>,
    gate: Option<watch::Sender<bool>>,

    pub lookups: AtomicUsize,
    pub starts: AtomicUsize,
    pub posts: AtomicUsize,
    pub lists: AtomicUsize,
    pub since_seen: Mutex<Vec<Timestamp>>,
    pub posted: Mutex<Vec<PostMessageRequest>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call blocks until [`FakeTransport::release`].
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(watch::channel(false).0);
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.send_replace(true);
        }
    }

    pub fn push_lookup(&self, result: Result<Option<ConversationSnapshot>, ApiError>) {
        self.lookup_script.lock().unwrap().push_back(result);
    }

    pub fn push_start(&self, result: Result<ConversationSnapshot, ApiError>) {
        self.start_script.lock().unwrap().push_back(result);
    }

    pub fn push_post(&self, result: Result<Message, ApiError>) {
        self.post_script.lock().unwrap().push_back(result);
    }

    pub fn push_list(&self, result: Result<MessageBatch, ApiError>) {
        self.list_script.lock().unwrap().push_back(result);
    }

    pub fn since_seen(&self) -> Vec<Timestamp> {
        self.since_seen.lock().unwrap().clone()
    }

    async fn respond(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let mut open = gate.subscribe();
            let _ = open.wait_for(|open| *open).await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn lookup_conversation(
        &self,
        _visitor_id: &str,
    ) -> Result<Option<ConversationSnapshot>, ApiError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.respond().await;
        next(&self.lookup_script, || Ok(None))
    }

    async fn start_conversation(
        &self,
        request: &StartConversationRequest,
    ) -> Result<ConversationSnapshot, ApiError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.respond().await;
        let body = request.message.clone();
        next(&self.start_script, || Ok(snapshot(CHAT, vec![visitor(1, 1_000, &body)])))
    }

    async fn post_message(&self, request: &PostMessageRequest) -> Result<Message, ApiError> {
        let n = self.posts.fetch_add(1, Ordering::SeqCst) as i64;
        self.posted.lock().unwrap().push(request.clone());
        self.respond().await;
        let body = request.message.clone();
        next(&self.post_script, || Ok(visitor(1_000 + n, 10_000 + n, &body)))
    }

    async fn list_messages_since(
        &self,
        _conversation: &ConversationId,
        since: Timestamp,
    ) -> Result<MessageBatch, ApiError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.since_seen.lock().unwrap().push(since);
        self.respond().await;
        next(&self.list_script, || Ok(MessageBatch::default()))
    }
}

/// Records every effect instead of performing it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub permission: Mutex<NotificationPermission>,
    pub fail_sound: bool,
    pub sounds: AtomicUsize,
    pub shown: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn granted() -> Self {
        Self {
            permission: Mutex::new(NotificationPermission::Granted),
            ..Self::default()
        }
    }

    pub fn sounds(&self) -> usize {
        self.sounds.load(Ordering::SeqCst)
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn play_sound(&self) -> Result<(), BoxError> {
        self.sounds.fetch_add(1, Ordering::SeqCst);
        if self.fail_sound {
            return Err("audio device busy".into());
        }
        Ok(())
    }

    fn show_notification(&self, title: &str, body: &str) -> Result<(), BoxError> {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }

    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap()
    }
}
