//! One embedded chat widget: ledger, session, poller and notifications
//! wired together behind a small async API.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use livechat_api::{
    ConversationId, ConversationSnapshot, Message, MessageBatch, PostMessageRequest,
    StartConversationRequest, Timestamp,
};
use livechat_runtime_config::WidgetConfig;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::events::WidgetEvent;
use crate::ledger::MessageLedger;
use crate::notify::{NotificationController, NotificationState, Notifier};
use crate::scheduler::{CycleOutcome, PollScheduler};
use crate::session::{Activation, SessionResolver, SessionState, StartOutcome};
use crate::transport::Transport;

const EVENT_CAPACITY: usize = 256;

/// State shared between the widget handle and its poll task.
pub(crate) struct WidgetCore<T> {
    pub(crate) transport: T,
    pub(crate) visitor_id: Option<String>,
    pub(crate) site_id: String,
    pub(crate) resolver: SessionResolver,
    ledger: Mutex<MessageLedger>,
    pub(crate) notifications: NotificationController,
    events: broadcast::Sender<WidgetEvent>,
}

pub(crate) struct Admitted {
    pub(crate) watermark_before: Timestamp,
    pub(crate) messages: Vec<Message>,
}

impl<T> WidgetCore<T> {
    fn ledger(&self) -> MutexGuard<'_, MessageLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn watermark(&self) -> Timestamp {
        self.ledger().watermark()
    }

    pub(crate) fn emit(&self, event: WidgetEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Admit a validated batch and tell a visible view about it.
    pub(crate) fn admit(&self, batch: MessageBatch, source: &str) -> Admitted {
        let admitted = self.store(batch, source);
        if !admitted.messages.is_empty() && self.notifications.is_view_visible() {
            self.emit(WidgetEvent::MessagesAppended(admitted.messages.clone()));
        }
        admitted
    }

    /// Ledger-only admission: no events. Rejected records are logged and
    /// dropped.
    pub(crate) fn store(&self, batch: MessageBatch, source: &str) -> Admitted {
        for rejected in &batch.rejected {
            warn!("Dropped {source} record: {rejected}");
        }

        let mut ledger = self.ledger();
        let watermark_before = ledger.watermark();
        let messages = ledger.admit(batch.messages);
        Admitted {
            watermark_before,
            messages,
        }
    }
}

/// What a successful [`ChatWidget::send`] produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    pub conversation_id: ConversationId,
    /// The stored copy of the sent message, when the backend echoed it.
    pub message: Option<Message>,
    /// True when this send created the conversation.
    pub started: bool,
}

struct Poller {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ChatWidget<T: Transport + 'static> {
    core: Arc<WidgetCore<T>>,
    scheduler: Arc<PollScheduler<T>>,
    poller: Mutex<Option<Poller>>,
}

impl<T: Transport + 'static> ChatWidget<T> {
    pub fn new(config: &WidgetConfig, transport: T, notifier: Arc<dyn Notifier>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let visitor_id = config
            .identity
            .visitor_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let core = Arc::new(WidgetCore {
            transport,
            visitor_id,
            site_id: config.identity.site_id.clone(),
            resolver: SessionResolver::new(),
            ledger: Mutex::new(MessageLedger::new()),
            notifications: NotificationController::new(
                config.notifications.clone(),
                notifier,
                events.clone(),
            ),
            events,
        });
        let scheduler = Arc::new(PollScheduler::new(
            Arc::clone(&core),
            config.polling.interval(),
        ));

        Self {
            core,
            scheduler,
            poller: Mutex::new(None),
        }
    }

    fn poller(&self) -> MutexGuard<'_, Option<Poller>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transport(&self) -> &T {
        &self.core.transport
    }

    #[cfg(test)]
    pub(crate) fn core_for_tests(&self) -> &WidgetCore<T> {
        &self.core
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.core.events.subscribe()
    }

    /// Spawn the poll loop. Calling it while already running does nothing.
    pub fn start(&self) {
        let mut poller = self.poller();
        if poller.is_some() {
            return;
        }
        self.scheduler.resume();
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&self.scheduler).run(rx));
        *poller = Some(Poller { shutdown, task });
        info!(
            "Polling every {}ms",
            self.scheduler.interval().as_millis()
        );
    }

    /// Stop polling. A cycle still in flight finishes but its results are
    /// discarded.
    pub async fn stop(&self) {
        self.scheduler.stop();
        let poller = self.poller().take();
        if let Some(poller) = poller {
            let _ = poller.shutdown.send(true);
            if let Err(e) = poller.task.await {
                warn!("Poll task ended abnormally: {e}");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.poller().is_some()
    }

    /// Run one cycle now, subject to the same overlap guard as the timer.
    pub async fn poll_now(&self) -> CycleOutcome {
        self.scheduler.run_cycle().await
    }

    /// Send a visitor message, creating the conversation on first use.
    pub async fn send(&self, body: &str) -> Result<SendReceipt> {
        let body = body.trim();
        if body.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        let core = &self.core;
        let visitor_id = core.visitor_id.as_deref().ok_or(SyncError::NoVisitor)?;

        let conversation = match core.resolver.active_id() {
            Some(id) => id,
            None => {
                let request = StartConversationRequest {
                    visitor_id: visitor_id.to_string(),
                    website_id: core.site_id.clone(),
                    message: body.to_string(),
                };
                match core.resolver.start_or_join(&core.transport, &request).await? {
                    StartOutcome::Existing(id) => id,
                    StartOutcome::Started {
                        snapshot,
                        activation,
                    } => return self.finish_start(snapshot, activation, body),
                }
            }
        };

        let request = PostMessageRequest {
            chat_id: conversation.clone(),
            message: body.to_string(),
            is_admin: false,
        };
        let message = core.transport.post_message(&request).await?;
        debug!("Sent message {} to conversation {conversation}", message.id);
        core.admit(
            MessageBatch {
                messages: vec![message.clone()],
                rejected: Vec::new(),
            },
            "send",
        );

        Ok(SendReceipt {
            conversation_id: conversation,
            message: Some(message),
            started: false,
        })
    }

    fn finish_start(
        &self,
        snapshot: ConversationSnapshot,
        activation: Activation,
        body: &str,
    ) -> Result<SendReceipt> {
        let core = &self.core;
        match activation {
            Activation::Conflict { kept } => Err(SyncError::ConversationConflict {
                active: kept,
                returned: snapshot.id,
            }),
            Activation::Activated | Activation::AlreadyActive => {
                if activation == Activation::Activated {
                    core.emit(WidgetEvent::ConversationActivated(snapshot.id.clone()));
                }
                let sent = snapshot
                    .bundle
                    .messages
                    .iter()
                    .rev()
                    .find(|m| !m.is_inbound() && m.body == body)
                    .cloned();
                let conversation_id = snapshot.id.clone();
                core.admit(snapshot.bundle, "start");

                Ok(SendReceipt {
                    conversation_id,
                    message: sent,
                    started: true,
                })
            }
        }
    }

    /// The view became visible: clear unread state and return the history.
    pub fn open_view(&self) -> Vec<Message> {
        self.core.notifications.view_opened();
        self.history()
    }

    pub fn close_view(&self) {
        self.core.notifications.view_closed();
    }

    pub fn history(&self) -> Vec<Message> {
        self.core.ledger().snapshot_ordered()
    }

    pub fn set_muted(&self, muted: bool) {
        self.core.notifications.set_muted(muted);
    }

    pub fn notification_state(&self) -> NotificationState {
        self.core.notifications.state()
    }

    pub fn session_state(&self) -> SessionState {
        self.core.resolver.state()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.core.resolver.active_id()
    }

    pub fn watermark(&self) -> Timestamp {
        self.core.watermark()
    }
}

impl<T: Transport + 'static> Drop for ChatWidget<T> {
    fn drop(&mut self) {
        self.scheduler.stop();
        if let Some(poller) = self.poller().take() {
            let _ = poller.shutdown.send(true);
            poller.task.abort();
        }
    }
}
