use std::path::Path;

use anyhow::{Context, Result};
use livechat_api::{AuthorRole, Message};
use livechat_api_client::{ApiClient, RetryConfig};
use livechat_runtime_config::WidgetConfig;
use livechat_sync::{ChatWidget, CycleOutcome, Notifier, NullNotifier, Transport, WidgetEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config;
use crate::notifier::TerminalNotifier;

type Widget = ChatWidget<ApiClient>;

fn build_widget(config: &WidgetConfig, notifier: Arc<dyn Notifier>) -> Result<Widget> {
    let mut client = ApiClient::new(&config.server.chat_url, config.server.request_timeout())
        .context("Failed to build HTTP client")?;
    client.set_retry(RetryConfig::with_max_retries(
        config.server.max_send_retries as usize,
    ));
    Ok(ChatWidget::new(config, client, notifier))
}

fn terminal_notifier(config: &WidgetConfig) -> Arc<dyn Notifier> {
    Arc::new(TerminalNotifier::new(config.notifications.permission))
}

pub fn format_message(message: &Message) -> String {
    let at = message
        .created_at
        .as_datetime()
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S");
    let who = match message.author {
        AuthorRole::Visitor => "you",
        AuthorRole::Agent => "agent",
    };
    format!("[{at}] {who:>5}: {}", message.body)
}

fn print_messages(messages: &[Message]) {
    for message in messages {
        println!("{}", format_message(message));
    }
}

pub async fn run_send(config_path: &Path, body: &str) -> Result<()> {
    let config = config::load_with_identity(config_path)?;
    let widget = build_widget(&config, terminal_notifier(&config))?;

    let receipt = widget.send(body).await?;
    if receipt.started {
        println!("Started conversation {}", receipt.conversation_id);
    }
    match receipt.message {
        Some(message) => println!("{}", format_message(&message)),
        None => println!("Sent to conversation {}", receipt.conversation_id),
    }
    Ok(())
}

pub async fn run_history(config_path: &Path) -> Result<()> {
    let config = config::load_with_identity(config_path)?;
    let widget = build_widget(&config, Arc::new(NullNotifier))?;

    match load_history(&widget).await {
        Ok(Some(history)) => {
            if history.is_empty() {
                println!("Conversation is empty.");
            }
            print_messages(&history);
            Ok(())
        }
        Ok(None) => {
            println!("No conversation yet. Start one with `livechat send <MESSAGE>`.");
            Ok(())
        }
        Err(e) => Err(e.context(format!("Could not reach {}", config.server.chat_url))),
    }
}

/// Resolve the conversation with the view already open, so the history being
/// printed is not also announced as unread.
async fn load_history<T: Transport + 'static>(widget: &ChatWidget<T>) -> Result<Option<Vec<Message>>> {
    widget.open_view();
    match widget.poll_now().await {
        CycleOutcome::NoConversation => return Ok(None),
        CycleOutcome::Failed => anyhow::bail!("conversation lookup failed"),
        _ => {}
    }
    // The lookup only carries the bundled history; fetch anything newer.
    widget.poll_now().await;
    Ok(Some(widget.history()))
}

pub async fn run_watch(config_path: &Path, open: bool, mute: bool) -> Result<()> {
    let config = config::load_with_identity(config_path)?;
    let widget = build_widget(&config, terminal_notifier(&config))?;
    widget.set_muted(mute);
    if open {
        widget.open_view();
    }

    let mut events = widget.subscribe();
    widget.start();
    info!(
        "Watching {} as visitor {}",
        config.server.chat_url,
        config.identity.visitor_id.as_deref().unwrap_or("-")
    );

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(event) => render_event(&event, open),
                Err(RecvError::Lagged(skipped)) => warn!("Terminal fell behind, {skipped} event(s) dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Shutdown signal received, stopping...");
    widget.stop().await;
    Ok(())
}

/// With the view open every message is already printed as it arrives, so
/// previews would only repeat it.
fn render_event(event: &WidgetEvent, open: bool) {
    match event {
        WidgetEvent::ConversationActivated(id) => println!("-- conversation {id} --"),
        WidgetEvent::MessagesAppended(messages) => print_messages(messages),
        WidgetEvent::Preview(message) if !open => println!("(new) {}", format_message(message)),
        WidgetEvent::Preview(_) => {}
        WidgetEvent::PreviewCleared => {}
        WidgetEvent::UnreadChanged(count) => {
            if *count > 0 {
                println!("-- {count} unread --");
            }
        }
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            warn!("Failed to register signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use livechat_api::{
        ConversationId, ConversationSnapshot, MessageBatch, MessageId, PostMessageRequest,
        StartConversationRequest, Timestamp,
    };
    use livechat_api_client::ApiError;
    use livechat_sync::notify::BoxError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn agent(id: i64, millis: i64, body: &str) -> Message {
        Message {
            id: MessageId::from(id),
            conversation_id: ConversationId::from(7),
            author: AuthorRole::Agent,
            body: body.into(),
            created_at: Timestamp::from_millis(millis).unwrap(),
        }
    }

    /// Backend holding one conversation with a fixed history.
    struct CannedBackend {
        bundle: Vec<Message>,
        newer: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Transport for CannedBackend {
        async fn lookup_conversation(
            &self,
            _visitor_id: &str,
        ) -> Result<Option<ConversationSnapshot>, ApiError> {
            Ok(Some(ConversationSnapshot {
                id: ConversationId::from(7),
                bundle: MessageBatch {
                    messages: self.bundle.clone(),
                    rejected: Vec::new(),
                },
            }))
        }

        async fn start_conversation(
            &self,
            _request: &StartConversationRequest,
        ) -> Result<ConversationSnapshot, ApiError> {
            unreachable!("history never starts a conversation")
        }

        async fn post_message(&self, _request: &PostMessageRequest) -> Result<Message, ApiError> {
            unreachable!("history never posts")
        }

        async fn list_messages_since(
            &self,
            _conversation: &ConversationId,
            _since: Timestamp,
        ) -> Result<MessageBatch, ApiError> {
            Ok(MessageBatch {
                messages: std::mem::take(&mut *self.newer.lock().unwrap()),
                rejected: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        sounds: AtomicUsize,
        shown: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn play_sound(&self) -> Result<(), BoxError> {
            self.sounds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn show_notification(&self, _title: &str, _body: &str) -> Result<(), BoxError> {
            self.shown.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn history_is_read_with_the_view_open() {
        let mut config = WidgetConfig::default();
        config.identity.visitor_id = Some("visitor-1".into());
        let backend = CannedBackend {
            bundle: vec![agent(1, 100, "welcome"), agent(2, 200, "how can we help?")],
            newer: Mutex::new(vec![agent(3, 300, "still there?")]),
        };
        let notifier = Arc::new(CountingNotifier::default());
        let widget = ChatWidget::new(&config, backend, notifier.clone());

        let history = load_history(&widget).await.unwrap().unwrap();

        let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["welcome", "how can we help?", "still there?"]);
        assert_eq!(notifier.sounds.load(Ordering::SeqCst), 0);
        assert_eq!(notifier.shown.load(Ordering::SeqCst), 0);
        assert_eq!(widget.notification_state().unread_count, 0);
    }

    #[test]
    fn message_line_names_the_author() {
        let message = Message {
            id: MessageId::from(1),
            conversation_id: ConversationId::from(1),
            author: AuthorRole::Agent,
            body: "hello there".into(),
            created_at: Timestamp::from_millis(0).unwrap(),
        };
        let line = format_message(&message);
        assert!(line.ends_with("agent: hello there"), "{line}");

        let mine = Message {
            author: AuthorRole::Visitor,
            ..message
        };
        assert!(format_message(&mine).ends_with("  you: hello there"));
    }
}
