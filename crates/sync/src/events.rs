use livechat_api::{ConversationId, Message};

/// Render-side notifications emitted by a widget instance.
///
/// Delivered over a `tokio::sync::broadcast` channel; a view that falls
/// behind loses events rather than stalling the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    ConversationActivated(ConversationId),
    /// Newly admitted messages while the view is visible, in arrival order.
    MessagesAppended(Vec<Message>),
    Preview(Message),
    PreviewCleared,
    UnreadChanged(u32),
}
