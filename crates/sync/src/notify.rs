//! Unread badge, transient preview, sound and OS notification.
//!
//! The controller reacts once per poll cycle: however many agent messages a
//! cycle brings, at most one preview, one sound and one OS notification fire,
//! all describing the latest of them. Only the unread count scales with the
//! batch (see [`BadgePolicy`]).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use livechat_api::Message;
use livechat_runtime_config::{BadgePolicy, NotificationPermission, NotificationSettings};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::WidgetEvent;
use crate::ledger;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Platform side of notifications: audio playback and native notifications.
pub trait Notifier: Send + Sync {
    fn play_sound(&self) -> Result<(), BoxError>;

    fn show_notification(&self, title: &str, body: &str) -> Result<(), BoxError>;

    /// Answer the user last gave to the permission prompt.
    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Default
    }
}

/// Notifier for hosts that render nothing beyond widget events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn play_sound(&self) -> Result<(), BoxError> {
        Ok(())
    }

    fn show_notification(&self, _title: &str, _body: &str) -> Result<(), BoxError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationState {
    pub unread_count: u32,
    pub has_unseen_preview: bool,
    pub muted_by_sound: bool,
}

/// What one call to [`NotificationController::on_inbound`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Effects {
    pub unread_added: u32,
    pub preview: bool,
    pub sound: bool,
    pub os_notification: bool,
}

#[derive(Debug, Default)]
struct ControllerState {
    public: NotificationState,
    view_visible: bool,
    preview_seq: u64,
    preview_timer: Option<JoinHandle<()>>,
}

impl ControllerState {
    fn cancel_preview_timer(&mut self) {
        if let Some(timer) = self.preview_timer.take() {
            timer.abort();
        }
    }
}

pub struct NotificationController {
    settings: NotificationSettings,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<ControllerState>>,
    events: broadcast::Sender<WidgetEvent>,
}

fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NotificationController {
    pub fn new(
        settings: NotificationSettings,
        notifier: Arc<dyn Notifier>,
        events: broadcast::Sender<WidgetEvent>,
    ) -> Self {
        Self {
            settings,
            notifier,
            state: Arc::new(Mutex::new(ControllerState::default())),
            events,
        }
    }

    pub fn state(&self) -> NotificationState {
        lock(&self.state).public
    }

    pub fn is_view_visible(&self) -> bool {
        lock(&self.state).view_visible
    }

    pub fn set_muted(&self, muted: bool) {
        lock(&self.state).public.muted_by_sound = muted;
    }

    /// React to the new agent messages of one cycle. Empty batches do nothing.
    pub fn on_inbound(&self, inbound: &[Message]) -> Effects {
        let Some(latest) = ledger::latest(inbound) else {
            return Effects::default();
        };

        let mut effects = Effects::default();
        let mut state = lock(&self.state);
        let visible = state.view_visible;

        if self.settings.badge && !visible {
            let added = match self.settings.badge_policy {
                BadgePolicy::PerMessage => u32::try_from(inbound.len()).unwrap_or(u32::MAX),
                BadgePolicy::PerBatch => 1,
            };
            state.public.unread_count = state.public.unread_count.saturating_add(added);
            effects.unread_added = added;
            let _ = self
                .events
                .send(WidgetEvent::UnreadChanged(state.public.unread_count));
        }

        if self.settings.preview {
            self.show_preview(&mut state, latest);
            effects.preview = true;
        }

        let play_sound = self.settings.sound && !state.public.muted_by_sound && !visible;
        drop(state);

        if play_sound {
            effects.sound = true;
            if let Err(e) = self.notifier.play_sound() {
                warn!("Notification sound failed: {e}");
            }
        }

        if self.settings.os_notification && self.notifier.permission().is_granted() {
            effects.os_notification = true;
            if let Err(e) = self
                .notifier
                .show_notification(&self.settings.title, &latest.body)
            {
                warn!("OS notification failed: {e}");
            }
        }

        debug!(
            "Surfaced {} inbound message(s): {:?}",
            inbound.len(),
            effects
        );
        effects
    }

    /// Raise the preview and (re)arm its auto-clear timer.
    fn show_preview(&self, state: &mut ControllerState, latest: &Message) {
        state.cancel_preview_timer();
        state.preview_seq += 1;
        state.public.has_unseen_preview = true;
        let _ = self.events.send(WidgetEvent::Preview(latest.clone()));

        let seq = state.preview_seq;
        let duration: Duration = self.settings.preview_duration();
        let shared = Arc::clone(&self.state);
        let events = self.events.clone();
        state.preview_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut state = lock(&shared);
            if state.preview_seq == seq && state.public.has_unseen_preview {
                state.public.has_unseen_preview = false;
                state.preview_timer = None;
                let _ = events.send(WidgetEvent::PreviewCleared);
            }
        }));
    }

    /// The view became visible: everything counts as seen.
    pub fn view_opened(&self) {
        let mut state = lock(&self.state);
        state.view_visible = true;
        state.cancel_preview_timer();
        let had_preview = std::mem::take(&mut state.public.has_unseen_preview);
        let had_unread = std::mem::take(&mut state.public.unread_count) > 0;
        drop(state);

        if had_preview {
            let _ = self.events.send(WidgetEvent::PreviewCleared);
        }
        if had_unread {
            let _ = self.events.send(WidgetEvent::UnreadChanged(0));
        }
    }

    pub fn view_closed(&self) {
        lock(&self.state).view_visible = false;
    }
}

impl Drop for NotificationController {
    fn drop(&mut self) {
        lock(&self.state).cancel_preview_timer();
    }
}
