//! Message synchronization engine for the embeddable chat widget.
//!
//! One [`ChatWidget`] per embedded instance. It polls the backend through a
//! [`Transport`], folds what it sees into a [`MessageLedger`], resolves the
//! visitor's conversation with a [`SessionResolver`] and drives the unread
//! badge, preview, sound and OS notification through a
//! [`NotificationController`].

pub mod error;
pub mod events;
pub mod ledger;
pub mod notify;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod widget;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SyncError;
pub use events::WidgetEvent;
pub use ledger::MessageLedger;
pub use notify::{NotificationController, NotificationState, Notifier, NullNotifier};
pub use scheduler::{CycleOutcome, PollScheduler};
pub use session::{Resolution, SessionResolver, SessionState};
pub use transport::Transport;
pub use widget::{ChatWidget, SendReceipt};
