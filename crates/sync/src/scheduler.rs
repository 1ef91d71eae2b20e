//! Periodic synchronization.
//!
//! One cycle at a time: a tick that fires while a cycle is still running is
//! skipped rather than queued, and a manual [`PollScheduler::run_cycle`] that
//! overlaps a running one returns [`CycleOutcome::Skipped`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use livechat_api::{ConversationSnapshot, Message, MessageBatch};
use livechat_api_client::retry::is_transient;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::events::WidgetEvent;
use crate::ledger;
use crate::session::Resolution;
use crate::transport::Transport;
use crate::widget::WidgetCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still in flight.
    Skipped,
    /// No visitor id; nothing to poll for.
    Idle,
    /// The backend has no conversation for this visitor yet.
    NoConversation,
    /// A lookup activated the conversation; its bundle was admitted.
    Activated { admitted: usize, inbound: usize },
    /// Incremental fetch applied.
    Synced { admitted: usize, inbound: usize },
    /// Transport failure; the next tick retries.
    Failed,
    /// The scheduler was stopped while this cycle was in flight.
    Discarded,
}

pub struct PollScheduler<T: Transport> {
    core: Arc<WidgetCore<T>>,
    interval: Duration,
    in_flight: AtomicBool,
    stopped: AtomicBool,
}

/// Clears the in-flight flag even if the cycle future is dropped.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: Transport + 'static> PollScheduler<T> {
    pub(crate) fn new(core: Arc<WidgetCore<T>>, interval: Duration) -> Self {
        Self {
            core,
            interval,
            in_flight: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Results of a cycle still in flight are dropped from now on.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub(crate) fn resume(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    /// Run one synchronization cycle unless one is already running.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Poll cycle still in flight, skipping");
            return CycleOutcome::Skipped;
        }
        let _guard = CycleGuard(&self.in_flight);
        self.cycle().await
    }

    async fn cycle(&self) -> CycleOutcome {
        let core = &self.core;
        let Some(visitor_id) = core.visitor_id.as_deref() else {
            return CycleOutcome::Idle;
        };

        let conversation = match core.resolver.active_id() {
            Some(id) => id,
            None => match core.resolver.ensure(&core.transport, visitor_id).await {
                Resolution::Activated(snapshot) => {
                    if self.is_stopped() {
                        // The handle is active now, so the ledger must still
                        // hold its history or a restart would refetch it as new.
                        let stored = core.store(snapshot.bundle, "lookup");
                        debug!(
                            "Scheduler stopped mid-lookup, stored {} message(s) silently",
                            stored.messages.len()
                        );
                        return CycleOutcome::Discarded;
                    }
                    return self.apply_initial_bundle(snapshot);
                }
                // A send activated it while we waited: fetch as usual.
                Resolution::Active(id) => id,
                Resolution::Absent => return CycleOutcome::NoConversation,
                Resolution::Failed => return CycleOutcome::Failed,
            },
        };

        let since = core.watermark();
        match core.transport.list_messages_since(&conversation, since).await {
            Ok(batch) => {
                if self.is_stopped() {
                    debug!("Scheduler stopped mid-cycle, discarding {} message(s)", batch.messages.len());
                    return CycleOutcome::Discarded;
                }
                self.apply_batch(batch)
            }
            Err(e) => {
                if is_transient(&e) {
                    warn!("Poll failed, retrying next tick: {e}");
                } else {
                    warn!("Poll rejected by backend: {e}");
                }
                CycleOutcome::Failed
            }
        }
    }

    /// Bundled messages are history. Only the newest agent message among them
    /// may surface, and only if it is newer than anything seen before.
    fn apply_initial_bundle(&self, snapshot: ConversationSnapshot) -> CycleOutcome {
        let core = &self.core;
        core.emit(WidgetEvent::ConversationActivated(snapshot.id.clone()));

        let admitted = core.admit(snapshot.bundle, "lookup");
        let inbound = inbound_of(&admitted.messages);
        let eligible: Vec<Message> = ledger::latest(&inbound)
            .filter(|m| m.created_at > admitted.watermark_before)
            .cloned()
            .into_iter()
            .collect();

        core.notifications.on_inbound(&eligible);
        info!(
            "Conversation {} resolved with {} message(s)",
            snapshot.id,
            admitted.messages.len()
        );
        CycleOutcome::Activated {
            admitted: admitted.messages.len(),
            inbound: eligible.len(),
        }
    }

    fn apply_batch(&self, batch: MessageBatch) -> CycleOutcome {
        let core = &self.core;
        let admitted = core.admit(batch, "poll");
        let inbound = inbound_of(&admitted.messages);
        if !inbound.is_empty() {
            core.notifications.on_inbound(&inbound);
        }

        if admitted.messages.is_empty() {
            debug!("Poll: up to date");
        } else {
            debug!(
                "Poll: admitted {} message(s), {} inbound",
                admitted.messages.len(),
                inbound.len()
            );
        }
        CycleOutcome::Synced {
            admitted: admitted.messages.len(),
            inbound: inbound.len(),
        }
    }

    /// Tick until `shutdown` flips to true. The first cycle runs immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Poll scheduler shutting down");
                        break;
                    }
                }

                _ = interval.tick() => {
                    let outcome = self.run_cycle().await;
                    debug!("Poll cycle finished: {outcome:?}");
                }
            }
        }
    }
}

fn inbound_of(messages: &[Message]) -> Vec<Message> {
    messages.iter().filter(|m| m.is_inbound()).cloned().collect()
}
