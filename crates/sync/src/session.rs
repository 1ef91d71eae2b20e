//! Lifecycle of the visitor's conversation handle.
//!
//! `Absent -> Resolving -> Active`, with `Active` terminal. Two independent
//! paths can activate the handle: the poll-driven lookup ([`SessionResolver::ensure`])
//! and the send-driven start ([`SessionResolver::start_or_join`]). The first
//! one to finish wins; the other is reconciled against it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use livechat_api::{ConversationId, ConversationSnapshot, StartConversationRequest};
use livechat_api_client::ApiError;
use tracing::{debug, error, info, warn};

use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Resolving,
    Active,
}

/// Result of [`SessionResolver::ensure`].
#[derive(Debug, Clone)]
pub enum Resolution {
    /// This call activated the handle; the bundled messages are the caller's
    /// to admit.
    Activated(ConversationSnapshot),
    /// The handle was already active, or another path activated it first.
    Active(ConversationId),
    /// The backend has no conversation for this visitor yet.
    Absent,
    /// The lookup failed; the next tick retries.
    Failed,
}

/// Result of reconciling a returned handle with the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Activated,
    AlreadyActive,
    Conflict { kept: ConversationId },
}

/// Result of [`SessionResolver::start_or_join`].
#[derive(Debug)]
pub enum StartOutcome {
    /// The handle is active (possibly activated by a lookup while waiting).
    Existing(ConversationId),
    /// start-conversation ran; `activation` says how it was reconciled.
    Started {
        snapshot: ConversationSnapshot,
        activation: Activation,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupOutcome {
    Absent,
    Failed,
}

#[derive(Debug, Default)]
struct ResolverState {
    handle: Option<ConversationId>,
    in_flight: usize,
    conflicted: bool,
    last_lookup: Option<LookupOutcome>,
}

#[derive(Debug, Default)]
pub struct SessionResolver {
    state: Mutex<ResolverState>,
    /// Serializes lookups so concurrent `ensure` callers share one request.
    lookup_gate: tokio::sync::Mutex<()>,
    /// Serializes starts so concurrent sends create at most one conversation.
    start_gate: tokio::sync::Mutex<()>,
    /// Bumped each time a lookup finishes.
    lookups_completed: AtomicU64,
}

impl SessionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        let state = self.lock();
        if state.handle.is_some() {
            SessionState::Active
        } else if state.in_flight > 0 {
            SessionState::Resolving
        } else {
            SessionState::Absent
        }
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.lock().handle.clone()
    }

    /// Set once a lookup and a start disagreed about the conversation id.
    pub fn is_conflicted(&self) -> bool {
        self.lock().conflicted
    }

    /// Make sure a conversation handle exists, looking it up if needed.
    ///
    /// Callers that arrive while a lookup is in flight wait for it and share
    /// its outcome instead of issuing their own request.
    pub async fn ensure<T: Transport + ?Sized>(&self, transport: &T, visitor_id: &str) -> Resolution {
        if let Some(id) = self.active_id() {
            return Resolution::Active(id);
        }

        let seen = self.lookups_completed.load(Ordering::Acquire);
        let _gate = self.lookup_gate.lock().await;

        if let Some(id) = self.active_id() {
            return Resolution::Active(id);
        }
        if self.lookups_completed.load(Ordering::Acquire) != seen {
            return match self.lock().last_lookup {
                Some(LookupOutcome::Failed) => Resolution::Failed,
                _ => Resolution::Absent,
            };
        }

        let result = {
            let _in_flight = InFlight::enter(self);
            debug!("Looking up conversation for visitor {visitor_id}");
            transport.lookup_conversation(visitor_id).await
        };

        let (resolution, outcome) = match result {
            Ok(Some(snapshot)) => match self.activate(snapshot.id.clone(), "lookup") {
                Activation::Activated => (Resolution::Activated(snapshot), None),
                Activation::AlreadyActive => (Resolution::Active(snapshot.id), None),
                Activation::Conflict { kept } => (Resolution::Active(kept), None),
            },
            Ok(None) => (Resolution::Absent, Some(LookupOutcome::Absent)),
            Err(e) => {
                warn!("Conversation lookup failed, retrying next tick: {e}");
                (Resolution::Failed, Some(LookupOutcome::Failed))
            }
        };

        self.lock().last_lookup = outcome;
        self.lookups_completed.fetch_add(1, Ordering::AcqRel);
        resolution
    }

    /// Create the conversation for a send, unless one is (or becomes) active.
    ///
    /// Concurrent callers queue behind the first start; once it succeeds they
    /// see the handle and get [`StartOutcome::Existing`].
    pub async fn start_or_join<T: Transport + ?Sized>(
        &self,
        transport: &T,
        request: &StartConversationRequest,
    ) -> Result<StartOutcome, ApiError> {
        if let Some(id) = self.active_id() {
            return Ok(StartOutcome::Existing(id));
        }

        let _gate = self.start_gate.lock().await;
        if let Some(id) = self.active_id() {
            return Ok(StartOutcome::Existing(id));
        }

        let result = {
            let _in_flight = InFlight::enter(self);
            info!("Starting conversation for visitor {}", request.visitor_id);
            transport.start_conversation(request).await
        };

        let snapshot = result?;
        let activation = self.activate(snapshot.id.clone(), "start");
        Ok(StartOutcome::Started {
            snapshot,
            activation,
        })
    }

    /// Reconcile a handle returned by the backend with the current one.
    ///
    /// The first handle sticks. A different id afterwards means the backend
    /// broke its one-conversation-per-visitor rule: logged, marked, ignored.
    pub fn activate(&self, id: ConversationId, source: &str) -> Activation {
        let mut state = self.lock();
        match &state.handle {
            None => {
                info!("Conversation {id} active (via {source})");
                state.handle = Some(id);
                Activation::Activated
            }
            Some(current) if *current == id => {
                debug!("Conversation {id} already active, {source} result discarded");
                Activation::AlreadyActive
            }
            Some(current) => {
                error!(
                    "Conversation conflict: {source} returned {id} but {current} is already active; keeping {current}"
                );
                let kept = current.clone();
                state.conflicted = true;
                Activation::Conflict { kept }
            }
        }
    }
}

/// Marks a lookup or start as in flight until dropped, so a cancelled
/// request cannot leave the resolver stuck in `Resolving`.
struct InFlight<'a>(&'a SessionResolver);

impl<'a> InFlight<'a> {
    fn enter(resolver: &'a SessionResolver) -> Self {
        resolver.lock().in_flight += 1;
        Self(resolver)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().in_flight -= 1;
    }
}
