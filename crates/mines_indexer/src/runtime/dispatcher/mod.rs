//! Routes delivered events to their game and commits the result.

mod apply;
mod compact;
mod revert;

use std::collections::VecDeque;
use std::sync::Arc;

use mines_proto::{EventEnvelope, GameKey};
use serde::{Deserialize, Serialize};

use super::error::IndexerError;
use super::game::GamePhase;
use super::stats::{lock_tracker, shared_stats_tracker, PlatformStats, SharedStatsTracker};
use super::store::EntityStore;
use super::types::EventId;

pub const DEFAULT_MAX_REJECTED_EVENTS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Revert for an event this indexer never applied.
    NotApplied,
}

/// An event set aside for operator review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEvent {
    pub envelope: EventEnvelope,
    pub error: IndexerError,
}

impl RejectedEvent {
    pub fn event_id(&self) -> EventId {
        self.envelope.event_id()
    }

    /// The event may be fine; a stored record it touches is not.
    pub fn needs_repair(&self) -> bool {
        self.error.is_entity_fault()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied {
        event_id: EventId,
        key: GameKey,
        phase: GamePhase,
    },
    Reverted {
        event_id: EventId,
        key: GameKey,
    },
    Rejected(RejectedEvent),
    Skipped {
        event_id: EventId,
        reason: SkipReason,
    },
}

impl DispatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DispatchOutcome::Applied { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, DispatchOutcome::Rejected(_))
    }
}

/// Single writer for the games it is handed. Callers keep per-identity
/// order; the shared stats tracker serializes aggregate updates.
pub struct EventDispatcher<S> {
    store: Arc<S>,
    stats: SharedStatsTracker,
    rejected: VecDeque<RejectedEvent>,
    max_rejected: usize,
}

impl<S: EntityStore> EventDispatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_stats_tracker(store, shared_stats_tracker(), DEFAULT_MAX_REJECTED_EVENTS)
    }

    pub fn with_stats_tracker(
        store: Arc<S>,
        stats: SharedStatsTracker,
        max_rejected: usize,
    ) -> Self {
        Self {
            store,
            stats,
            rejected: VecDeque::new(),
            max_rejected: max_rejected.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stats_tracker(&self) -> &SharedStatsTracker {
        &self.stats
    }

    pub fn platform_stats(&self) -> Result<PlatformStats, IndexerError> {
        let mut tracker = lock_tracker(&self.stats)?;
        Ok(tracker.ensure_loaded(self.store.as_ref())?.clone())
    }

    /// `Err` means the event was not applied and must be delivered again.
    /// Bad events, and events whose game or player record is unreadable,
    /// come back as `Ok(DispatchOutcome::Rejected)`.
    pub fn dispatch(&mut self, envelope: &EventEnvelope) -> Result<DispatchOutcome, IndexerError> {
        let result = if envelope.is_revert() {
            self.revert_event(envelope)
        } else {
            self.apply_event(envelope)
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(error) if error.is_entity_fault() => {
                tracing::error!(
                    event_id = %envelope.event_id(),
                    game = %envelope.game_key(),
                    kind = envelope.event.kind_label(),
                    %error,
                    "event set aside, stored entity needs repair"
                );
                Ok(self.reject(envelope, error))
            }
            Err(error) if error.is_rejection() => {
                tracing::warn!(
                    event_id = %envelope.event_id(),
                    game = %envelope.game_key(),
                    kind = envelope.event.kind_label(),
                    revert = envelope.is_revert(),
                    %error,
                    "event rejected"
                );
                Ok(self.reject(envelope, error))
            }
            Err(error) => Err(error),
        }
    }

    fn reject(&mut self, envelope: &EventEnvelope, error: IndexerError) -> DispatchOutcome {
        let rejected = RejectedEvent {
            envelope: envelope.clone(),
            error,
        };
        self.record_rejection(rejected.clone());
        DispatchOutcome::Rejected(rejected)
    }

    pub fn rejected_events(&self) -> Vec<RejectedEvent> {
        self.rejected.iter().cloned().collect()
    }

    pub fn take_rejected_events(&mut self) -> Vec<RejectedEvent> {
        self.rejected.drain(..).collect()
    }

    fn record_rejection(&mut self, rejected: RejectedEvent) {
        if self.rejected.len() >= self.max_rejected {
            self.rejected.pop_front();
        }
        self.rejected.push_back(rejected);
    }
}
