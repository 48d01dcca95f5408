//! Error types for the runtime module.

use std::io;

use thiserror::Error;

use super::game::GamePhase;
use super::store::EntityKind;

/// Errors that can occur while turning events into entity state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexerError {
    #[error("malformed event {event_id}: {reason}")]
    MalformedEvent { event_id: String, reason: String },
    #[error("protocol violation for game {key}: {violation}")]
    ProtocolViolation {
        key: String,
        violation: ProtocolViolation,
    },
    #[error("aggregate invariant violated: {reason}")]
    InvariantViolation { reason: String },
    #[error("fixed-point arithmetic failed: {reason}")]
    Arithmetic { reason: String },
    #[error("entity store unavailable: {reason}")]
    StoreUnavailable { reason: String },
    #[error("entity id invalid: {id}")]
    EntityIdInvalid { id: String },
    #[error("stored {kind} {id} is unreadable: {reason}")]
    CorruptEntity {
        kind: String,
        id: String,
        reason: String,
    },
    #[error("entity {id} has kind {found}, expected {expected}")]
    EntityKindMismatch {
        id: String,
        expected: String,
        found: String,
    },
    #[error("event {event_id} still failing after {attempts} attempts: {reason}")]
    RetryExhausted {
        event_id: String,
        attempts: u32,
        reason: String,
    },
    #[error("lock poisoned: {what}")]
    LockPoisoned { what: String },
    #[error("worker unavailable: {reason}")]
    WorkerUnavailable { reason: String },
    #[error("io error: {0}")]
    Io(String),
    #[error("serde error: {0}")]
    Serde(String),
}

impl IndexerError {
    /// Transient failures mean "event not yet applied": the caller must
    /// requeue and retry. Everything else is a verdict on the event itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexerError::StoreUnavailable { .. }
                | IndexerError::Io(_)
                | IndexerError::RetryExhausted { .. }
        )
    }

    /// Verdicts on a single event: reported and skipped, never retried.
    /// Faults in one stored entity only sideline the events that touch it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            IndexerError::MalformedEvent { .. }
                | IndexerError::ProtocolViolation { .. }
                | IndexerError::InvariantViolation { .. }
                | IndexerError::Arithmetic { .. }
        ) || self.is_entity_fault()
    }

    /// A stored record scoped to one game or player cannot be used and needs
    /// operator repair. The platform stats record is shared by every event,
    /// so a fault there halts the queue instead.
    pub fn is_entity_fault(&self) -> bool {
        let platform_stats = EntityKind::PlatformStats.as_str();
        match self {
            IndexerError::EntityIdInvalid { .. } => true,
            IndexerError::CorruptEntity { kind, .. } => kind != platform_stats,
            IndexerError::EntityKindMismatch {
                expected, found, ..
            } => expected != platform_stats && found != platform_stats,
            _ => false,
        }
    }

    pub fn protocol(key: impl Into<String>, violation: ProtocolViolation) -> Self {
        IndexerError::ProtocolViolation {
            key: key.into(),
            violation,
        }
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        IndexerError::InvariantViolation {
            reason: reason.into(),
        }
    }

    pub(crate) fn arithmetic(reason: impl Into<String>) -> Self {
        IndexerError::Arithmetic {
            reason: reason.into(),
        }
    }
}

/// An event that is not legal for the current state of its game.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("event {event_id} was already applied")]
    DuplicateEvent { event_id: String },
    #[error("game already exists in phase {phase}")]
    GameAlreadyExists { phase: GamePhase },
    #[error("no game record for {event}")]
    GameNotFound { event: &'static str },
    #[error("{event} is not legal in phase {phase}")]
    IllegalTransition {
        event: &'static str,
        phase: GamePhase,
    },
    #[error("cell {cell_index} was already revealed")]
    CellAlreadyRevealed { cell_index: u32 },
    #[error("resolved cell {found} does not match pending cell {expected}")]
    CellMismatch { expected: u32, found: u32 },
    #[error("game holds no stake to release")]
    NoStakeToRelease,
    #[error("revert of {event_id} out of order, latest applied is {latest:?}")]
    RevertOutOfOrder {
        event_id: String,
        latest: Option<String>,
    },
    #[error("event {event_id} is final and can no longer be reverted")]
    RevertOfFinalEvent { event_id: String },
}

impl From<serde_json::Error> for IndexerError {
    fn from(error: serde_json::Error) -> Self {
        IndexerError::Serde(error.to_string())
    }
}

impl From<io::Error> for IndexerError {
    fn from(error: io::Error) -> Self {
        IndexerError::Io(error.to_string())
    }
}
