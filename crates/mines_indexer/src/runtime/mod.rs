//! Runtime module - the event aggregation engine.
//!
//! This module contains everything needed to turn delivered contract events
//! into persisted entity state:
//! - Fixed-point values and the per-game state machine
//! - Player ledger and platform-wide aggregate counters
//! - Entity store adapters with batched commits
//! - Dispatch with duplicate detection and reorg undo
//! - Retrying pipeline and the partitioned worker pool

mod decimal;
mod dispatcher;
mod error;
mod game;
mod journal;
mod pipeline;
mod player;
mod retry;
mod stats;
mod store;
mod transition;
mod types;
mod worker;

#[cfg(test)]
mod tests;

// Types
pub use types::{BlockTime, EventId, PLATFORM_STATS_ID};

// Error
pub use error::{IndexerError, ProtocolViolation};

// Fixed point
pub use decimal::{scale_down_truncating, FixedPointDecimal, WAD, WAD_DECIMALS};

// Entities
pub use game::{Game, GamePhase, TableDimension};
pub use journal::{AppliedEventRecord, EventUndo};
pub use player::{PlayerLedgerUpdate, PlayerRecord, PlayerWrite, StakeEffect};
pub use stats::{
    shared_stats_tracker, AggregateStatsTracker, DeltaDirection, PlatformStats,
    SharedStatsTracker, StatsDelta, StatsDeltaRecord,
};

// State machine
pub use transition::{GameStateMachine, GameTransition};

// Store
pub use store::{
    Entity, EntityKind, EntityStore, FileEntityStore, InMemoryEntityStore, WriteBatch, WriteOp,
};

// Dispatch
pub use dispatcher::{
    DispatchOutcome, EventDispatcher, RejectedEvent, SkipReason, DEFAULT_MAX_REJECTED_EVENTS,
};
pub use pipeline::{IndexerPipeline, JournalRetention, PipelineReport};
pub use retry::RetryPolicy;
pub use worker::{shard_index, PartitionedIndexer};
