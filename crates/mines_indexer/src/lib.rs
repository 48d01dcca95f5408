pub mod config;
pub mod runtime;

pub use config::{
    ConfigError, IndexerConfig, DEFAULT_CONFIG_FILE_NAME, DEFAULT_FINALITY_BLOCKS, DEFAULT_SHARDS,
    ENV_FINALITY_BLOCKS, ENV_MAX_REJECTED_EVENTS, ENV_RETRY_INITIAL_BACKOFF_MS,
    ENV_RETRY_MAX_ATTEMPTS, ENV_RETRY_MAX_BACKOFF_MS, ENV_SHARDS, ENV_STORE_DIR,
};
pub use runtime::{
    scale_down_truncating, shard_index, shared_stats_tracker, AggregateStatsTracker,
    AppliedEventRecord, BlockTime, DeltaDirection, DispatchOutcome, Entity, EntityKind,
    EntityStore, EventDispatcher, EventId, EventUndo, FileEntityStore, FixedPointDecimal, Game,
    GamePhase, GameStateMachine, GameTransition, InMemoryEntityStore, IndexerError,
    IndexerPipeline, JournalRetention, PartitionedIndexer, PipelineReport, PlatformStats,
    PlayerLedgerUpdate, PlayerRecord, PlayerWrite, ProtocolViolation, RejectedEvent, RetryPolicy,
    SharedStatsTracker, SkipReason, StakeEffect, StatsDelta, StatsDeltaRecord, TableDimension,
    WriteBatch, WriteOp, DEFAULT_MAX_REJECTED_EVENTS, PLATFORM_STATS_ID, WAD, WAD_DECIMALS,
};
