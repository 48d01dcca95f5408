//! Shared type aliases.

/// Block timestamp in seconds, as carried by every delivered event.
pub type BlockTime = u64;

/// Id of one delivered log, see `EventMeta::event_id`.
pub type EventId = String;

/// The single platform-wide stats record.
pub const PLATFORM_STATS_ID: &str = "1";
