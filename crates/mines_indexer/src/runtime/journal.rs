//! Applied-event log used for duplicate detection and reorg undo.

use mines_proto::{EventEnvelope, GameKey};
use serde::{Deserialize, Serialize};

use super::game::Game;
use super::player::StakeEffect;
use super::stats::StatsDeltaRecord;
use super::types::{BlockTime, EventId};

/// One applied event. The record outlives its undo data: once the event is
/// final only the identity is needed, for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEventRecord {
    pub event_id: EventId,
    pub key: GameKey,
    pub envelope: EventEnvelope,
    /// `None` once compacted.
    pub undo: Option<EventUndo>,
}

/// Everything needed to undo one applied event exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUndo {
    /// Game record before the event. `None` when the event created it.
    pub prior_game: Option<Game>,
    /// Previous top of this game's event stack.
    pub previous_event_id: Option<EventId>,
    pub stake: StakeEffect,
    /// Player `updated_at` before the event, when the event touched the player.
    #[serde(default)]
    pub prior_player_updated_at: Option<BlockTime>,
    /// Previous top of the player's ledger stack.
    #[serde(default)]
    pub previous_player_event_id: Option<EventId>,
    pub stats: StatsDeltaRecord,
}

impl AppliedEventRecord {
    pub fn entity_id(&self) -> &str {
        &self.event_id
    }

    pub fn block_number(&self) -> u64 {
        self.envelope.meta.block_number
    }

    pub fn is_final(&self) -> bool {
        self.undo.is_none()
    }

    /// True when the event sits at least `finality_blocks` below `head_block`.
    pub fn is_settled(&self, head_block: u64, finality_blocks: u64) -> bool {
        finality_blocks > 0 && self.block_number().saturating_add(finality_blocks) <= head_block
    }

    pub fn compacted(&self) -> Self {
        Self {
            undo: None,
            ..self.clone()
        }
    }
}
