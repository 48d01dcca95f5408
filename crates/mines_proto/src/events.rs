//! Typed contract events as delivered by the event source.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::identity::GameKey;

/// Block and log coordinates of one delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl EventMeta {
    /// Stable id of the log: `0x<tx hash>-<log index>`.
    pub fn event_id(&self) -> String {
        format!(
            "0x{}-{}",
            hex::encode(self.transaction_hash.as_slice()),
            self.log_index
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum MinesEvent {
    GameCreated {
        player: Address,
        game_id: U256,
        stake: U256,
        total_cells: u32,
        total_mines: u32,
    },
    CellCommitted {
        player: Address,
        game_id: U256,
        request_id: U256,
        cell_index: u32,
    },
    CellResolved {
        player: Address,
        game_id: U256,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cell_index: Option<u32>,
        is_mine: bool,
        cumulative_multiplier_wad: U256,
    },
    CashedOut {
        player: Address,
        game_id: U256,
        amount_wad: U256,
    },
}

impl MinesEvent {
    pub fn game_key(&self) -> GameKey {
        match self {
            MinesEvent::GameCreated {
                player, game_id, ..
            }
            | MinesEvent::CellCommitted {
                player, game_id, ..
            }
            | MinesEvent::CellResolved {
                player, game_id, ..
            }
            | MinesEvent::CashedOut {
                player, game_id, ..
            } => GameKey::new(*player, *game_id),
        }
    }

    pub fn player(&self) -> Address {
        self.game_key().player
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            MinesEvent::GameCreated { .. } => "game_created",
            MinesEvent::CellCommitted { .. } => "cell_committed",
            MinesEvent::CellResolved { .. } => "cell_resolved",
            MinesEvent::CashedOut { .. } => "cashed_out",
        }
    }
}

/// Whether the payload is new history or the undo notification of a block
/// that fell out of the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Apply,
    Revert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub meta: EventMeta,
    pub event: MinesEvent,
    #[serde(default)]
    pub mode: DeliveryMode,
}

impl EventEnvelope {
    pub fn apply(meta: EventMeta, event: MinesEvent) -> Self {
        Self {
            meta,
            event,
            mode: DeliveryMode::Apply,
        }
    }

    pub fn revert(meta: EventMeta, event: MinesEvent) -> Self {
        Self {
            meta,
            event,
            mode: DeliveryMode::Revert,
        }
    }

    /// Same payload, tagged as a reorg undo.
    pub fn reverted(&self) -> Self {
        Self::revert(self.meta, self.event.clone())
    }

    pub fn event_id(&self) -> String {
        self.meta.event_id()
    }

    pub fn game_key(&self) -> GameKey {
        self.event.game_key()
    }

    pub fn is_revert(&self) -> bool {
        matches!(self.mode, DeliveryMode::Revert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(log_index: u64) -> EventMeta {
        EventMeta {
            block_number: 10,
            block_timestamp: 1_700_000_000,
            transaction_hash: B256::repeat_byte(0x11),
            log_index,
        }
    }

    #[test]
    fn event_id_is_transaction_hash_and_log_index() {
        let id = meta(3).event_id();
        assert!(id.starts_with("0x1111"));
        assert!(id.ends_with("-3"));
        assert_ne!(id, meta(4).event_id());
    }

    #[test]
    fn envelope_without_mode_defaults_to_apply() {
        let envelope = EventEnvelope::apply(
            meta(0),
            MinesEvent::CashedOut {
                player: Address::repeat_byte(0x22),
                game_id: U256::from(1_u64),
                amount_wad: U256::from(5_u64),
            },
        );
        let mut value = serde_json::to_value(&envelope).expect("serialize envelope");
        value
            .as_object_mut()
            .expect("envelope object")
            .remove("mode");
        let decoded: EventEnvelope = serde_json::from_value(value).expect("decode envelope");
        assert_eq!(decoded.mode, DeliveryMode::Apply);
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn reverted_keeps_payload_and_flips_mode() {
        let envelope = EventEnvelope::apply(
            meta(1),
            MinesEvent::CellCommitted {
                player: Address::repeat_byte(0x22),
                game_id: U256::from(9_u64),
                request_id: U256::from(7_u64),
                cell_index: 4,
            },
        );
        let undo = envelope.reverted();
        assert!(undo.is_revert());
        assert_eq!(undo.event, envelope.event);
        assert_eq!(undo.event_id(), envelope.event_id());
        assert_eq!(undo.game_key().game_id, U256::from(9_u64));
    }
}
