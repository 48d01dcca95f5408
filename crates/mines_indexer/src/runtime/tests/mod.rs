//! Tests for the runtime module.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256, U256};
use mines_proto::{EventEnvelope, EventMeta, MinesEvent};

use super::*;

mod reorg;
mod worker;

pub(super) fn player(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub(super) fn wad(units: u64) -> U256 {
    U256::from(units) * WAD
}

pub(super) fn wad_fraction(whole: u64, fraction_wad: u64) -> U256 {
    wad(whole) + U256::from(fraction_wad)
}

/// Metadata for the `log_index`-th log of block `block`.
pub(super) fn meta(block: u64, log_index: u64) -> EventMeta {
    let seed = U256::from(block) * U256::from(10_000_u64) + U256::from(log_index);
    EventMeta {
        block_number: block,
        block_timestamp: 1_700_000_000 + block * 12,
        transaction_hash: B256::from(seed.to_be_bytes::<32>()),
        log_index,
    }
}

pub(super) fn created(
    block: u64,
    player: Address,
    game_id: u64,
    stake: U256,
    total_cells: u32,
) -> EventEnvelope {
    EventEnvelope::apply(
        meta(block, 0),
        MinesEvent::GameCreated {
            player,
            game_id: U256::from(game_id),
            stake,
            total_cells,
            total_mines: 3,
        },
    )
}

pub(super) fn committed(block: u64, player: Address, game_id: u64, cell_index: u32) -> EventEnvelope {
    EventEnvelope::apply(
        meta(block, 1),
        MinesEvent::CellCommitted {
            player,
            game_id: U256::from(game_id),
            request_id: U256::from(7_u64),
            cell_index,
        },
    )
}

pub(super) fn resolved(
    block: u64,
    player: Address,
    game_id: u64,
    is_mine: bool,
    multiplier_wad: U256,
) -> EventEnvelope {
    EventEnvelope::apply(
        meta(block, 2),
        MinesEvent::CellResolved {
            player,
            game_id: U256::from(game_id),
            cell_index: None,
            is_mine,
            cumulative_multiplier_wad: multiplier_wad,
        },
    )
}

pub(super) fn cashed_out(block: u64, player: Address, game_id: u64, amount_wad: U256) -> EventEnvelope {
    EventEnvelope::apply(
        meta(block, 3),
        MinesEvent::CashedOut {
            player,
            game_id: U256::from(game_id),
            amount_wad,
        },
    )
}

pub(super) fn key(player: Address, game_id: u64) -> mines_proto::GameKey {
    mines_proto::GameKey::new(player, U256::from(game_id))
}

pub(super) fn in_memory_dispatcher() -> EventDispatcher<InMemoryEntityStore> {
    EventDispatcher::new(Arc::new(InMemoryEntityStore::new()))
}

pub(super) fn dispatch_all<S: EntityStore>(
    dispatcher: &mut EventDispatcher<S>,
    envelopes: &[EventEnvelope],
) -> Vec<DispatchOutcome> {
    envelopes
        .iter()
        .map(|envelope| dispatcher.dispatch(envelope).expect("dispatch"))
        .collect()
}

pub(super) fn load_game<S: EntityStore>(
    dispatcher: &EventDispatcher<S>,
    player: Address,
    game_id: u64,
) -> Option<Game> {
    dispatcher
        .store()
        .load_game(&key(player, game_id))
        .expect("load game")
}

pub(super) fn temp_dir(prefix: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("mines-indexer-{prefix}-{unique}"))
}

/// In-memory store whose next `failures` commits report the store as down.
#[derive(Debug, Default)]
pub(super) struct FlakyStore {
    pub inner: InMemoryEntityStore,
    failures: AtomicU32,
}

impl FlakyStore {
    pub fn failing(failures: u32) -> Self {
        Self {
            inner: InMemoryEntityStore::new(),
            failures: AtomicU32::new(failures),
        }
    }

    pub fn set_failures(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl EntityStore for FlakyStore {
    fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>, IndexerError> {
        self.inner.load(kind, id)
    }

    fn save(&self, entity: &Entity) -> Result<(), IndexerError> {
        self.inner.save(entity)
    }

    fn remove(&self, kind: EntityKind, id: &str) -> Result<(), IndexerError> {
        self.inner.remove(kind, id)
    }

    fn ids(&self, kind: EntityKind) -> Result<Vec<String>, IndexerError> {
        self.inner.ids(kind)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), IndexerError> {
        if self.take_failure() {
            return Err(IndexerError::StoreUnavailable {
                reason: "store offline".to_string(),
            });
        }
        self.inner.commit(batch)
    }
}
