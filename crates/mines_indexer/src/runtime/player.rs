//! Per-player stake ledger.
//!
//! Counter side effects of a game depend on the player's other games: the
//! first game ever makes a new user, and a player is a staker while any of
//! their stake is still locked. This module owns that bookkeeping.

use alloy_primitives::{Address, U256};
use mines_proto::player_entity_id;
use serde::{Deserialize, Serialize};

use super::error::IndexerError;
use super::stats::StatsDelta;
use super::types::{BlockTime, EventId};

/// Stake movement caused by one game transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum StakeEffect {
    None,
    Opened { stake_wad: U256 },
    Released { stake_wad: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player: Address,
    pub first_seen_at: BlockTime,
    pub games_created: u64,
    pub open_games: u64,
    pub active_stake_wad: U256,
    pub updated_at: BlockTime,
    /// Top of the player's ledger stack: the latest applied event that
    /// moved this player's stake. Reverts must unwind from here.
    #[serde(default)]
    pub last_event_id: Option<EventId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerWrite {
    Unchanged,
    Save(PlayerRecord),
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLedgerUpdate {
    pub write: PlayerWrite,
    pub deltas: Vec<StatsDelta>,
}

impl PlayerRecord {
    pub fn new(player: Address, at: BlockTime) -> Self {
        Self {
            player,
            first_seen_at: at,
            games_created: 0,
            open_games: 0,
            active_stake_wad: U256::ZERO,
            updated_at: at,
            last_event_id: None,
        }
    }

    pub fn entity_id(&self) -> String {
        player_entity_id(&self.player)
    }

    pub fn is_staker(&self) -> bool {
        !self.active_stake_wad.is_zero()
    }

    pub fn apply_stake_effect(
        existing: Option<&PlayerRecord>,
        player: Address,
        effect: &StakeEffect,
        at: BlockTime,
    ) -> Result<PlayerLedgerUpdate, IndexerError> {
        match *effect {
            StakeEffect::None => Ok(PlayerLedgerUpdate {
                write: PlayerWrite::Unchanged,
                deltas: Vec::new(),
            }),
            StakeEffect::Opened { stake_wad } => {
                let new_user = existing.is_none();
                let mut record = existing
                    .cloned()
                    .unwrap_or_else(|| PlayerRecord::new(player, at));
                let was_staker = record.is_staker();

                let mut deltas = vec![StatsDelta::game_created()];
                if !stake_wad.is_zero() {
                    deltas.push(StatsDelta::stake_added(stake_wad));
                }
                if new_user {
                    deltas.push(StatsDelta::user_joined());
                }
                record.active_stake_wad = record
                    .active_stake_wad
                    .checked_add(stake_wad)
                    .ok_or_else(|| IndexerError::arithmetic("player active stake overflows"))?;
                if !was_staker && record.is_staker() {
                    deltas.push(StatsDelta::staker_joined());
                }
                record.games_created = record.games_created.saturating_add(1);
                record.open_games = record.open_games.saturating_add(1);
                record.updated_at = at;
                Ok(PlayerLedgerUpdate {
                    write: PlayerWrite::Save(record),
                    deltas,
                })
            }
            StakeEffect::Released { stake_wad } => {
                let mut record = existing.cloned().ok_or_else(|| {
                    IndexerError::invariant(format!(
                        "stake released for unknown player {}",
                        player_entity_id(&player)
                    ))
                })?;
                record.active_stake_wad = release(&record, stake_wad)?;
                record.open_games = record.open_games.checked_sub(1).ok_or_else(|| {
                    IndexerError::invariant(format!(
                        "player {} has no open game to release",
                        record.entity_id()
                    ))
                })?;
                record.updated_at = at;

                let mut deltas = vec![StatsDelta::stake_released(stake_wad)];
                if !stake_wad.is_zero() && !record.is_staker() {
                    deltas.push(StatsDelta::staker_left());
                }
                Ok(PlayerLedgerUpdate {
                    write: PlayerWrite::Save(record),
                    deltas,
                })
            }
        }
    }

    /// Exact inverse of `apply_stake_effect` for the record itself. Counter
    /// deltas are undone from the logged stats record, not recomputed.
    /// `prior_updated_at` is restored unless a later event stamped the record.
    pub fn revert_stake_effect(
        existing: Option<&PlayerRecord>,
        player: Address,
        effect: &StakeEffect,
        prior_updated_at: Option<BlockTime>,
        at: BlockTime,
    ) -> Result<PlayerWrite, IndexerError> {
        if matches!(effect, StakeEffect::None) {
            return Ok(PlayerWrite::Unchanged);
        }
        let mut record = existing.cloned().ok_or_else(|| {
            IndexerError::invariant(format!(
                "revert for unknown player {}",
                player_entity_id(&player)
            ))
        })?;
        match *effect {
            StakeEffect::None => {}
            StakeEffect::Opened { stake_wad } => {
                record.active_stake_wad = release(&record, stake_wad)?;
                record.games_created = record.games_created.checked_sub(1).ok_or_else(|| {
                    IndexerError::invariant("revert of a game the player never created")
                })?;
                record.open_games = record.open_games.saturating_sub(1);
                if record.games_created == 0 {
                    return Ok(PlayerWrite::Remove);
                }
            }
            StakeEffect::Released { stake_wad } => {
                record.active_stake_wad = record
                    .active_stake_wad
                    .checked_add(stake_wad)
                    .ok_or_else(|| IndexerError::arithmetic("player active stake overflows"))?;
                record.open_games = record.open_games.saturating_add(1);
            }
        }
        record.updated_at = match prior_updated_at {
            Some(prior) if record.updated_at == at => prior,
            _ => at,
        };
        Ok(PlayerWrite::Save(record))
    }
}

fn release(record: &PlayerRecord, stake_wad: U256) -> Result<U256, IndexerError> {
    record
        .active_stake_wad
        .checked_sub(stake_wad)
        .ok_or_else(|| {
            IndexerError::invariant(format!(
                "player {} releases {stake_wad} but only {} is active",
                record.entity_id(),
                record.active_stake_wad
            ))
        })
}
