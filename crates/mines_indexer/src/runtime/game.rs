//! Persisted per-game state.

use alloy_primitives::U256;
use mines_proto::GameKey;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::decimal::FixedPointDecimal;
use super::error::IndexerError;
use super::types::BlockTime;

/// Board size. The discriminant is the on-chain dimension index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TableDimension {
    ThreeByThree = 0,
    FiveByFive = 1,
    SevenBySeven = 2,
    EightByEight = 3,
}

impl TableDimension {
    /// Unknown cell counts are rejected, never mapped to a default board.
    pub fn from_total_cells(total_cells: u32) -> Option<Self> {
        match total_cells {
            9 => Some(Self::ThreeByThree),
            25 => Some(Self::FiveByFive),
            49 => Some(Self::SevenBySeven),
            64 => Some(Self::EightByEight),
            _ => None,
        }
    }

    pub fn side(self) -> u32 {
        match self {
            Self::ThreeByThree => 3,
            Self::FiveByFive => 5,
            Self::SevenBySeven => 7,
            Self::EightByEight => 8,
        }
    }

    pub fn total_cells(self) -> u32 {
        self.side() * self.side()
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Explicit lifecycle of a game record. A missing record is the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Created,
    CommitPending,
    Busted,
    CashedOut,
}

impl GamePhase {
    pub fn is_active(self) -> bool {
        matches!(self, GamePhase::Created | GamePhase::CommitPending)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GamePhase::Created => "created",
            GamePhase::CommitPending => "commit_pending",
            GamePhase::Busted => "busted",
            GamePhase::CashedOut => "cashed_out",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub key: GameKey,
    pub phase: GamePhase,
    /// Stake in whole units, truncated from `stake_wad`.
    pub stake: U256,
    pub stake_wad: U256,
    pub table_dimension: TableDimension,
    pub remaining_cells: u32,
    pub remaining_mines: u32,
    pub cumulative_multiplier: FixedPointDecimal,
    pub steps: u32,
    pub vrf_request_id: U256,
    pub is_mine: bool,
    #[serde(default)]
    pub revealed_cells: Vec<u32>,
    #[serde(default)]
    pub pending_cell: Option<u32>,
    pub cashout_amount: FixedPointDecimal,
    pub created_at: BlockTime,
    pub updated_at: BlockTime,
    #[serde(default)]
    pub last_event_id: Option<String>,
}

impl Game {
    pub fn active(&self) -> bool {
        self.phase.is_active()
    }

    pub fn vrf_pending(&self) -> bool {
        matches!(self.phase, GamePhase::CommitPending)
    }

    pub fn cashed_out(&self) -> bool {
        matches!(self.phase, GamePhase::CashedOut)
    }

    /// Pending cell in the on-chain `-1 = none` encoding.
    pub fn pending_cell_index(&self) -> i64 {
        self.pending_cell.map(i64::from).unwrap_or(-1)
    }

    pub fn entity_id(&self) -> String {
        self.key.entity_id()
    }

    /// Checks the cross-field invariants every persisted game must satisfy.
    pub fn check_invariants(&self) -> Result<(), IndexerError> {
        let fail = |reason: String| {
            Err(IndexerError::invariant(format!(
                "game {}: {reason}",
                self.key.entity_id()
            )))
        };
        if self.vrf_pending() != self.pending_cell.is_some() {
            return fail(format!(
                "vrf pending {} but pending cell {:?}",
                self.vrf_pending(),
                self.pending_cell
            ));
        }
        if self.is_mine && self.active() {
            return fail("mine revealed on an active game".to_string());
        }
        if self.cashed_out() && self.active() {
            return fail("cashed out game still active".to_string());
        }
        let board = self.table_dimension.total_cells() as usize;
        if self.revealed_cells.len() > board {
            return fail(format!(
                "{} revealed cells on a {board}-cell board",
                self.revealed_cells.len()
            ));
        }
        Ok(())
    }
}
