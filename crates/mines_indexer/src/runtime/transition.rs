//! Game lifecycle transitions.
//!
//! | event          | legal from               | to                 |
//! |----------------|--------------------------|--------------------|
//! | GameCreated    | no record                | Created            |
//! | CellCommitted  | Created                  | CommitPending      |
//! | CellResolved   | CommitPending            | Created / Busted   |
//! | CashedOut      | Created, CommitPending   | CashedOut          |
//!
//! Everything else is a protocol violation and leaves the game untouched.

use alloy_primitives::U256;
use mines_proto::{GameKey, MinesEvent};

use super::decimal::{scale_down_truncating, FixedPointDecimal};
use super::error::{IndexerError, ProtocolViolation};
use super::game::{Game, GamePhase, TableDimension};
use super::player::StakeEffect;
use super::types::BlockTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameTransition {
    pub game: Game,
    pub stake: StakeEffect,
}

pub struct GameStateMachine;

impl GameStateMachine {
    pub fn apply(
        current: Option<&Game>,
        event: &MinesEvent,
        event_id: &str,
        at: BlockTime,
    ) -> Result<GameTransition, IndexerError> {
        let key = event.game_key();
        let transition = match event {
            MinesEvent::GameCreated {
                stake,
                total_cells,
                total_mines,
                ..
            } => {
                if let Some(game) = current {
                    return Err(IndexerError::protocol(
                        key.entity_id(),
                        ProtocolViolation::GameAlreadyExists { phase: game.phase },
                    ));
                }
                create(key, *stake, *total_cells, *total_mines, event_id, at)?
            }
            MinesEvent::CellCommitted {
                request_id,
                cell_index,
                ..
            } => {
                let game = require_phase(current, event, &[GamePhase::Created])?;
                commit(game, *request_id, *cell_index, event_id, at)?
            }
            MinesEvent::CellResolved {
                cell_index,
                is_mine,
                cumulative_multiplier_wad,
                ..
            } => {
                let game = require_phase(current, event, &[GamePhase::CommitPending])?;
                resolve(game, *cell_index, *is_mine, *cumulative_multiplier_wad, at)?
            }
            MinesEvent::CashedOut { amount_wad, .. } => {
                let game = require_phase(
                    current,
                    event,
                    &[GamePhase::Created, GamePhase::CommitPending],
                )?;
                cash_out(game, *amount_wad, at)?
            }
        };
        transition.game.check_invariants()?;
        Ok(transition)
    }
}

fn require_phase<'a>(
    current: Option<&'a Game>,
    event: &MinesEvent,
    allowed: &[GamePhase],
) -> Result<&'a Game, IndexerError> {
    let key = event.game_key().entity_id();
    let game = current.ok_or_else(|| {
        IndexerError::protocol(
            key.clone(),
            ProtocolViolation::GameNotFound {
                event: event.kind_label(),
            },
        )
    })?;
    if !allowed.contains(&game.phase) {
        return Err(IndexerError::protocol(
            key,
            ProtocolViolation::IllegalTransition {
                event: event.kind_label(),
                phase: game.phase,
            },
        ));
    }
    Ok(game)
}

fn malformed(event_id: &str, reason: String) -> IndexerError {
    IndexerError::MalformedEvent {
        event_id: event_id.to_string(),
        reason,
    }
}

fn create(
    key: GameKey,
    stake_wad: U256,
    total_cells: u32,
    total_mines: u32,
    event_id: &str,
    at: BlockTime,
) -> Result<GameTransition, IndexerError> {
    let table_dimension = TableDimension::from_total_cells(total_cells)
        .ok_or_else(|| malformed(event_id, format!("unsupported cell count {total_cells}")))?;
    if total_mines == 0 || total_mines >= total_cells {
        return Err(malformed(
            event_id,
            format!("mine count {total_mines} invalid for {total_cells} cells"),
        ));
    }
    if stake_wad.is_zero() {
        return Err(malformed(event_id, "game created without stake".to_string()));
    }

    let game = Game {
        key,
        phase: GamePhase::Created,
        stake: scale_down_truncating(stake_wad),
        stake_wad,
        table_dimension,
        remaining_cells: total_cells,
        remaining_mines: total_mines,
        cumulative_multiplier: FixedPointDecimal::one(),
        steps: 0,
        vrf_request_id: U256::ZERO,
        is_mine: false,
        revealed_cells: Vec::new(),
        pending_cell: None,
        cashout_amount: FixedPointDecimal::zero(),
        created_at: at,
        updated_at: at,
        last_event_id: None,
    };
    Ok(GameTransition {
        game,
        stake: StakeEffect::Opened { stake_wad },
    })
}

fn commit(
    game: &Game,
    request_id: U256,
    cell_index: u32,
    event_id: &str,
    at: BlockTime,
) -> Result<GameTransition, IndexerError> {
    let board = game.table_dimension.total_cells();
    if cell_index >= board {
        return Err(malformed(
            event_id,
            format!("cell {cell_index} outside a {board}-cell board"),
        ));
    }
    if game.revealed_cells.contains(&cell_index) {
        return Err(IndexerError::protocol(
            game.entity_id(),
            ProtocolViolation::CellAlreadyRevealed { cell_index },
        ));
    }

    let mut next = game.clone();
    next.phase = GamePhase::CommitPending;
    next.vrf_request_id = request_id;
    next.pending_cell = Some(cell_index);
    next.updated_at = at;
    Ok(GameTransition {
        game: next,
        stake: StakeEffect::None,
    })
}

fn resolve(
    game: &Game,
    cell_index: Option<u32>,
    is_mine: bool,
    cumulative_multiplier_wad: U256,
    at: BlockTime,
) -> Result<GameTransition, IndexerError> {
    let pending = game.pending_cell.ok_or_else(|| {
        IndexerError::invariant(format!("game {} pending without a cell", game.entity_id()))
    })?;
    if let Some(found) = cell_index {
        if found != pending {
            return Err(IndexerError::protocol(
                game.entity_id(),
                ProtocolViolation::CellMismatch {
                    expected: pending,
                    found,
                },
            ));
        }
    }

    let mut next = game.clone();
    next.is_mine = is_mine;
    next.phase = if is_mine {
        GamePhase::Busted
    } else {
        GamePhase::Created
    };
    next.cumulative_multiplier = FixedPointDecimal::from_wad(cumulative_multiplier_wad);
    next.revealed_cells.push(pending);
    next.pending_cell = None;
    next.vrf_request_id = U256::ZERO;
    if !is_mine {
        next.steps = next.steps.saturating_add(1);
        next.remaining_cells = next.remaining_cells.saturating_sub(1);
    }
    next.updated_at = at;
    Ok(GameTransition {
        game: next,
        stake: StakeEffect::None,
    })
}

fn cash_out(game: &Game, amount_wad: U256, at: BlockTime) -> Result<GameTransition, IndexerError> {
    if game.stake_wad.is_zero() {
        return Err(IndexerError::protocol(
            game.entity_id(),
            ProtocolViolation::NoStakeToRelease,
        ));
    }
    let released = game.stake_wad;

    // Quiescent record: identity and payout stay, board state is cleared.
    let mut next = game.clone();
    next.phase = GamePhase::CashedOut;
    next.cashout_amount = FixedPointDecimal::from_wad(amount_wad);
    next.is_mine = false;
    next.vrf_request_id = U256::ZERO;
    next.pending_cell = None;
    next.revealed_cells.clear();
    next.steps = 0;
    next.cumulative_multiplier = FixedPointDecimal::zero();
    next.remaining_cells = 0;
    next.remaining_mines = 0;
    next.stake = U256::ZERO;
    next.stake_wad = U256::ZERO;
    next.updated_at = at;
    Ok(GameTransition {
        game: next,
        stake: StakeEffect::Released {
            stake_wad: released,
        },
    })
}
