//! Platform-wide aggregate counters.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::IndexerError;
use super::store::EntityStore;
use super::types::{BlockTime, PLATFORM_STATS_ID};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformStats {
    /// Raw wad units currently at stake. Falls on cash-out.
    pub total_staked: U256,
    pub total_games: u64,
    pub total_users: u64,
    pub total_stakers: u64,
    pub updated_at: BlockTime,
}

impl PlatformStats {
    pub fn entity_id(&self) -> &'static str {
        PLATFORM_STATS_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaDirection {
    Increase,
    Decrease,
}

impl DeltaDirection {
    fn flipped(self) -> Self {
        match self {
            DeltaDirection::Increase => DeltaDirection::Decrease,
            DeltaDirection::Decrease => DeltaDirection::Increase,
        }
    }
}

/// One requested counter change. Count counters always move by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "counter", rename_all = "snake_case")]
pub enum StatsDelta {
    TotalStaked {
        direction: DeltaDirection,
        amount: U256,
    },
    TotalGames {
        direction: DeltaDirection,
    },
    TotalUsers {
        direction: DeltaDirection,
    },
    TotalStakers {
        direction: DeltaDirection,
    },
}

impl StatsDelta {
    pub fn stake_added(amount: U256) -> Self {
        StatsDelta::TotalStaked {
            direction: DeltaDirection::Increase,
            amount,
        }
    }

    pub fn stake_released(amount: U256) -> Self {
        StatsDelta::TotalStaked {
            direction: DeltaDirection::Decrease,
            amount,
        }
    }

    pub fn game_created() -> Self {
        StatsDelta::TotalGames {
            direction: DeltaDirection::Increase,
        }
    }

    pub fn user_joined() -> Self {
        StatsDelta::TotalUsers {
            direction: DeltaDirection::Increase,
        }
    }

    pub fn staker_joined() -> Self {
        StatsDelta::TotalStakers {
            direction: DeltaDirection::Increase,
        }
    }

    pub fn staker_left() -> Self {
        StatsDelta::TotalStakers {
            direction: DeltaDirection::Decrease,
        }
    }

    pub fn negate(&self) -> Self {
        match *self {
            StatsDelta::TotalStaked { direction, amount } => StatsDelta::TotalStaked {
                direction: direction.flipped(),
                amount,
            },
            StatsDelta::TotalGames { direction } => StatsDelta::TotalGames {
                direction: direction.flipped(),
            },
            StatsDelta::TotalUsers { direction } => StatsDelta::TotalUsers {
                direction: direction.flipped(),
            },
            StatsDelta::TotalStakers { direction } => StatsDelta::TotalStakers {
                direction: direction.flipped(),
            },
        }
    }

    fn apply_to(&self, stats: &mut PlatformStats, undo: bool) -> Result<(), IndexerError> {
        match *self {
            StatsDelta::TotalStaked { direction, amount } => {
                stats.total_staked = step_amount(stats.total_staked, direction, amount)
                    .ok_or_else(|| {
                        IndexerError::invariant(format!(
                            "total_staked {} cannot move {direction:?} by {amount}",
                            stats.total_staked
                        ))
                    })?;
            }
            StatsDelta::TotalGames { direction } => {
                if direction == DeltaDirection::Decrease && !undo {
                    return Err(IndexerError::invariant("total_games never decreases"));
                }
                stats.total_games = step_count(stats.total_games, direction, "total_games")?;
            }
            StatsDelta::TotalUsers { direction } => {
                if direction == DeltaDirection::Decrease && !undo {
                    return Err(IndexerError::invariant("total_users never decreases"));
                }
                stats.total_users = step_count(stats.total_users, direction, "total_users")?;
            }
            StatsDelta::TotalStakers { direction } => {
                stats.total_stakers = step_count(stats.total_stakers, direction, "total_stakers")?;
            }
        }
        Ok(())
    }
}

fn step_amount(current: U256, direction: DeltaDirection, amount: U256) -> Option<U256> {
    match direction {
        DeltaDirection::Increase => current.checked_add(amount),
        DeltaDirection::Decrease => current.checked_sub(amount),
    }
}

fn step_count(current: u64, direction: DeltaDirection, label: &str) -> Result<u64, IndexerError> {
    let next = match direction {
        DeltaDirection::Increase => current.checked_add(1),
        DeltaDirection::Decrease => current.checked_sub(1),
    };
    next.ok_or_else(|| IndexerError::invariant(format!("{label} {current} cannot move {direction:?}")))
}

/// A logged, reversible application of deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDeltaRecord {
    pub deltas: Vec<StatsDelta>,
    pub applied_at: BlockTime,
    pub prior_updated_at: BlockTime,
}

/// Owner of the single `PlatformStats` record.
#[derive(Debug, Clone, Default)]
pub struct AggregateStatsTracker {
    stats: Option<PlatformStats>,
}

pub type SharedStatsTracker = Arc<Mutex<AggregateStatsTracker>>;

pub fn shared_stats_tracker() -> SharedStatsTracker {
    Arc::new(Mutex::new(AggregateStatsTracker::new()))
}

pub(crate) fn lock_tracker(
    tracker: &SharedStatsTracker,
) -> Result<MutexGuard<'_, AggregateStatsTracker>, IndexerError> {
    tracker.lock().map_err(|_| IndexerError::LockPoisoned {
        what: "platform stats tracker".to_string(),
    })
}

impl AggregateStatsTracker {
    pub fn new() -> Self {
        Self { stats: None }
    }

    /// Created on first touch: loads the persisted record or starts from zero.
    pub fn ensure_loaded<S: EntityStore + ?Sized>(
        &mut self,
        store: &S,
    ) -> Result<&PlatformStats, IndexerError> {
        let stats = match self.stats.take() {
            Some(stats) => stats,
            None => store.load_platform_stats()?.unwrap_or_default(),
        };
        let stats: &PlatformStats = self.stats.insert(stats);
        Ok(stats)
    }

    pub fn current(&self) -> PlatformStats {
        self.stats.clone().unwrap_or_default()
    }

    pub fn preview_apply(
        &self,
        deltas: &[StatsDelta],
        at: BlockTime,
    ) -> Result<(PlatformStats, StatsDeltaRecord), IndexerError> {
        let mut next = self.current();
        let prior_updated_at = next.updated_at;
        for delta in deltas {
            delta.apply_to(&mut next, false)?;
        }
        next.updated_at = at;
        let record = StatsDeltaRecord {
            deltas: deltas.to_vec(),
            applied_at: at,
            prior_updated_at,
        };
        Ok((next, record))
    }

    pub fn preview_revert(
        &self,
        record: &StatsDeltaRecord,
        at: BlockTime,
    ) -> Result<PlatformStats, IndexerError> {
        let mut next = self.current();
        let stamped_since = next.updated_at != record.applied_at;
        for delta in record.deltas.iter().rev() {
            delta.negate().apply_to(&mut next, true)?;
        }
        next.updated_at = if stamped_since {
            at
        } else {
            record.prior_updated_at
        };
        Ok(next)
    }

    pub fn commit(&mut self, next: PlatformStats) {
        self.stats = Some(next);
    }

    pub fn apply(
        &mut self,
        deltas: &[StatsDelta],
        at: BlockTime,
    ) -> Result<StatsDeltaRecord, IndexerError> {
        let (next, record) = self.preview_apply(deltas, at)?;
        self.commit(next);
        Ok(record)
    }

    pub fn revert(&mut self, record: &StatsDeltaRecord, at: BlockTime) -> Result<(), IndexerError> {
        let next = self.preview_revert(record, at)?;
        self.commit(next);
        Ok(())
    }
}
