use mines_proto::{player_entity_id, EventEnvelope};

use super::{DispatchOutcome, EventDispatcher};
use crate::runtime::error::{IndexerError, ProtocolViolation};
use crate::runtime::journal::{AppliedEventRecord, EventUndo};
use crate::runtime::player::{PlayerRecord, PlayerWrite, StakeEffect};
use crate::runtime::stats::lock_tracker;
use crate::runtime::store::{Entity, EntityKind, EntityStore, WriteBatch};
use crate::runtime::transition::GameStateMachine;

impl<S: EntityStore> EventDispatcher<S> {
    pub(super) fn apply_event(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<DispatchOutcome, IndexerError> {
        let event_id = envelope.event_id();
        let key = envelope.game_key();
        let at = envelope.meta.block_timestamp;

        if self.store.load_applied_event(&event_id)?.is_some() {
            return Err(IndexerError::protocol(
                key.entity_id(),
                ProtocolViolation::DuplicateEvent { event_id },
            ));
        }

        let current = self.store.load_game(&key)?;
        let transition = GameStateMachine::apply(current.as_ref(), &envelope.event, &event_id, at)?;

        let player = match transition.stake {
            StakeEffect::None => None,
            _ => self.store.load_player(&key.player)?,
        };
        let mut ledger =
            PlayerRecord::apply_stake_effect(player.as_ref(), key.player, &transition.stake, at)?;
        if let PlayerWrite::Save(record) = &mut ledger.write {
            record.last_event_id = Some(event_id.clone());
        }

        let mut game = transition.game;
        game.last_event_id = Some(event_id.clone());
        let phase = game.phase;

        let mut tracker = lock_tracker(&self.stats)?;
        tracker.ensure_loaded(self.store.as_ref())?;
        let (next_stats, stats_record) = tracker.preview_apply(&ledger.deltas, at)?;

        let record = AppliedEventRecord {
            event_id: event_id.clone(),
            key,
            envelope: envelope.clone(),
            undo: Some(EventUndo {
                previous_event_id: current.as_ref().and_then(|game| game.last_event_id.clone()),
                prior_game: current,
                stake: transition.stake,
                prior_player_updated_at: player.as_ref().map(|record| record.updated_at),
                previous_player_event_id: player
                    .as_ref()
                    .and_then(|record| record.last_event_id.clone()),
                stats: stats_record,
            }),
        };

        let mut batch = WriteBatch::new();
        batch.save(Entity::Game(game));
        match ledger.write {
            PlayerWrite::Unchanged => {}
            PlayerWrite::Save(player) => {
                batch.save(Entity::Player(player));
            }
            PlayerWrite::Remove => {
                batch.remove(EntityKind::Player, player_entity_id(&key.player));
            }
        }
        batch
            .save(Entity::AppliedEvent(record))
            .save(Entity::PlatformStats(next_stats.clone()));
        self.store.commit(batch)?;
        tracker.commit(next_stats);

        tracing::info!(
            event_id = %event_id,
            game = %key,
            kind = envelope.event.kind_label(),
            phase = phase.as_str(),
            "event applied"
        );
        Ok(DispatchOutcome::Applied {
            event_id,
            key,
            phase,
        })
    }
}
