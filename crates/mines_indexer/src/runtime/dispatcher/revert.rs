use mines_proto::{player_entity_id, EventEnvelope};

use super::{DispatchOutcome, EventDispatcher, SkipReason};
use crate::runtime::error::{IndexerError, ProtocolViolation};
use crate::runtime::player::{PlayerRecord, PlayerWrite, StakeEffect};
use crate::runtime::stats::lock_tracker;
use crate::runtime::store::{Entity, EntityKind, EntityStore, WriteBatch};

impl<S: EntityStore> EventDispatcher<S> {
    /// Undoes one applied event. Only the most recent event of a game, and
    /// for stake movements the most recent one of the player, can be
    /// reverted, so reorgs must arrive newest first.
    pub(super) fn revert_event(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<DispatchOutcome, IndexerError> {
        let event_id = envelope.event_id();
        let Some(record) = self.store.load_applied_event(&event_id)? else {
            tracing::debug!(event_id = %event_id, "revert for unknown event skipped");
            return Ok(DispatchOutcome::Skipped {
                event_id,
                reason: SkipReason::NotApplied,
            });
        };
        let key = record.key;
        if record.envelope.event != envelope.event {
            return Err(IndexerError::MalformedEvent {
                event_id,
                reason: "revert payload differs from the applied event".to_string(),
            });
        }
        let Some(undo) = record.undo else {
            return Err(IndexerError::protocol(
                key.entity_id(),
                ProtocolViolation::RevertOfFinalEvent { event_id },
            ));
        };

        let current = self.store.load_game(&key)?;
        let latest = current.as_ref().and_then(|game| game.last_event_id.clone());
        if latest.as_deref() != Some(event_id.as_str()) {
            return Err(IndexerError::protocol(
                key.entity_id(),
                ProtocolViolation::RevertOutOfOrder { event_id, latest },
            ));
        }

        let at = envelope.meta.block_timestamp;
        let player_write = match undo.stake {
            StakeEffect::None => PlayerWrite::Unchanged,
            _ => {
                // Ledger effects depend on all of the player's games, so
                // they unwind in player order, not just game order.
                let player = self.store.load_player(&key.player)?;
                let latest = player.as_ref().and_then(|record| record.last_event_id.clone());
                if latest.as_deref() != Some(event_id.as_str()) {
                    return Err(IndexerError::protocol(
                        key.entity_id(),
                        ProtocolViolation::RevertOutOfOrder { event_id, latest },
                    ));
                }
                let mut write = PlayerRecord::revert_stake_effect(
                    player.as_ref(),
                    key.player,
                    &undo.stake,
                    undo.prior_player_updated_at,
                    at,
                )?;
                if let PlayerWrite::Save(record) = &mut write {
                    record.last_event_id = undo.previous_player_event_id.clone();
                }
                write
            }
        };

        let mut tracker = lock_tracker(&self.stats)?;
        tracker.ensure_loaded(self.store.as_ref())?;
        let next_stats = tracker.preview_revert(&undo.stats, at)?;

        let mut batch = WriteBatch::new();
        match &undo.prior_game {
            Some(prior) => {
                batch.save(Entity::Game(prior.clone()));
            }
            None => {
                batch.remove(EntityKind::Game, key.entity_id());
            }
        }
        match player_write {
            PlayerWrite::Unchanged => {}
            PlayerWrite::Save(player) => {
                batch.save(Entity::Player(player));
            }
            PlayerWrite::Remove => {
                batch.remove(EntityKind::Player, player_entity_id(&key.player));
            }
        }
        batch
            .remove(EntityKind::AppliedEvent, event_id.clone())
            .save(Entity::PlatformStats(next_stats.clone()));
        self.store.commit(batch)?;
        tracker.commit(next_stats);

        tracing::info!(
            event_id = %event_id,
            game = %key,
            kind = envelope.event.kind_label(),
            "event reverted"
        );
        Ok(DispatchOutcome::Reverted { event_id, key })
    }
}
