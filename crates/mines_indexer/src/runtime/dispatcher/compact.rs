use mines_proto::GameKey;

use super::EventDispatcher;
use crate::runtime::error::IndexerError;
use crate::runtime::store::{Entity, EntityKind, EntityStore, WriteBatch};

impl<S: EntityStore> EventDispatcher<S> {
    /// Drops the undo data of applied events at least `finality_blocks`
    /// below `head_block`, keeping the records for duplicate detection.
    /// Only records whose game `owns` accepts are touched, so concurrent
    /// dispatchers never rewrite each other's journal.
    pub fn compact_journal(
        &self,
        head_block: u64,
        finality_blocks: u64,
        owns: impl Fn(&GameKey) -> bool,
    ) -> Result<usize, IndexerError> {
        if finality_blocks == 0 {
            return Ok(0);
        }
        let mut batch = WriteBatch::new();
        for id in self.store.ids(EntityKind::AppliedEvent)? {
            let record = match self.store.load_applied_event(&id) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(error) if error.is_entity_fault() => {
                    tracing::warn!(event_id = %id, %error, "unreadable journal record left in place");
                    continue;
                }
                Err(error) => return Err(error),
            };
            if record.is_final()
                || !record.is_settled(head_block, finality_blocks)
                || !owns(&record.key)
            {
                continue;
            }
            batch.save(Entity::AppliedEvent(record.compacted()));
        }

        let compacted = batch.len();
        if compacted > 0 {
            self.store.commit(batch)?;
            tracing::info!(head_block, finality_blocks, compacted, "journal compacted");
        }
        Ok(compacted)
    }
}
