//! In-order event queue in front of one dispatcher.

use std::collections::VecDeque;

use mines_proto::{EventEnvelope, GameKey};
use serde::{Deserialize, Serialize};

use super::dispatcher::{DispatchOutcome, EventDispatcher};
use super::error::IndexerError;
use super::retry::RetryPolicy;
use super::store::EntityStore;
use super::worker::shard_index;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub applied: u64,
    pub reverted: u64,
    pub rejected: u64,
    pub skipped: u64,
}

impl PipelineReport {
    pub fn record(&mut self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Applied { .. } => &mut self.applied,
            DispatchOutcome::Reverted { .. } => &mut self.reverted,
            DispatchOutcome::Rejected(_) => &mut self.rejected,
            DispatchOutcome::Skipped { .. } => &mut self.skipped,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn merge(&mut self, other: &PipelineReport) {
        self.applied = self.applied.saturating_add(other.applied);
        self.reverted = self.reverted.saturating_add(other.reverted);
        self.rejected = self.rejected.saturating_add(other.rejected);
        self.skipped = self.skipped.saturating_add(other.skipped);
    }

    pub fn processed(&self) -> u64 {
        self.applied
            .saturating_add(self.reverted)
            .saturating_add(self.rejected)
            .saturating_add(self.skipped)
    }
}

/// Which settled journal records a pipeline compacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRetention {
    /// Depth after which an applied event is final. Zero keeps undo data.
    pub finality_blocks: u64,
    pub shard: usize,
    pub shards: usize,
}

impl Default for JournalRetention {
    fn default() -> Self {
        Self {
            finality_blocks: 0,
            shard: 0,
            shards: 1,
        }
    }
}

impl JournalRetention {
    pub fn owns(&self, key: &GameKey) -> bool {
        shard_index(&key.player, self.shards) == self.shard
    }
}

pub struct IndexerPipeline<S> {
    dispatcher: EventDispatcher<S>,
    retry: RetryPolicy,
    retention: JournalRetention,
    queue: VecDeque<EventEnvelope>,
    totals: PipelineReport,
    head_block: u64,
    compacted_at: u64,
}

impl<S: EntityStore> IndexerPipeline<S> {
    pub fn new(dispatcher: EventDispatcher<S>, retry: RetryPolicy) -> Self {
        Self {
            dispatcher,
            retry,
            retention: JournalRetention::default(),
            queue: VecDeque::new(),
            totals: PipelineReport::default(),
            head_block: 0,
            compacted_at: 0,
        }
    }

    pub fn with_retention(mut self, retention: JournalRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Highest block of any applied event seen so far.
    pub fn head_block(&self) -> u64 {
        self.head_block
    }

    pub fn submit(&mut self, envelope: EventEnvelope) {
        self.queue.push_back(envelope);
    }

    pub fn submit_all(&mut self, envelopes: impl IntoIterator<Item = EventEnvelope>) {
        self.queue.extend(envelopes);
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn dispatcher(&self) -> &EventDispatcher<S> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher<S> {
        &mut self.dispatcher
    }

    /// Everything processed since the pipeline was created.
    pub fn totals(&self) -> PipelineReport {
        self.totals
    }

    /// Hands back whatever is still queued.
    pub fn drain_pending(&mut self) -> Vec<EventEnvelope> {
        self.queue.drain(..).collect()
    }

    /// Drains the queue in order. An event that still fails after the retry
    /// policy is exhausted goes back to the head of the queue and the error
    /// is returned; nothing behind it is processed.
    pub fn run_until_idle(&mut self) -> Result<PipelineReport, IndexerError> {
        let mut report = PipelineReport::default();
        while let Some(envelope) = self.queue.pop_front() {
            let event_id = envelope.event_id();
            let dispatcher = &mut self.dispatcher;
            match self.retry.run(&event_id, || dispatcher.dispatch(&envelope)) {
                Ok(outcome) => {
                    if !envelope.is_revert() {
                        self.head_block = self.head_block.max(envelope.meta.block_number);
                    }
                    report.record(&outcome);
                    self.totals.record(&outcome);
                }
                Err(error) => {
                    tracing::error!(
                        event_id = %event_id,
                        pending = self.queue.len() + 1,
                        %error,
                        "event requeued"
                    );
                    self.queue.push_front(envelope);
                    return Err(error);
                }
            }
        }
        self.compact_settled();
        Ok(report)
    }

    /// Runs once the head has moved a full finality depth since the last
    /// pass. A failed pass is retried on the next idle.
    fn compact_settled(&mut self) {
        let retention = self.retention;
        let finality_blocks = retention.finality_blocks;
        if finality_blocks == 0
            || self.head_block < self.compacted_at.saturating_add(finality_blocks)
        {
            return;
        }
        match self
            .dispatcher
            .compact_journal(self.head_block, finality_blocks, |key| retention.owns(key))
        {
            Ok(_) => self.compacted_at = self.head_block,
            Err(error) => tracing::warn!(
                head_block = self.head_block,
                %error,
                "journal compaction deferred"
            ),
        }
    }
}
