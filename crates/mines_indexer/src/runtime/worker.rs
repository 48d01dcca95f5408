//! Player-partitioned pool of single-writer shards.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use alloy_primitives::Address;
use mines_proto::EventEnvelope;

use super::dispatcher::{EventDispatcher, RejectedEvent};
use super::error::IndexerError;
use super::pipeline::{IndexerPipeline, JournalRetention, PipelineReport};
use super::stats::{lock_tracker, shared_stats_tracker, PlatformStats, SharedStatsTracker};
use super::store::EntityStore;
use crate::config::IndexerConfig;

/// Shard owning every game of `player`. All of a player's games share one
/// `PlayerRecord`, so routing is by player rather than by full game key.
pub fn shard_index(player: &Address, shards: usize) -> usize {
    if shards <= 1 {
        return 0;
    }
    let digest = blake3::hash(player.as_slice());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % shards as u64) as usize
}

enum ShardCommand {
    Event(EventEnvelope),
    Flush(mpsc::Sender<Result<(), IndexerError>>),
    Shutdown,
}

#[derive(Debug, Default)]
struct ShardState {
    report: PipelineReport,
    pending: usize,
    rejected: VecDeque<RejectedEvent>,
    last_error: Option<String>,
}

struct ShardHandle {
    sender: mpsc::Sender<ShardCommand>,
    worker: Option<JoinHandle<Vec<EventEnvelope>>>,
    state: Arc<Mutex<ShardState>>,
}

pub struct PartitionedIndexer<S> {
    store: Arc<S>,
    stats: SharedStatsTracker,
    shards: Vec<ShardHandle>,
}

impl<S> PartitionedIndexer<S>
where
    S: EntityStore + Send + Sync + 'static,
{
    pub fn start(store: Arc<S>, config: &IndexerConfig) -> Result<Self, IndexerError> {
        config
            .validate()
            .map_err(|err| IndexerError::WorkerUnavailable {
                reason: err.to_string(),
            })?;
        let stats = shared_stats_tracker();
        let mut indexer = Self {
            store: Arc::clone(&store),
            stats: Arc::clone(&stats),
            shards: Vec::with_capacity(config.shards),
        };
        for index in 0..config.shards {
            let dispatcher = EventDispatcher::with_stats_tracker(
                Arc::clone(&store),
                Arc::clone(&stats),
                config.max_rejected_events,
            );
            let pipeline =
                IndexerPipeline::new(dispatcher, config.retry).with_retention(JournalRetention {
                    finality_blocks: config.finality_blocks,
                    shard: index,
                    shards: config.shards,
                });
            let state = Arc::new(Mutex::new(ShardState::default()));
            let worker_state = Arc::clone(&state);
            let max_rejected = config.max_rejected_events;
            let (sender, receiver) = mpsc::channel::<ShardCommand>();
            let worker = thread::Builder::new()
                .name(format!("mines-shard-{index}"))
                .spawn(move || run_shard(pipeline, receiver, worker_state, max_rejected))
                .map_err(|err| IndexerError::WorkerUnavailable {
                    reason: format!("spawn shard {index} failed: {err}"),
                })?;
            indexer.shards.push(ShardHandle {
                sender,
                worker: Some(worker),
                state,
            });
        }
        tracing::info!(shards = config.shards, "partitioned indexer started");
        Ok(indexer)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn submit(&self, envelope: EventEnvelope) -> Result<(), IndexerError> {
        let index = shard_index(&envelope.event.player(), self.shards.len());
        let shard = self
            .shards
            .get(index)
            .ok_or_else(|| IndexerError::WorkerUnavailable {
                reason: format!("no shard {index}"),
            })?;
        shard
            .sender
            .send(ShardCommand::Event(envelope))
            .map_err(|_| IndexerError::WorkerUnavailable {
                reason: format!("shard {index} stopped"),
            })
    }

    /// Blocks until every shard has worked through what was submitted before
    /// the call. Returns the first shard error if any shard is still stuck.
    pub fn flush(&self) -> Result<(), IndexerError> {
        let mut acks = Vec::with_capacity(self.shards.len());
        for (index, shard) in self.shards.iter().enumerate() {
            let (ack_tx, ack_rx) = mpsc::channel();
            shard
                .sender
                .send(ShardCommand::Flush(ack_tx))
                .map_err(|_| IndexerError::WorkerUnavailable {
                    reason: format!("shard {index} stopped"),
                })?;
            acks.push((index, ack_rx));
        }
        let mut first_error = None;
        for (index, ack_rx) in acks {
            let result = ack_rx.recv().map_err(|_| IndexerError::WorkerUnavailable {
                reason: format!("shard {index} exited during flush"),
            })?;
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> Result<PlatformStats, IndexerError> {
        let mut tracker = lock_tracker(&self.stats)?;
        Ok(tracker.ensure_loaded(self.store.as_ref())?.clone())
    }

    pub fn report(&self) -> PipelineReport {
        let mut total = PipelineReport::default();
        for shard in &self.shards {
            total.merge(&lock_state(&shard.state).report);
        }
        total
    }

    pub fn pending_len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| lock_state(&shard.state).pending)
            .sum()
    }

    pub fn rejected_events(&self) -> Vec<RejectedEvent> {
        self.shards
            .iter()
            .flat_map(|shard| {
                lock_state(&shard.state)
                    .rejected
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shards
            .iter()
            .find_map(|shard| lock_state(&shard.state).last_error.clone())
    }

    /// Stops every shard and returns the events they could not apply.
    pub fn shutdown(mut self) -> Vec<EventEnvelope> {
        self.stop_workers()
    }

    fn stop_workers(&mut self) -> Vec<EventEnvelope> {
        for shard in &self.shards {
            let _ = shard.sender.send(ShardCommand::Shutdown);
        }
        let mut unapplied = Vec::new();
        for (index, shard) in self.shards.iter_mut().enumerate() {
            if let Some(worker) = shard.worker.take() {
                match worker.join() {
                    Ok(remaining) => unapplied.extend(remaining),
                    Err(_) => tracing::error!(shard = index, "shard worker panicked"),
                }
            }
        }
        if !unapplied.is_empty() {
            tracing::warn!(count = unapplied.len(), "shutdown with unapplied events");
        }
        unapplied
    }
}

impl<S> Drop for PartitionedIndexer<S> {
    fn drop(&mut self) {
        for shard in &self.shards {
            let _ = shard.sender.send(ShardCommand::Shutdown);
        }
        for shard in &mut self.shards {
            if let Some(worker) = shard.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

fn run_shard<S: EntityStore>(
    mut pipeline: IndexerPipeline<S>,
    commands: mpsc::Receiver<ShardCommand>,
    state: Arc<Mutex<ShardState>>,
    max_rejected: usize,
) -> Vec<EventEnvelope> {
    for command in commands.iter() {
        match command {
            ShardCommand::Event(envelope) => {
                pipeline.submit(envelope);
                let _ = drive(&mut pipeline, &state, max_rejected);
            }
            ShardCommand::Flush(ack) => {
                let _ = ack.send(drive(&mut pipeline, &state, max_rejected));
            }
            ShardCommand::Shutdown => break,
        }
    }
    let _ = drive(&mut pipeline, &state, max_rejected);
    pipeline.drain_pending()
}

fn drive<S: EntityStore>(
    pipeline: &mut IndexerPipeline<S>,
    state: &Arc<Mutex<ShardState>>,
    max_rejected: usize,
) -> Result<(), IndexerError> {
    let result = if pipeline.pending_len() == 0 {
        Ok(PipelineReport::default())
    } else {
        pipeline.run_until_idle()
    };
    let rejected = pipeline.dispatcher_mut().take_rejected_events();

    let mut current = lock_state(state);
    current.report = pipeline.totals();
    current.pending = pipeline.pending_len();
    for event in rejected {
        if current.rejected.len() >= max_rejected {
            current.rejected.pop_front();
        }
        current.rejected.push_back(event);
    }
    match result {
        Ok(_) => {
            current.last_error = None;
            Ok(())
        }
        Err(err) => {
            current.last_error = Some(err.to_string());
            Err(err)
        }
    }
}

fn lock_state(state: &Arc<Mutex<ShardState>>) -> MutexGuard<'_, ShardState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
