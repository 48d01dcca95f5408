use crate::config::IndexerConfig;

use super::*;

fn config(shards: usize, max_attempts: u32) -> IndexerConfig {
    IndexerConfig {
        shards,
        retry: RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 2,
        },
        ..IndexerConfig::default()
    }
}

fn full_game(first_block: u64, player: Address) -> Vec<EventEnvelope> {
    vec![
        created(first_block, player, 1, wad(2), 25),
        committed(first_block + 1, player, 1, 12),
        resolved(first_block + 2, player, 1, false, wad(2)),
        cashed_out(first_block + 3, player, 1, wad(4)),
    ]
}

#[test]
fn shards_apply_every_players_events_in_order() {
    let store = Arc::new(InMemoryEntityStore::new());
    let indexer = PartitionedIndexer::start(Arc::clone(&store), &config(4, 3)).expect("start");
    assert_eq!(indexer.shard_count(), 4);

    let players: Vec<Address> = (1_u8..=8).map(player).collect();
    for (index, player) in players.iter().enumerate() {
        for envelope in full_game(index as u64 * 10 + 1, *player) {
            indexer.submit(envelope).expect("submit");
        }
    }
    indexer.flush().expect("flush");

    let stats = indexer.stats().unwrap();
    assert_eq!(stats.total_games, 8);
    assert_eq!(stats.total_users, 8);
    assert_eq!(stats.total_stakers, 0);
    assert_eq!(stats.total_staked, U256::ZERO);
    assert_eq!(indexer.report().applied, 32);
    assert_eq!(indexer.pending_len(), 0);
    assert!(indexer.rejected_events().is_empty());
    assert_eq!(indexer.last_error(), None);

    for player in &players {
        let game = store.load_game(&key(*player, 1)).unwrap().unwrap();
        assert!(game.cashed_out());
    }
    assert!(indexer.shutdown().is_empty());
}

#[test]
fn rejections_surface_through_the_pool() {
    let store = Arc::new(InMemoryEntityStore::new());
    let indexer = PartitionedIndexer::start(store, &config(2, 1)).unwrap();
    let alice = player(0xa1);
    indexer.submit(committed(1, alice, 5, 0)).unwrap();
    indexer.submit(created(2, alice, 5, wad(1), 9)).unwrap();
    indexer.flush().unwrap();

    let rejected = indexer.rejected_events();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].event_id(), committed(1, alice, 5, 0).event_id());
    assert_eq!(indexer.report().applied, 1);
    assert_eq!(indexer.stats().unwrap().total_games, 1);
}

#[test]
fn shutdown_hands_back_events_the_store_never_took() {
    let store = Arc::new(FlakyStore::failing(u32::MAX));
    let indexer = PartitionedIndexer::start(Arc::clone(&store), &config(2, 1)).unwrap();
    let alice = player(0xa1);
    let events = [created(1, alice, 1, wad(2), 25), committed(2, alice, 1, 4)];
    for envelope in &events {
        indexer.submit(envelope.clone()).unwrap();
    }

    let err = indexer.flush().expect_err("store is down");
    assert!(err.is_transient());
    assert!(indexer.last_error().is_some());
    assert_eq!(indexer.pending_len(), 2);

    let unapplied = indexer.shutdown();
    assert_eq!(unapplied, events.to_vec());
    assert!(store.inner.is_empty().unwrap());
}

#[test]
fn start_rejects_invalid_config() {
    let store = Arc::new(InMemoryEntityStore::new());
    let err = PartitionedIndexer::start(store, &config(0, 1))
        .err()
        .expect("zero shards");
    assert!(matches!(err, IndexerError::WorkerUnavailable { .. }));
}
