//! Sync cycle guarantees: non-reentrancy, retry and duplicate tolerance.

use std::sync::Arc;
use std::time::Duration;

use nodegraph_nullables::{DatastoreOp, NullClock, NullDatastore, NullNodeSource};
use nodegraph_services::{
    RetryPolicy, ServiceError, ServiceMetrics, SyncOrchestrator, SyncOutcome, SyncSettings,
};
use nodegraph_store::Collection;
use nodegraph_upstream::{UpstreamNode, UpstreamPeer};
use tokio::time::Instant;

const NOW: u64 = 1_700_000_000;

struct Harness {
    store: Arc<NullDatastore>,
    source: Arc<NullNodeSource>,
    metrics: Arc<ServiceMetrics>,
    sync: Arc<SyncOrchestrator>,
}

fn harness(settings: SyncSettings) -> Harness {
    let store = Arc::new(NullDatastore::new());
    let source = Arc::new(NullNodeSource::with_nodes(vec![
        node("02aa"),
        node("02bb"),
    ]));
    source.set_peers("02aa", vec![peer("03x"), peer("03y")]);
    source.set_peers("02bb", vec![peer("03x")]);
    let metrics = Arc::new(ServiceMetrics::new());
    let sync = Arc::new(SyncOrchestrator::new(
        store.clone(),
        source.clone(),
        Arc::new(NullClock::new(NOW)),
        settings,
        metrics.clone(),
    ));
    Harness {
        store,
        source,
        metrics,
        sync,
    }
}

fn node(pubkey: &str) -> UpstreamNode {
    UpstreamNode {
        pubkey: pubkey.into(),
        ..Default::default()
    }
}

fn peer(pubkey: &str) -> UpstreamPeer {
    UpstreamPeer {
        peer_pubkey: pubkey.into(),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn overlapping_full_sync_is_a_no_op() {
    let h = harness(SyncSettings::default());
    h.source.set_latency(Duration::from_secs(10));

    let first = {
        let sync = Arc::clone(&h.sync);
        tokio::spawn(async move { sync.perform_full_sync().await })
    };
    while !h.sync.is_syncing() {
        tokio::task::yield_now().await;
    }

    let second = h.sync.perform_full_sync().await.unwrap();
    assert_eq!(second, SyncOutcome::Skipped);
    assert_eq!(h.source.node_fetches(), 1);

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, SyncOutcome::Completed(_)));
    // One fetch per phase of the first cycle only.
    assert_eq!(h.source.node_fetches(), 2);
    assert_eq!(h.metrics.sync_skipped.get(), 1);
    assert_eq!(h.metrics.sync_cycles.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn two_failures_then_success_takes_three_attempts_one_second_apart() {
    let h = harness(SyncSettings::default());
    h.source.fail_next_node_fetches(2);

    let started = Instant::now();
    let outcome = h.sync.perform_full_sync().await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Completed(r) if r.nodes_upserted == 2));
    assert_eq!(h.source.node_fetches(), 3 + 1);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn three_failures_surface_the_last_error() {
    let h = harness(SyncSettings::default());
    h.source.fail_next_node_fetches(3);

    let err = h.sync.perform_full_sync().await.unwrap_err();

    assert!(matches!(err, ServiceError::Upstream(_)));
    assert!(err.is_transient());
    assert_eq!(h.source.node_fetches(), 3);
    assert_eq!(h.source.peer_fetches(), 0);
    assert!(h.store.is_empty(Collection::Nodes));
    assert_eq!(h.metrics.sync_failures.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn peer_phase_retry_does_not_duplicate_earlier_nodes() {
    let h = harness(SyncSettings::default());
    h.source.set_latency(Duration::from_secs(1));

    let run = {
        let sync = Arc::clone(&h.sync);
        tokio::spawn(async move { sync.perform_full_sync().await })
    };
    // 02aa's peers are stored; fail 02bb's fetch while it is in flight.
    while h.source.peer_fetches() < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    h.source.fail_next_peer_fetches(1);

    let SyncOutcome::Completed(report) = run.await.unwrap().unwrap() else {
        panic!("cycle should complete");
    };
    // The retry refetches 02aa under the same cycle timestamp; those rows
    // are skipped as duplicates.
    assert_eq!(report.peers_inserted, 1);
    assert_eq!(h.store.len(Collection::PeersOfPeers), 3);
    assert_eq!(
        h.source.peer_fetch_log(),
        vec!["02aa", "02bb", "02aa", "02bb"]
    );
}

#[tokio::test]
async fn duplicate_peer_rows_are_neither_errors_nor_visible() {
    let h = harness(SyncSettings::default());

    h.sync.perform_full_sync().await.unwrap();
    let again = h.sync.perform_full_sync().await.unwrap();

    // Same clock second, so every row of the second cycle is a duplicate.
    assert!(matches!(again, SyncOutcome::Completed(r) if r.peers_inserted == 0));
    assert_eq!(h.store.len(Collection::PeersOfPeers), 3);
    assert_eq!(h.store.len(Collection::Nodes), 2);
    assert_eq!(h.store.calls(DatastoreOp::Upsert), 4);
}

#[tokio::test]
async fn no_retry_policy_fails_fast() {
    let h = harness(SyncSettings {
        retry: RetryPolicy::fixed(1, Duration::from_secs(1)),
        ..Default::default()
    });
    h.source.fail_next_node_fetches(1);

    assert!(h.sync.perform_full_sync().await.is_err());
    assert_eq!(h.source.node_fetches(), 1);
}
