//! Service manager start/stop sequencing.

use std::sync::Arc;
use std::time::Duration;

use nodegraph_nullables::{DatastoreOp, NullClock, NullDatastore, NullNodeSource};
use nodegraph_services::{ServiceManager, ServicesConfig};
use nodegraph_store::{to_document, Collection};
use nodegraph_types::{NodeRecord, Pubkey, Timestamp};
use nodegraph_upstream::UpstreamNode;

const NOW: u64 = 1_700_000_000;

fn manager(
    store: &Arc<NullDatastore>,
    source: &Arc<NullNodeSource>,
    config: ServicesConfig,
) -> ServiceManager {
    ServiceManager::with_clock(
        store.clone(),
        source.clone(),
        Arc::new(NullClock::new(NOW)),
        &config,
    )
    .expect("valid config")
}

#[tokio::test(start_paused = true)]
async fn initialize_starts_sync_immediately_and_cleanup_later() {
    let store = Arc::new(NullDatastore::new());
    let source = Arc::new(NullNodeSource::with_nodes(vec![UpstreamNode {
        pubkey: "02aa".into(),
        ..Default::default()
    }]));
    let manager = manager(&store, &source, ServicesConfig::default());

    manager.initialize_services().await.unwrap();
    assert!(manager.is_running().await);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.len(Collection::Nodes), 1);
    assert_eq!(store.calls(DatastoreOp::DeleteMany), 0);

    manager.shutdown_services().await.unwrap();
    assert!(!manager.is_running().await);
    assert!(!manager.sync().is_running().await);
    assert!(!manager.retention().is_running().await);
}

#[tokio::test(start_paused = true)]
async fn initialize_twice_does_not_start_a_second_loop() {
    let store = Arc::new(NullDatastore::new());
    let source = Arc::new(NullNodeSource::new());
    let manager = manager(&store, &source, ServicesConfig::default());

    manager.initialize_services().await.unwrap();
    manager.initialize_services().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // One immediate cycle: one node-list fetch per phase.
    assert_eq!(source.node_fetches(), 2);
    manager.shutdown_services().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_clears_the_cache() {
    let store = Arc::new(NullDatastore::new());
    let source = Arc::new(NullNodeSource::new());
    let mut node = NodeRecord::new(Pubkey::parse("02aa").unwrap());
    node.timestamp = Timestamp::new(NOW);
    store.seed(Collection::Nodes, to_document(&node).unwrap());

    let manager = manager(
        &store,
        &source,
        ServicesConfig {
            sync_on_start: false,
            ..Default::default()
        },
    );
    manager.initialize_services().await.unwrap();
    manager.cache().get_node("02aa").await.unwrap();
    assert_eq!(manager.cache().stats().entries, 1);

    manager.shutdown_services().await.unwrap();
    assert_eq!(manager.cache().stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_without_initialize_is_harmless() {
    let store = Arc::new(NullDatastore::new());
    let source = Arc::new(NullNodeSource::new());
    let manager = manager(&store, &source, ServicesConfig::default());
    manager.shutdown_services().await.unwrap();
    assert!(!manager.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn cleanup_on_start_runs_retention_immediately() {
    let store = Arc::new(NullDatastore::new());
    let source = Arc::new(NullNodeSource::new());
    let manager = manager(
        &store,
        &source,
        ServicesConfig {
            sync_on_start: false,
            cleanup_on_start: true,
            ..Default::default()
        },
    );

    manager.initialize_services().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.calls(DatastoreOp::DeleteMany), 3);
    assert_eq!(source.node_fetches(), 0);
    assert_eq!(manager.metrics().cleanup_cycles.get(), 1);

    manager.shutdown_services().await.unwrap();
}
