//! Age-based deletion of stale rows.
//!
//! Each collection has its own retention window measured back from the
//! clock. Rows whose retention field is strictly older than the cutoff are
//! deleted in one `delete_many`; rows at or after the cutoff are kept.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::Instrument;

use nodegraph_store::{Collection, Datastore, Filter};
use nodegraph_types::Clock;

use crate::guard::CycleGuard;
use crate::metrics::ServiceMetrics;
use crate::periodic::{PeriodicTask, STOP_TIMEOUT};
use crate::tracing_spans;
use crate::ServiceError;

/// Retention windows in whole days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub node_days: u64,
    pub peer_days: u64,
    pub history_days: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            node_days: 30,
            peer_days: 7,
            history_days: 90,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanupSettings {
    pub interval: Duration,
    pub run_on_start: bool,
    pub policy: RetentionPolicy,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600),
            run_on_start: false,
            policy: RetentionPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub nodes_deleted: u64,
    pub peers_deleted: u64,
    pub history_deleted: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.nodes_deleted + self.peers_deleted + self.history_deleted
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupOutcome {
    Completed(CleanupReport),
    Skipped,
}

pub struct RetentionCleaner {
    datastore: Arc<dyn Datastore>,
    clock: Arc<dyn Clock>,
    settings: CleanupSettings,
    guard: CycleGuard,
    periodic: Mutex<Option<PeriodicTask>>,
    metrics: Arc<ServiceMetrics>,
}

impl RetentionCleaner {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        clock: Arc<dyn Clock>,
        settings: CleanupSettings,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            datastore,
            clock,
            settings,
            guard: CycleGuard::new(),
            periodic: Mutex::new(None),
            metrics,
        }
    }

    pub fn settings(&self) -> &CleanupSettings {
        &self.settings
    }

    pub async fn cleanup_nodes(&self) -> Result<u64, ServiceError> {
        self.cleanup(Collection::Nodes, self.settings.policy.node_days)
            .await
    }

    pub async fn cleanup_peers_of_peers(&self) -> Result<u64, ServiceError> {
        self.cleanup(Collection::PeersOfPeers, self.settings.policy.peer_days)
            .await
    }

    pub async fn cleanup_history(&self) -> Result<u64, ServiceError> {
        self.cleanup(Collection::History, self.settings.policy.history_days)
            .await
    }

    /// Clean nodes, then peers-of-peers, then history. Stops at the first
    /// failure; deletions already committed stay committed.
    pub async fn perform_cleanup(&self) -> Result<CleanupOutcome, ServiceError> {
        let Some(_permit) = self.guard.try_enter() else {
            self.metrics.cleanup_skipped.inc();
            tracing::info!("cleanup already in progress, skipping");
            return Ok(CleanupOutcome::Skipped);
        };

        let result = async {
            Ok::<_, ServiceError>(CleanupReport {
                nodes_deleted: self.cleanup_nodes().await?,
                peers_deleted: self.cleanup_peers_of_peers().await?,
                history_deleted: self.cleanup_history().await?,
            })
        }
        .instrument(tracing_spans::cleanup_cycle_span())
        .await;

        match &result {
            Ok(report) => {
                self.metrics.cleanup_cycles.inc();
                tracing::info!(
                    nodes = report.nodes_deleted,
                    peers = report.peers_deleted,
                    history = report.history_deleted,
                    "cleanup cycle complete"
                );
            }
            Err(_) => self.metrics.cleanup_failures.inc(),
        }
        result.map(CleanupOutcome::Completed)
    }

    /// Begin cleaning every `interval`. A no-op if already started.
    pub async fn start_periodic_cleanup(self: &Arc<Self>) -> Result<(), ServiceError> {
        let mut periodic = self.periodic.lock().await;
        if periodic.is_some() {
            tracing::info!("periodic cleanup already running");
            return Ok(());
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let task = PeriodicTask::spawn(
            "cleanup",
            self.settings.interval,
            self.settings.run_on_start,
            move || {
                let weak = weak.clone();
                async move {
                    let Some(this) = weak.upgrade() else {
                        return;
                    };
                    if let Err(e) = this.perform_cleanup().await {
                        tracing::error!(error = %e, "cleanup cycle failed");
                    }
                }
            },
        )?;
        *periodic = Some(task);
        Ok(())
    }

    /// Cancel the schedule. A no-op if not started.
    pub async fn stop_periodic_cleanup(&self) -> Result<(), ServiceError> {
        let task = self.periodic.lock().await.take();
        match task {
            Some(task) => task.stop(STOP_TIMEOUT).await,
            None => {
                tracing::info!("periodic cleanup not running");
                Ok(())
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.periodic
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    async fn cleanup(&self, collection: Collection, days: u64) -> Result<u64, ServiceError> {
        let field = collection.retention_field().ok_or_else(|| {
            ServiceError::Config(format!("{collection} has no retention field"))
        })?;
        let cutoff = self.clock.now().days_before(days);

        let deleted = self
            .datastore
            .delete_many(collection, &Filter::lt(field, cutoff.as_secs()))
            .instrument(tracing_spans::cleanup_collection_span(
                collection.name(),
                cutoff.as_secs(),
            ))
            .await?
            .deleted_count;

        self.metrics
            .rows_deleted
            .with_label_values(&[collection.name()])
            .inc_by(deleted);
        tracing::info!(%collection, deleted, cutoff = cutoff.as_secs(), "retention cleanup");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodegraph_nullables::{DatastoreOp, NullClock, NullDatastore};
    use nodegraph_store::to_document;
    use nodegraph_types::{HistoryRecord, NodeRecord, PeerOfPeerRecord, Pubkey, Timestamp};

    const NOW: u64 = 1_700_000_000;
    const DAY: u64 = 86_400;

    fn cleaner(store: &Arc<NullDatastore>, settings: CleanupSettings) -> Arc<RetentionCleaner> {
        Arc::new(RetentionCleaner::new(
            store.clone(),
            Arc::new(NullClock::new(NOW)),
            settings,
            Arc::new(ServiceMetrics::new()),
        ))
    }

    fn seed_node(store: &NullDatastore, pubkey: &str, ts: u64) {
        let mut node = NodeRecord::new(Pubkey::parse(pubkey).unwrap());
        node.timestamp = Timestamp::new(ts);
        store.seed(Collection::Nodes, to_document(&node).unwrap());
    }

    fn seed_peer(store: &NullDatastore, peer: &str, ts: u64) {
        let record = PeerOfPeerRecord {
            node_pubkey: Pubkey::parse("02aa").unwrap(),
            peer_pubkey: Pubkey::parse(peer).unwrap(),
            timestamp: Timestamp::new(ts),
            ..Default::default()
        };
        store.seed(Collection::PeersOfPeers, to_document(&record).unwrap());
    }

    fn seed_history(store: &NullDatastore, ts: u64) {
        let record = HistoryRecord {
            date: Timestamp::new(ts),
            price: 1.0,
            ..Default::default()
        };
        store.seed(Collection::History, to_document(&record).unwrap());
    }

    #[tokio::test]
    async fn node_cutoff_is_exclusive() {
        let store = Arc::new(NullDatastore::new());
        let cutoff = NOW - 30 * DAY;
        seed_node(&store, "kept", cutoff + 1);
        seed_node(&store, "edge", cutoff);
        seed_node(&store, "gone", cutoff - 1);

        let deleted = cleaner(&store, CleanupSettings::default())
            .cleanup_nodes()
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        let left: Vec<_> = store
            .documents(Collection::Nodes)
            .iter()
            .map(|d| d["pubkey"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(left, vec!["edge".to_string(), "kept".to_string()]);
    }

    #[tokio::test]
    async fn each_collection_uses_its_own_window() {
        let store = Arc::new(NullDatastore::new());
        seed_node(&store, "n", NOW - 10 * DAY);
        seed_peer(&store, "p-old", NOW - 8 * DAY);
        seed_peer(&store, "p-new", NOW - 6 * DAY);
        seed_history(&store, NOW - 91 * DAY);
        seed_history(&store, NOW - 89 * DAY);

        let outcome = cleaner(&store, CleanupSettings::default())
            .perform_cleanup()
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CleanupOutcome::Completed(CleanupReport {
                nodes_deleted: 0,
                peers_deleted: 1,
                history_deleted: 1,
            })
        );
        assert_eq!(store.len(Collection::Nodes), 1);
        assert_eq!(store.len(Collection::PeersOfPeers), 1);
        assert_eq!(store.len(Collection::History), 1);
    }

    #[tokio::test]
    async fn failure_stops_the_cycle_but_keeps_earlier_deletions() {
        let store = Arc::new(NullDatastore::new());
        seed_node(&store, "old", NOW - 40 * DAY);
        seed_history(&store, NOW - 100 * DAY);
        store.fail_on(DatastoreOp::DeleteMany, Some(Collection::PeersOfPeers));

        let cleaner = cleaner(&store, CleanupSettings::default());
        let err = cleaner.perform_cleanup().await.unwrap_err();

        assert!(matches!(err, ServiceError::Store(_)));
        assert!(store.is_empty(Collection::Nodes));
        // History never ran.
        assert_eq!(store.len(Collection::History), 1);
        assert_eq!(store.calls(DatastoreOp::DeleteMany), 2);

        store.clear_failures();
        assert!(matches!(
            cleaner.perform_cleanup().await.unwrap(),
            CleanupOutcome::Completed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_cleanup_is_skipped() {
        let store = Arc::new(NullDatastore::new());
        store.set_latency(Duration::from_secs(5));
        let cleaner = cleaner(&store, CleanupSettings::default());

        let first = {
            let cleaner = Arc::clone(&cleaner);
            tokio::spawn(async move { cleaner.perform_cleanup().await })
        };
        while store.calls(DatastoreOp::DeleteMany) == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            cleaner.perform_cleanup().await.unwrap(),
            CleanupOutcome::Skipped
        );
        assert!(matches!(
            first.await.unwrap().unwrap(),
            CleanupOutcome::Completed(_)
        ));
        assert_eq!(store.calls(DatastoreOp::DeleteMany), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_cleanup_waits_one_interval_by_default() {
        let store = Arc::new(NullDatastore::new());
        let cleaner = cleaner(
            &store,
            CleanupSettings {
                interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        cleaner.start_periodic_cleanup().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.calls(DatastoreOp::DeleteMany), 0);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(store.calls(DatastoreOp::DeleteMany), 3);

        cleaner.stop_periodic_cleanup().await.unwrap();
        assert!(!cleaner.is_running().await);
    }
}
