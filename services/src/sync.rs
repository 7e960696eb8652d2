//! Periodic pull of upstream node data into the datastore.
//!
//! A cycle upserts every upstream node, then walks the node list again and
//! appends each node's peers-of-peers. Both phases run under the retry
//! policy; only transient errors are retried. A cycle requested while
//! another is in flight is skipped, never queued.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use nodegraph_store::{to_document, Collection, Datastore, Document};
use nodegraph_types::{Clock, NodeRecord, PeerOfPeerRecord, Pubkey, Timestamp};
use nodegraph_upstream::{NodeSource, UpstreamNode, UpstreamPeer};

use crate::guard::CycleGuard;
use crate::metrics::ServiceMetrics;
use crate::periodic::{PeriodicTask, STOP_TIMEOUT};
use crate::retry::RetryPolicy;
use crate::tracing_spans;
use crate::ServiceError;

/// Node fields the upstream summary owns. Only these (plus `timestamp`) are
/// overwritten on an existing node; enrichment fields are left alone.
const SUMMARY_FIELDS: &[&str] = &[
    "alias",
    "platform",
    "version",
    "total_capacity",
    "active_channel_count",
    "total_peers",
    "uptime",
    "timestamp",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    pub interval: Duration,
    /// Run the first cycle as soon as periodic sync starts.
    pub run_on_start: bool,
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            run_on_start: true,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub nodes_upserted: usize,
    pub peers_inserted: u64,
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another cycle was already running.
    Skipped,
}

pub struct SyncOrchestrator {
    datastore: Arc<dyn Datastore>,
    source: Arc<dyn NodeSource>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    guard: CycleGuard,
    periodic: Mutex<Option<PeriodicTask>>,
    metrics: Arc<ServiceMetrics>,
}

impl SyncOrchestrator {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        source: Arc<dyn NodeSource>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            datastore,
            source,
            clock,
            settings,
            guard: CycleGuard::new(),
            periodic: Mutex::new(None),
            metrics,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Upsert one record per upstream node, returning how many were written.
    pub async fn sync_nodes(&self) -> Result<usize, ServiceError> {
        self.sync_nodes_at(self.clock.now()).await
    }

    /// Append the peers-of-peers of every upstream node, returning how many
    /// new rows were inserted.
    pub async fn sync_peers_of_peers(&self) -> Result<u64, ServiceError> {
        self.sync_peers_of_peers_at(self.clock.now()).await
    }

    /// Run one guarded cycle: nodes, then peers-of-peers.
    ///
    /// Returns [`SyncOutcome::Skipped`] without touching the upstream if a
    /// cycle is already in flight. If the node phase exhausts its retries the
    /// peer phase does not run.
    pub async fn perform_full_sync(&self) -> Result<SyncOutcome, ServiceError> {
        let Some(_permit) = self.guard.try_enter() else {
            self.metrics.sync_skipped.inc();
            tracing::info!("sync already in progress, skipping");
            return Ok(SyncOutcome::Skipped);
        };

        let cycle_ts = self.clock.now();
        let result = self
            .run_cycle(cycle_ts)
            .instrument(tracing_spans::sync_cycle_span(cycle_ts.as_secs()))
            .await;

        match &result {
            Ok(report) => {
                self.metrics.sync_cycles.inc();
                self.metrics
                    .sync_duration_ms
                    .observe(report.elapsed.as_secs_f64() * 1000.0);
                tracing::info!(
                    nodes = report.nodes_upserted,
                    peers = report.peers_inserted,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "sync cycle complete"
                );
            }
            Err(_) => self.metrics.sync_failures.inc(),
        }
        result.map(SyncOutcome::Completed)
    }

    /// Start a cycle in the background right away, outside the schedule.
    pub fn sync_now(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<SyncOutcome, ServiceError>>, ServiceError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ServiceError::NoRuntime("sync"))?;
        let this = Arc::clone(self);
        Ok(runtime.spawn(async move { this.perform_full_sync().await }))
    }

    /// Begin syncing every `interval`. A no-op if already started.
    pub async fn start_periodic_sync(self: &Arc<Self>) -> Result<(), ServiceError> {
        let mut periodic = self.periodic.lock().await;
        if periodic.is_some() {
            tracing::info!("periodic sync already running");
            return Ok(());
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let task = PeriodicTask::spawn(
            "sync",
            self.settings.interval,
            self.settings.run_on_start,
            move || {
                let weak = weak.clone();
                async move {
                    let Some(this) = weak.upgrade() else {
                        return;
                    };
                    if let Err(e) = this.perform_full_sync().await {
                        tracing::error!(error = %e, "sync cycle failed");
                    }
                }
            },
        )?;
        *periodic = Some(task);
        Ok(())
    }

    /// Cancel the schedule. A no-op if not started.
    pub async fn stop_periodic_sync(&self) -> Result<(), ServiceError> {
        let task = self.periodic.lock().await.take();
        match task {
            Some(task) => task.stop(STOP_TIMEOUT).await,
            None => {
                tracing::info!("periodic sync not running");
                Ok(())
            }
        }
    }

    /// Whether the periodic schedule is live.
    pub async fn is_running(&self) -> bool {
        self.periodic
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Whether a cycle is executing right now.
    pub fn is_syncing(&self) -> bool {
        self.guard.is_running()
    }

    async fn run_cycle(&self, cycle_ts: Timestamp) -> Result<SyncReport, ServiceError> {
        let started = Instant::now();
        let retry = &self.settings.retry;

        let nodes_upserted = retry
            .run_if(
                "sync_nodes",
                || self.sync_nodes_at(cycle_ts),
                ServiceError::is_transient,
            )
            .instrument(tracing_spans::sync_nodes_span())
            .await?;

        let peers_inserted = retry
            .run_if(
                "sync_peers_of_peers",
                || self.sync_peers_of_peers_at(cycle_ts),
                ServiceError::is_transient,
            )
            .instrument(tracing_spans::sync_peers_span())
            .await?;

        Ok(SyncReport {
            nodes_upserted,
            peers_inserted,
            elapsed: started.elapsed(),
        })
    }

    async fn sync_nodes_at(&self, cycle_ts: Timestamp) -> Result<usize, ServiceError> {
        let nodes = self.source.get_all_nodes().await?;
        let offered = nodes.len();
        let mut upserted = 0usize;

        for node in nodes {
            let Some(record) = node_record(node, cycle_ts) else {
                continue;
            };
            let create = to_document(&record)?;
            let update = summary_update(&create);
            let key = Collection::Nodes.key_of(&create)?;
            self.datastore
                .upsert(Collection::Nodes, &key, create, update)
                .await?;
            upserted += 1;
        }

        self.metrics.nodes_upserted.inc_by(upserted as u64);
        tracing::info!(offered, upserted, "nodes synced");
        Ok(upserted)
    }

    async fn sync_peers_of_peers_at(&self, cycle_ts: Timestamp) -> Result<u64, ServiceError> {
        let nodes = self.source.get_all_nodes().await?;
        let mut inserted = 0u64;

        for node in &nodes {
            // Invalid keys were already reported by the node phase.
            let Ok(node_pubkey) = Pubkey::parse(node.pubkey.as_str()) else {
                continue;
            };
            let response = self.source.get_peers_of_peers(node_pubkey.as_str()).await?;

            let mut batch: Vec<Document> = Vec::with_capacity(response.peers_of_peers.len());
            for peer in response.peers_of_peers {
                if let Some(record) = peer_record(&node_pubkey, peer, cycle_ts) {
                    batch.push(to_document(&record)?);
                }
            }
            if batch.is_empty() {
                continue;
            }

            let offered = batch.len();
            let written = self
                .datastore
                .create_many(Collection::PeersOfPeers, batch, true)
                .await?;
            tracing::debug!(node = %node_pubkey, offered, written, "peers-of-peers stored");
            inserted += written;
        }

        self.metrics.peers_inserted.inc_by(inserted);
        tracing::info!(nodes = nodes.len(), inserted, "peers-of-peers synced");
        Ok(inserted)
    }
}

fn node_record(node: UpstreamNode, cycle_ts: Timestamp) -> Option<NodeRecord> {
    let pubkey = match Pubkey::parse(node.pubkey) {
        Ok(pubkey) => pubkey,
        Err(e) => {
            tracing::warn!(error = %e, "skipping upstream node");
            return None;
        }
    };
    Some(NodeRecord {
        alias: node.alias,
        platform: node.platform,
        version: node.version,
        total_capacity: node.total_capacity,
        active_channel_count: node.active_channel_count,
        total_peers: node.total_peers,
        uptime: node.uptime,
        timestamp: cycle_ts,
        ..NodeRecord::new(pubkey)
    })
}

fn peer_record(
    node_pubkey: &Pubkey,
    peer: UpstreamPeer,
    cycle_ts: Timestamp,
) -> Option<PeerOfPeerRecord> {
    let peer_pubkey = match Pubkey::parse(peer.peer_pubkey) {
        Ok(pubkey) => pubkey,
        Err(e) => {
            tracing::warn!(node = %node_pubkey, error = %e, "skipping upstream peer");
            return None;
        }
    };
    Some(PeerOfPeerRecord {
        node_pubkey: node_pubkey.clone(),
        peer_pubkey,
        alias: peer.alias,
        total_capacity: peer.total_capacity,
        active_channels: peer.active_channels,
        total_peers: peer.total_peers,
        timestamp: cycle_ts,
    })
}

fn summary_update(create: &Document) -> Document {
    create
        .iter()
        .filter(|(field, _)| SUMMARY_FIELDS.contains(&field.as_str()))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}
