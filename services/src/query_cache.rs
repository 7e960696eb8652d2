//! Read-through TTL cache in front of the hot node reads.
//!
//! Entries are keyed by operation name plus the canonical JSON of the call
//! parameters and live for a fixed TTL. There is no size bound and no
//! eviction other than expiry, [`QueryCache::purge_expired`] and
//! [`QueryCache::clear_cache`]. Two concurrent misses on the same key may
//! both read the datastore; the last write wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::Instrument;

use nodegraph_store::{from_document, Collection, Datastore, Filter, FindOptions, Sort};
use nodegraph_types::{Clock, NodeRecord, PeerOfPeerRecord, Timestamp};

use crate::metrics::ServiceMetrics;
use crate::tracing_spans;
use crate::ServiceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    /// Lifetime of a cached "node not found". Zero disables negative caching.
    pub negative_ttl: Duration,
    pub peers_of_peers_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            negative_ttl: Duration::from_secs(30),
            peers_of_peers_limit: 50,
        }
    }
}

/// A cached payload and the time it was captured.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub captured_at: Timestamp,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Valid while `captured_at + ttl > now`.
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.captured_at.saturating_add(self.ttl) > now
    }
}

#[derive(Clone, Debug)]
enum CachedValue {
    Node(Option<NodeRecord>),
    Nodes(Vec<NodeRecord>),
    Peers(Vec<PeerOfPeerRecord>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Cache key for `op` called with `params`.
///
/// Params go through `serde_json::Value`, whose objects keep their keys
/// sorted, so equal parameter sets always produce the same key.
pub fn cache_key<P: Serialize>(op: &str, params: &P) -> Result<String, ServiceError> {
    let canonical = serde_json::to_value(params)?;
    Ok(format!("{op}{canonical}"))
}

pub struct QueryCache {
    datastore: Arc<dyn Datastore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    entries: RwLock<HashMap<String, CacheEntry<CachedValue>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    metrics: Arc<ServiceMetrics>,
}

impl QueryCache {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            datastore,
            clock,
            settings,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// One node by public key, projected to [`NodeRecord::PROJECTION`].
    pub async fn get_node(&self, pubkey: &str) -> Result<Option<NodeRecord>, ServiceError> {
        let key = cache_key("getNode", &json!({ "pubkey": pubkey }))?;
        if let Some(CachedValue::Node(node)) = self.lookup(&key) {
            return Ok(node);
        }

        async {
            let options = FindOptions::new()
                .limit(1)
                .projection(NodeRecord::PROJECTION.iter().copied());
            let documents = self
                .datastore
                .find_many(Collection::Nodes, &Filter::eq("pubkey", pubkey), &options)
                .await?;
            let node = documents
                .into_iter()
                .next()
                .map(from_document::<NodeRecord>)
                .transpose()?;

            let ttl = if node.is_some() {
                self.settings.ttl
            } else {
                self.settings.negative_ttl
            };
            self.store(key, CachedValue::Node(node.clone()), ttl);
            Ok::<_, ServiceError>(node)
        }
        .instrument(tracing_spans::cache_read_span("getNode"))
        .await
    }

    /// The `limit` nodes with the highest total capacity.
    pub async fn get_top_nodes(&self, limit: usize) -> Result<Vec<NodeRecord>, ServiceError> {
        let key = cache_key("getTopNodes", &json!({ "limit": limit }))?;
        if let Some(CachedValue::Nodes(nodes)) = self.lookup(&key) {
            return Ok(nodes);
        }

        async {
            let options = FindOptions::new()
                .sort(Sort::descending("total_capacity"))
                .limit(limit)
                .projection(NodeRecord::PROJECTION.iter().copied());
            let nodes = self
                .datastore
                .find_many(Collection::Nodes, &Filter::All, &options)
                .await?
                .into_iter()
                .map(from_document::<NodeRecord>)
                .collect::<Result<Vec<_>, _>>()?;

            self.store(key, CachedValue::Nodes(nodes.clone()), self.settings.ttl);
            Ok::<_, ServiceError>(nodes)
        }
        .instrument(tracing_spans::cache_read_span("getTopNodes"))
        .await
    }

    /// The newest peers-of-peers rows recorded for `pubkey`.
    pub async fn get_peers_of_peers(
        &self,
        pubkey: &str,
    ) -> Result<Vec<PeerOfPeerRecord>, ServiceError> {
        let key = cache_key("getPeersOfPeers", &json!({ "pubkey": pubkey }))?;
        if let Some(CachedValue::Peers(peers)) = self.lookup(&key) {
            return Ok(peers);
        }

        async {
            let options = FindOptions::new()
                .sort(Sort::descending("timestamp"))
                .limit(self.settings.peers_of_peers_limit);
            let peers = self
                .datastore
                .find_many(
                    Collection::PeersOfPeers,
                    &Filter::eq("node_pubkey", pubkey),
                    &options,
                )
                .await?
                .into_iter()
                .map(from_document::<PeerOfPeerRecord>)
                .collect::<Result<Vec<_>, _>>()?;

            self.store(key, CachedValue::Peers(peers.clone()), self.settings.ttl);
            Ok::<_, ServiceError>(peers)
        }
        .instrument(tracing_spans::cache_read_span("getPeersOfPeers"))
        .await
    }

    /// Drop every entry.
    pub fn clear_cache(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = entries.len();
        entries.clear();
        self.metrics.cache_entries.set(0);
        tracing::info!(dropped, "query cache cleared");
    }

    /// Drop stale entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        self.metrics.cache_entries.set(entries.len() as i64);
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    fn lookup(&self, key: &str) -> Option<CachedValue> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.cache_hits.inc();
                tracing::trace!(key, "cache hit");
                Some(entry.payload.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.cache_misses.inc();
                None
            }
        }
    }

    fn store(&self, key: String, payload: CachedValue, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = CacheEntry {
            payload,
            captured_at: self.clock.now(),
            ttl,
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, entry);
        self.metrics.cache_entries.set(entries.len() as i64);
    }
}
