//! Nullable upstream: scripted node data without HTTP.

use async_trait::async_trait;
use nodegraph_upstream::{
    NodeSource, PeersOfPeersResponse, UpstreamError, UpstreamNode, UpstreamPeer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted node source for testing.
///
/// Serves a fixed node list and per-node peer lists, records every call,
/// and can be told to fail the next N fetches or to delay each response.
pub struct NullNodeSource {
    nodes: Mutex<Vec<UpstreamNode>>,
    peers: Mutex<HashMap<String, Vec<UpstreamPeer>>>,
    node_fetches: AtomicUsize,
    peer_fetch_log: Mutex<Vec<String>>,
    failing_node_fetches: AtomicUsize,
    failing_peer_fetches: AtomicUsize,
    latency: Mutex<Duration>,
}

impl NullNodeSource {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            peers: Mutex::new(HashMap::new()),
            node_fetches: AtomicUsize::new(0),
            peer_fetch_log: Mutex::new(Vec::new()),
            failing_node_fetches: AtomicUsize::new(0),
            failing_peer_fetches: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Create with a node list.
    pub fn with_nodes(nodes: Vec<UpstreamNode>) -> Self {
        let source = Self::new();
        source.set_nodes(nodes);
        source
    }

    /// Replace the served node list.
    pub fn set_nodes(&self, nodes: Vec<UpstreamNode>) {
        *self.nodes.lock().unwrap() = nodes;
    }

    /// Set the peers-of-peers served for `pubkey`.
    pub fn set_peers(&self, pubkey: &str, peers: Vec<UpstreamPeer>) {
        self.peers
            .lock()
            .unwrap()
            .insert(pubkey.to_string(), peers);
    }

    /// Fail the next `count` node-list fetches.
    pub fn fail_next_node_fetches(&self, count: usize) {
        self.failing_node_fetches.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` peers-of-peers fetches.
    pub fn fail_next_peer_fetches(&self, count: usize) {
        self.failing_peer_fetches.store(count, Ordering::SeqCst);
    }

    /// Sleep this long before answering each call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Number of node-list fetches so far.
    pub fn node_fetches(&self) -> usize {
        self.node_fetches.load(Ordering::SeqCst)
    }

    /// Number of peers-of-peers fetches so far.
    pub fn peer_fetches(&self) -> usize {
        self.peer_fetch_log.lock().unwrap().len()
    }

    /// Pubkeys requested from the peers-of-peers endpoint, in call order.
    pub fn peer_fetch_log(&self) -> Vec<String> {
        self.peer_fetch_log.lock().unwrap().clone()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Consume one scripted failure from `counter`, if any remain.
    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for NullNodeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeSource for NullNodeSource {
    async fn get_all_nodes(&self) -> Result<Vec<UpstreamNode>, UpstreamError> {
        self.node_fetches.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if Self::take_failure(&self.failing_node_fetches) {
            return Err(UpstreamError::Unreachable(
                "scripted node-list failure".into(),
            ));
        }
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn get_peers_of_peers(
        &self,
        pubkey: &str,
    ) -> Result<PeersOfPeersResponse, UpstreamError> {
        self.peer_fetch_log
            .lock()
            .unwrap()
            .push(pubkey.to_string());
        self.delay().await;
        if Self::take_failure(&self.failing_peer_fetches) {
            return Err(UpstreamError::Unreachable(format!(
                "scripted peers failure for {pubkey}"
            )));
        }
        let peers_of_peers = self
            .peers
            .lock()
            .unwrap()
            .get(pubkey)
            .cloned()
            .unwrap_or_default();
        Ok(PeersOfPeersResponse { peers_of_peers })
    }
}
