//! Pre-built [`tracing::Span`] constructors for service operations.
//!
//! Consistent span names and field sets make cycles easy to filter and
//! correlate in any tracing backend.

use tracing::{debug_span, info_span, Span};

/// Span covering one full sync cycle (nodes, then peers-of-peers).
pub fn sync_cycle_span(cycle_ts: u64) -> Span {
    info_span!("sync_cycle", cycle_ts = cycle_ts)
}

/// Span covering the node-upsert phase of a sync cycle.
pub fn sync_nodes_span() -> Span {
    info_span!("sync_nodes")
}

/// Span covering the peers-of-peers phase of a sync cycle.
pub fn sync_peers_span() -> Span {
    info_span!("sync_peers")
}

/// Span covering one retention cycle over all collections.
pub fn cleanup_cycle_span() -> Span {
    info_span!("cleanup_cycle")
}

pub fn cleanup_collection_span(collection: &str, cutoff: u64) -> Span {
    info_span!("cleanup_collection", collection = %collection, cutoff = cutoff)
}

/// Span covering a single cached read.
pub fn cache_read_span(op: &str) -> Span {
    debug_span!("cache_read", op = %op)
}
