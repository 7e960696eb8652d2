//! Prometheus metrics for the sync, retention and cache services.
//!
//! [`ServiceMetrics`] owns a dedicated [`Registry`]; [`ServiceMetrics::encode`]
//! renders it in the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::ServiceError;

pub struct ServiceMetrics {
    pub registry: Registry,

    // ── Sync ────────────────────────────────────────────────────────────
    pub sync_cycles: IntCounter,
    pub sync_failures: IntCounter,
    /// Cycles dropped because another cycle was still running.
    pub sync_skipped: IntCounter,
    pub nodes_upserted: IntCounter,
    pub peers_inserted: IntCounter,
    pub sync_duration_ms: Histogram,

    // ── Retention ───────────────────────────────────────────────────────
    pub cleanup_cycles: IntCounter,
    pub cleanup_failures: IntCounter,
    pub cleanup_skipped: IntCounter,
    /// Rows deleted, labelled by collection.
    pub rows_deleted: IntCounterVec,

    // ── Cache ───────────────────────────────────────────────────────────
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub cache_entries: IntGauge,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let sync_cycles = register_int_counter_with_registry!(
            Opts::new("nodegraph_sync_cycles_total", "Completed sync cycles"),
            registry
        )
        .expect("failed to register sync_cycles counter");

        let sync_failures = register_int_counter_with_registry!(
            Opts::new("nodegraph_sync_failures_total", "Sync cycles that failed"),
            registry
        )
        .expect("failed to register sync_failures counter");

        let sync_skipped = register_int_counter_with_registry!(
            Opts::new(
                "nodegraph_sync_skipped_total",
                "Sync cycles skipped because one was already running"
            ),
            registry
        )
        .expect("failed to register sync_skipped counter");

        let nodes_upserted = register_int_counter_with_registry!(
            Opts::new("nodegraph_nodes_upserted_total", "Node records upserted"),
            registry
        )
        .expect("failed to register nodes_upserted counter");

        let peers_inserted = register_int_counter_with_registry!(
            Opts::new(
                "nodegraph_peers_inserted_total",
                "Peers-of-peers records inserted"
            ),
            registry
        )
        .expect("failed to register peers_inserted counter");

        // 10 ms → ~160 s.
        let sync_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "nodegraph_sync_duration_ms",
                "Full sync cycle duration in milliseconds"
            )
            .buckets(exponential_buckets(10.0, 2.0, 15)),
            registry
        )
        .expect("failed to register sync_duration_ms histogram");

        let cleanup_cycles = register_int_counter_with_registry!(
            Opts::new("nodegraph_cleanup_cycles_total", "Completed retention cycles"),
            registry
        )
        .expect("failed to register cleanup_cycles counter");

        let cleanup_failures = register_int_counter_with_registry!(
            Opts::new(
                "nodegraph_cleanup_failures_total",
                "Retention cycles that failed"
            ),
            registry
        )
        .expect("failed to register cleanup_failures counter");

        let cleanup_skipped = register_int_counter_with_registry!(
            Opts::new(
                "nodegraph_cleanup_skipped_total",
                "Retention cycles skipped because one was already running"
            ),
            registry
        )
        .expect("failed to register cleanup_skipped counter");

        let rows_deleted = register_int_counter_vec_with_registry!(
            Opts::new(
                "nodegraph_retention_rows_deleted_total",
                "Rows deleted by retention cleanup"
            ),
            &["collection"],
            registry
        )
        .expect("failed to register rows_deleted counter");

        let cache_hits = register_int_counter_with_registry!(
            Opts::new("nodegraph_cache_hits_total", "Query cache hits"),
            registry
        )
        .expect("failed to register cache_hits counter");

        let cache_misses = register_int_counter_with_registry!(
            Opts::new("nodegraph_cache_misses_total", "Query cache misses"),
            registry
        )
        .expect("failed to register cache_misses counter");

        let cache_entries = register_int_gauge_with_registry!(
            Opts::new("nodegraph_cache_entries", "Entries held by the query cache"),
            registry
        )
        .expect("failed to register cache_entries gauge");

        Self {
            registry,
            sync_cycles,
            sync_failures,
            sync_skipped,
            nodes_upserted,
            peers_inserted,
            sync_duration_ms,
            cleanup_cycles,
            cleanup_failures,
            cleanup_skipped,
            rows_deleted,
            cache_hits,
            cache_misses,
            cache_entries,
        }
    }

    /// Render every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, ServiceError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ServiceError::Other(format!("failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| ServiceError::Other(format!("metrics are not utf-8: {e}")))
    }
}

fn exponential_buckets(start: f64, factor: f64, count: usize) -> Vec<f64> {
    prometheus::exponential_buckets(start, factor, count)
        .expect("exponential bucket parameters are constant and valid")
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
