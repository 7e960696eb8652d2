//! Node records stored in the `nodes` collection.

use serde::{Deserialize, Serialize};

use crate::{Pubkey, Timestamp};

/// A Lightning node as tracked locally.
///
/// Upserted by public key on every sync cycle. The sync only knows the
/// summary fields the upstream provider returns; fee aggregates, centrality
/// ranks and addresses start at zero/empty and are refined by a separate
/// enrichment process that writes the same document.
///
/// `#[serde(default)]` lets projected reads (which return a subset of the
/// fields) decode into a full record with the remaining fields defaulted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRecord {
    pub pubkey: Pubkey,
    pub alias: String,
    pub platform: String,
    pub version: String,
    /// Total channel capacity in satoshis.
    pub total_capacity: u64,
    pub active_channel_count: u32,
    pub opened_channel_count: u32,
    pub closed_channel_count: u32,
    pub pending_channel_count: u32,
    pub total_peers: u32,
    /// Uptime as reported by the upstream provider (seconds).
    pub uptime: u64,

    // ── Fee aggregates ─────────────────────────────────────────────────
    pub avg_fee_rate_ppm: u64,
    pub avg_base_fee_msat: u64,
    pub median_fee_rate_ppm: u64,

    // ── Centrality ranks ───────────────────────────────────────────────
    pub betweenness_rank: u32,
    pub closeness_rank: u32,
    pub eigenvector_rank: u32,
    pub weighted_betweenness_rank: u32,
    pub weighted_closeness_rank: u32,
    pub weighted_eigenvector_rank: u32,

    /// Advertised network addresses (`host:port`).
    pub addresses: Vec<String>,
    /// When this record was last written.
    pub timestamp: Timestamp,
}

impl NodeRecord {
    /// Field names returned by projected node reads.
    ///
    /// Hot read paths never need addresses or the enrichment-only fields.
    pub const PROJECTION: &'static [&'static str] = &[
        "pubkey",
        "alias",
        "platform",
        "version",
        "total_capacity",
        "active_channel_count",
        "opened_channel_count",
        "closed_channel_count",
        "pending_channel_count",
        "total_peers",
        "uptime",
        "avg_fee_rate_ppm",
        "betweenness_rank",
        "timestamp",
    ];

    /// A record carrying only the key, everything else defaulted.
    pub fn new(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            ..Default::default()
        }
    }
}
