//! Peer-of-peer records stored in the `peers_of_peers` collection.

use serde::{Deserialize, Serialize};

use crate::{Pubkey, Timestamp};

/// A node one hop beyond a tracked node's own peer set.
///
/// Append-only: every sync cycle writes a fresh batch stamped with the
/// cycle's timestamp. The canonical uniqueness key is
/// `(node_pubkey, peer_pubkey, timestamp)`; re-inserting the same triple is
/// skipped by the datastore rather than duplicated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerOfPeerRecord {
    /// The tracked node whose peer set produced this record.
    pub node_pubkey: Pubkey,
    pub peer_pubkey: Pubkey,
    pub alias: String,
    /// Total channel capacity of the peer in satoshis.
    pub total_capacity: u64,
    pub active_channels: u32,
    pub total_peers: u32,
    pub timestamp: Timestamp,
}

impl PeerOfPeerRecord {
    /// Fields forming the uniqueness key.
    pub const UNIQUE_KEY: &'static [&'static str] = &["node_pubkey", "peer_pubkey", "timestamp"];
}
