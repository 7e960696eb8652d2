//! The node-source trait and its wire payloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::UpstreamError;

/// Summary of one node as returned by the "all nodes" endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamNode {
    pub pubkey: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub total_capacity: u64,
    #[serde(default)]
    pub active_channel_count: u32,
    #[serde(default)]
    pub total_peers: u32,
    #[serde(default)]
    pub uptime: u64,
}

/// One peer-of-peer entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamPeer {
    #[serde(rename = "peerPubkey")]
    pub peer_pubkey: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub total_capacity: u64,
    #[serde(default)]
    pub active_channels: u32,
    #[serde(default)]
    pub total_peers: u32,
}

/// Body of the "peers of a node" endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeersOfPeersResponse {
    #[serde(default)]
    pub peers_of_peers: Vec<UpstreamPeer>,
}

/// Read access to the upstream node-data provider.
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// Fetch the full node list.
    async fn get_all_nodes(&self) -> Result<Vec<UpstreamNode>, UpstreamError>;

    /// Fetch the peers-of-peers of one node.
    async fn get_peers_of_peers(&self, pubkey: &str)
        -> Result<PeersOfPeersResponse, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_payload_tolerates_missing_optional_fields() {
        let json = r#"[{"pubkey":"02aa","alias":"alice","total_capacity":1000}]"#;
        let nodes: Vec<UpstreamNode> = serde_json::from_str(json).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].alias, "alice");
        assert_eq!(nodes[0].platform, "");
        assert_eq!(nodes[0].uptime, 0);
    }

    #[test]
    fn peer_payload_uses_camel_case_key() {
        let json = r#"{"peers_of_peers":[{"peerPubkey":"03bb","alias":"bob","total_capacity":5,"active_channels":2,"total_peers":3}]}"#;
        let resp: PeersOfPeersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.peers_of_peers[0].peer_pubkey, "03bb");
        assert_eq!(resp.peers_of_peers[0].active_channels, 2);
    }

    #[test]
    fn empty_peer_body_is_an_empty_list() {
        let resp: PeersOfPeersResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.peers_of_peers.is_empty());
    }
}
