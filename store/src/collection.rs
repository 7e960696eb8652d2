//! Named collections and their key/retention layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{Document, StoreError};

/// Separator used when joining compound key parts.
///
/// ASCII unit separator: cannot appear in hex pubkeys or decimal numbers.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// A named collection in the datastore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Nodes,
    PeersOfPeers,
    History,
    NetworkSummary,
    CentralityData,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Nodes,
        Collection::PeersOfPeers,
        Collection::History,
        Collection::NetworkSummary,
        Collection::CentralityData,
    ];

    /// Storage name of the collection.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Nodes => "nodes",
            Collection::PeersOfPeers => "peers_of_peers",
            Collection::History => "history",
            Collection::NetworkSummary => "network_summary",
            Collection::CentralityData => "centrality_data",
        }
    }

    /// Fields whose values together identify a document uniquely.
    pub fn unique_key(&self) -> &'static [&'static str] {
        match self {
            Collection::Nodes => &["pubkey"],
            Collection::PeersOfPeers => &["node_pubkey", "peer_pubkey", "timestamp"],
            Collection::History => &["date"],
            Collection::NetworkSummary => &["date"],
            Collection::CentralityData => &["pubkey"],
        }
    }

    /// Field compared against the retention cutoff, if the collection ages out.
    pub fn retention_field(&self) -> Option<&'static str> {
        match self {
            Collection::Nodes | Collection::PeersOfPeers => Some("timestamp"),
            Collection::History => Some("date"),
            Collection::NetworkSummary | Collection::CentralityData => None,
        }
    }

    /// Render the unique key of `document` as a single string.
    ///
    /// Compound keys are joined with [`KEY_SEPARATOR`].
    pub fn key_of(&self, document: &Document) -> Result<String, StoreError> {
        let mut parts = Vec::with_capacity(self.unique_key().len());
        for field in self.unique_key() {
            let part = match document.get(*field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => {
                    return Err(StoreError::MissingKey {
                        collection: self.name().to_string(),
                        field: (*field).to_string(),
                    })
                }
            };
            parts.push(part);
        }
        Ok(parts.join(&KEY_SEPARATOR.to_string()))
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
