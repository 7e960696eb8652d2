//! Upstream node-data provider.
//!
//! The provider is an external HTTP service exposing the full node list and
//! the peers-of-peers of a single node. [`NodeSource`] is the seam the sync
//! orchestrator depends on; [`HttpNodeSource`] is the production client.

pub mod error;
pub mod http;
pub mod source;

pub use error::UpstreamError;
pub use http::HttpNodeSource;
pub use source::{NodeSource, PeersOfPeersResponse, UpstreamNode, UpstreamPeer};
