//! Fundamental types for the nodegraph workspace.
//!
//! This crate defines the records that flow between the upstream node-data
//! provider, the datastore, and the query cache, plus the timestamp and clock
//! abstractions every background service uses to reason about age.

pub mod error;
pub mod history;
pub mod node;
pub mod peer;
pub mod pubkey;
pub mod time;

pub use error::TypesError;
pub use history::HistoryRecord;
pub use node::NodeRecord;
pub use peer::PeerOfPeerRecord;
pub use pubkey::Pubkey;
pub use time::{Clock, SystemClock, Timestamp, SECS_PER_DAY};
