//! Dated market snapshots stored in the `history` collection.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// One point of the price/volume trend display.
///
/// Written by the market-data importer; this workspace only ages them out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryRecord {
    pub date: Timestamp,
    pub price: f64,
    pub volume: f64,
    pub market_cap: f64,
}
