//! Property tests for in-process query evaluation.

use nodegraph_store::{Document, Filter, FindOptions, Sort};
use proptest::prelude::*;
use serde_json::{json, Value};

fn doc(ts: u64) -> Document {
    json!({ "timestamp": ts }).as_object().cloned().unwrap()
}

proptest! {
    /// `lt(cutoff)` and `gte(cutoff)` split any set of timestamps exactly in two.
    #[test]
    fn lt_and_gte_partition(timestamps in prop::collection::vec(0u64..1_000_000, 0..64), cutoff in 0u64..1_000_000) {
        let docs: Vec<Document> = timestamps.iter().copied().map(doc).collect();
        let lt = Filter::lt("timestamp", cutoff);
        let gte = Filter::gte("timestamp", cutoff);
        for d in &docs {
            prop_assert!(lt.matches(d) != gte.matches(d));
        }
        let below = docs.iter().filter(|d| lt.matches(d)).count();
        prop_assert_eq!(below, timestamps.iter().filter(|t| **t < cutoff).count());
    }

    /// Descending sort with a limit returns the largest values in order.
    #[test]
    fn descending_limit_returns_top_values(values in prop::collection::vec(0u64..u64::MAX, 0..64), limit in 0usize..16) {
        let docs: Vec<Document> = values.iter().copied().map(doc).collect();
        let out = FindOptions::new()
            .sort(Sort::descending("timestamp"))
            .limit(limit)
            .apply(docs);
        let got: Vec<u64> = out
            .iter()
            .map(|d| d.get("timestamp").and_then(Value::as_u64).unwrap())
            .collect();
        let mut expected = values.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        expected.truncate(limit);
        prop_assert_eq!(got, expected);
    }
}
