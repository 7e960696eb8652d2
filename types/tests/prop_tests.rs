use proptest::prelude::*;

use nodegraph_types::{NodeRecord, Pubkey, Timestamp, SECS_PER_DAY};

proptest! {
    /// days_before never underflows and moves back by whole days otherwise.
    #[test]
    fn days_before_is_saturating(secs in any::<u64>(), days in 0u64..10_000) {
        let ts = Timestamp::new(secs);
        let back = ts.days_before(days);
        prop_assert!(back <= ts);
        let span = days * SECS_PER_DAY;
        if secs >= span {
            prop_assert_eq!(back.as_secs(), secs - span);
        } else {
            prop_assert_eq!(back, Timestamp::EPOCH);
        }
    }

    /// has_expired flips exactly at timestamp + duration.
    #[test]
    fn has_expired_boundary(start in 0u64..u64::MAX / 2, duration in 0u64..1_000_000) {
        let ts = Timestamp::new(start);
        prop_assert!(!ts.has_expired(duration + 1, Timestamp::new(start + duration)));
        prop_assert!(ts.has_expired(duration, Timestamp::new(start + duration)));
    }

    /// Keys without whitespace parse and display unchanged.
    #[test]
    fn pubkey_parse_preserves_text(raw in "[0-9a-f]{1,66}") {
        let key = Pubkey::parse(raw.clone()).unwrap();
        prop_assert_eq!(key.to_string(), raw);
    }

    /// Keys containing whitespace are rejected.
    #[test]
    fn pubkey_rejects_whitespace(prefix in "[0-9a-f]{0,8}", suffix in "[0-9a-f]{0,8}") {
        let raw = format!("{prefix} {suffix}");
        prop_assert!(Pubkey::parse(raw).is_err());
    }

    /// A node record survives a JSON round trip with arbitrary summary values.
    #[test]
    fn node_record_json_roundtrip(capacity in any::<u64>(), peers in any::<u32>(), ts in any::<u64>()) {
        let mut node = NodeRecord::new(Pubkey::parse("02aa").unwrap());
        node.total_capacity = capacity;
        node.total_peers = peers;
        node.timestamp = Timestamp::new(ts);
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeRecord = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, node);
    }
}
