//! Ring Module Tests
//!
//! ## Test Scopes
//! - **Lookup**: successor semantics, wrap-around, replica walking.
//! - **Intervals**: write and read ranges, including wrapping intervals.
//! - **Codec**: wire round trips and rejection of malformed metadata.
//! - **Cache**: snapshot swaps.

#[cfg(test)]
mod tests {
    use crate::ring::codec::{decode, encode, encode_read};
    use crate::ring::{HashRange, HashRing, NodeInfo, Position, RingCache, RingError};

    fn node(name: &str) -> NodeInfo {
        NodeInfo::new(name, 5000)
    }

    /// Nodes A, B, C at positions 10, 20, 30.
    fn abc_ring() -> HashRing {
        [
            (Position(10), node("a")),
            (Position(20), node("b")),
            (Position(30), node("c")),
        ]
        .into_iter()
        .collect()
    }

    fn five_node_ring() -> HashRing {
        (1..=5)
            .map(|i| (Position(i * 100), NodeInfo::new("10.0.0.1", 5000 + i as u16)))
            .collect()
    }

    // ============================================================
    // LOOKUP TESTS
    // ============================================================

    #[test]
    fn test_key_between_positions_resolves_to_successor() {
        let ring = abc_ring();

        assert_eq!(ring.responsible(Position(25)).unwrap(), &node("c"));
        assert_eq!(ring.responsible(Position(11)).unwrap(), &node("b"));
        assert_eq!(ring.responsible(Position(0)).unwrap(), &node("a"));
    }

    #[test]
    fn test_key_above_last_position_wraps_to_first() {
        let ring = abc_ring();

        assert_eq!(ring.responsible(Position(31)).unwrap(), &node("a"));
        assert_eq!(ring.responsible(Position::MAX).unwrap(), &node("a"));
    }

    #[test]
    fn test_every_position_resolves_to_its_own_node() {
        let ring = five_node_ring();

        for (position, owner) in ring.iter() {
            assert_eq!(ring.responsible(*position).unwrap(), owner);
        }
    }

    #[test]
    fn test_replica_walks_successors_circularly() {
        let ring = abc_ring();

        assert_eq!(ring.replica(Position(25), 0).unwrap(), &node("c"));
        assert_eq!(ring.replica(Position(25), 1).unwrap(), &node("a"));
        assert_eq!(ring.replica(Position(25), 2).unwrap(), &node("b"));
        // a full lap returns to the primary
        assert_eq!(ring.replica(Position(25), 3).unwrap(), &node("c"));
    }

    #[test]
    fn test_empty_ring_fails_lookups() {
        let ring = HashRing::new();

        assert_eq!(ring.responsible(Position(1)), Err(RingError::Empty));
        assert_eq!(ring.replica(Position(1), 1), Err(RingError::Empty));
    }

    #[test]
    fn test_without_returns_reduced_copy() {
        let ring = abc_ring();
        let reduced = ring.without(Position(30));

        assert_eq!(ring.len(), 3, "original ring must not change");
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced.responsible(Position(25)).unwrap(), &node("a"));
    }

    #[test]
    fn test_from_nodes_places_nodes_at_their_hash() {
        let nodes = vec![NodeInfo::new("127.0.0.1", 5001), NodeInfo::new("127.0.0.1", 5002)];
        let ring = HashRing::from_nodes(nodes.clone());

        for node in nodes {
            assert_eq!(ring.position_of(&node), Some(node.position()));
        }
    }

    #[test]
    fn test_replicas_of_skips_primary_and_duplicates() {
        let ring = abc_ring();
        assert_eq!(ring.replicas_of(Position(25), 2), vec![node("a"), node("b")]);

        let small: HashRing = [(Position(10), node("a")), (Position(20), node("b"))]
            .into_iter()
            .collect();
        assert_eq!(small.replicas_of(Position(15), 2), vec![node("a")]);
    }

    // ============================================================
    // INTERVAL TESTS
    // ============================================================

    #[test]
    fn test_write_range_is_predecessor_exclusive() {
        let ring = abc_ring();

        let range = ring.write_range(Position(20)).unwrap();
        assert_eq!(range, HashRange::new(Position(10), Position(20)));
        assert!(!range.contains(Position(10)));
        assert!(range.contains(Position(11)));
        assert!(range.contains(Position(20)));
    }

    #[test]
    fn test_first_node_range_wraps() {
        let ring = abc_ring();

        let range = ring.write_range(Position(10)).unwrap();
        assert!(range.contains(Position(5)));
        assert!(range.contains(Position(31)));
        assert!(!range.contains(Position(15)));
    }

    #[test]
    fn test_single_node_owns_everything() {
        let ring: HashRing = [(Position(42), node("solo"))].into_iter().collect();
        let range = ring.write_range(Position(42)).unwrap();

        assert!(range.is_full());
        assert!(range.contains(Position(0)));
        assert!(range.contains(Position::MAX));
    }

    #[test]
    fn test_read_range_covers_replicated_predecessors() {
        let ring = five_node_ring();

        // node at 300 holds its own interval plus those of 200 and 100
        let range = ring.read_range(Position(300), 2).unwrap();
        assert_eq!(range, HashRange::new(Position(500), Position(300)));
        assert!(range.contains(Position(50)));
        assert!(range.contains(Position(250)));
        assert!(!range.contains(Position(450)));
    }

    #[test]
    fn test_read_range_with_few_nodes_is_full() {
        let ring = abc_ring();
        assert!(ring.read_range(Position(20), 2).unwrap().is_full());

        let pair = ring.without(Position(30));
        assert!(pair.read_range(Position(10), 2).unwrap().is_full());
        assert!(!pair.write_range(Position(10)).unwrap().is_full());
    }

    #[test]
    fn test_read_responsibility_matches_replica_walk() {
        let ring = five_node_ring();

        for hash in [Position(0), Position(150), Position(420), Position(u128::MAX - 1)] {
            for offset in 0..=2 {
                let holder = ring.replica(hash, offset).unwrap();
                assert!(ring.is_read_responsible(holder, hash, 2));
            }
            let outsider = ring.replica(hash, 3).unwrap();
            assert!(!ring.is_read_responsible(outsider, hash, 2));
        }
    }

    // ============================================================
    // CODEC TESTS
    // ============================================================

    #[test]
    fn test_encode_write_form() {
        let ring = abc_ring();
        let wire = encode(&ring);

        let expected = format!(
            "{},{},a:5000;{},{},b:5000;{},{},c:5000;",
            Position(30),
            Position(10),
            Position(10),
            Position(20),
            Position(20),
            Position(30)
        );
        assert_eq!(wire, expected);
    }

    #[test]
    fn test_round_trip_both_forms() {
        for ring in [abc_ring(), five_node_ring()] {
            assert_eq!(decode(&encode(&ring)).unwrap(), ring);
            assert_eq!(decode(&encode_read(&ring, 2)).unwrap(), ring);
        }
    }

    #[test]
    fn test_decode_accepts_uppercase_hex() {
        let wire = format!("{},{},host:1;", "A".repeat(32), "B".repeat(32));
        let ring = decode(&wire).unwrap();

        assert_eq!(ring.len(), 1);
        let end: Position = "b".repeat(32).parse().unwrap();
        assert_eq!(ring.get(end), Some(&NodeInfo::new("host", 1)));
    }

    #[test]
    fn test_decode_rejects_malformed_rings() {
        let good = encode(&abc_ring());
        let cases = vec![
            String::new(),
            ";".to_string(),
            good.trim_end_matches(';').to_string(),
            good.replacen(":5000", ":99999", 1),
            good.replacen(":5000", "", 1),
            good.replacen(',', "", 1),
            format!("{}{}", good, ";"),
            format!("{},{},x:1;", "0".repeat(31), "1".repeat(32)),
            format!("{},{},x:1;", "g".repeat(32), "1".repeat(32)),
            format!("{}{}", good, good),
        ];

        for wire in cases {
            assert!(
                matches!(decode(&wire), Err(RingError::Malformed(_))),
                "expected '{}' to be rejected",
                wire
            );
        }
    }

    #[test]
    fn test_position_display_is_fixed_width() {
        assert_eq!(Position(1).to_string(), format!("{}1", "0".repeat(31)));
        assert_eq!(Position::MAX.to_string(), "f".repeat(32));
        assert!("0".repeat(31).parse::<Position>().is_err());
    }

    #[test]
    fn test_node_info_parse() {
        assert_eq!(
            "127.0.0.1:5153".parse::<NodeInfo>().unwrap(),
            NodeInfo::new("127.0.0.1", 5153)
        );
        assert!("127.0.0.1".parse::<NodeInfo>().is_err());
        assert!(":80".parse::<NodeInfo>().is_err());
    }

    // ============================================================
    // CACHE TESTS
    // ============================================================

    #[test]
    fn test_cache_swaps_whole_snapshots() {
        let cache = RingCache::new(abc_ring());
        let before = cache.snapshot();

        cache.replace(five_node_ring());

        assert_eq!(before.len(), 3, "held snapshot is unaffected by replace");
        assert_eq!(cache.snapshot().len(), 5);
    }

    #[test]
    fn test_cache_remove_drops_entry() {
        let cache = RingCache::new(abc_ring());

        let reduced = cache.remove(Position(20));
        assert_eq!(reduced.len(), 2);
        assert_eq!(cache.snapshot().len(), 2);

        cache.remove(Position(10));
        cache.remove(Position(30));
        assert!(cache.is_empty());
    }
}
