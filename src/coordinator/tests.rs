//! Coordinator Module Tests
//!
//! ## Test Scopes
//! - **Membership**: Join/leave, versioning and position collisions.
//! - **HTTP API**: The router served over loopback, driven by `CoordinatorClient`.

#[cfg(test)]
mod tests {
    use crate::coordinator::handlers::router;
    use crate::coordinator::protocol::RingResponse;
    use crate::coordinator::{ClusterCoordinator, CoordinatorClient, CoordinatorError};
    use crate::ring::{HashRing, NodeInfo};

    fn node(port: u16) -> NodeInfo {
        NodeInfo::new("127.0.0.1", port)
    }

    // ============================================================
    // MEMBERSHIP TESTS
    // ============================================================

    #[test]
    fn test_join_publishes_versioned_snapshots() {
        let coordinator = ClusterCoordinator::new();
        assert_eq!(coordinator.snapshot().version, 0);
        assert!(coordinator.snapshot().ring.is_empty());

        let first = coordinator.join(node(5000)).unwrap();
        let second = coordinator.join(node(5001)).unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(*second.ring, HashRing::from_nodes([node(5000), node(5001)]));
        assert_eq!(coordinator.member_count(), 2);
    }

    #[test]
    fn test_join_twice_keeps_version() {
        let coordinator = ClusterCoordinator::new();
        coordinator.join(node(5000)).unwrap();

        let again = coordinator.join(node(5000)).unwrap();
        assert_eq!(again.version, 1);
        assert_eq!(again.ring.len(), 1);
    }

    #[test]
    fn test_colliding_position_is_rejected() {
        let coordinator = ClusterCoordinator::new();
        let taken = node(5000).position();
        coordinator.join(node(5000)).unwrap();

        let result = coordinator.join_at(taken, node(6000));
        assert_eq!(
            result,
            Err(CoordinatorError::PositionTaken {
                node: node(6000),
                holder: node(5000)
            })
        );
        assert_eq!(coordinator.snapshot().version, 1);
    }

    #[test]
    fn test_leave() {
        let coordinator = ClusterCoordinator::new();
        coordinator.join(node(5000)).unwrap();
        coordinator.join(node(5001)).unwrap();

        let snapshot = coordinator.leave(&node(5000)).unwrap();
        assert_eq!(snapshot.version, 3);
        assert_eq!(*snapshot.ring, HashRing::from_nodes([node(5001)]));

        assert_eq!(
            coordinator.leave(&node(5000)),
            Err(CoordinatorError::UnknownNode(node(5000)))
        );
    }

    // ============================================================
    // HTTP API TESTS
    // ============================================================

    #[test]
    fn test_ring_response_omits_missing_error() {
        let ok = RingResponse {
            version: 3,
            ring: String::new(),
            error: None,
        };
        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(json, r#"{"version":3,"ring":""}"#);

        let parsed: RingResponse = serde_json::from_str(r#"{"version":1,"ring":""}"#).unwrap();
        assert_eq!(parsed.error, None);
    }

    #[tokio::test]
    async fn test_http_round_trip() {
        let coordinator = ClusterCoordinator::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(coordinator)).await.unwrap();
        });

        let client = CoordinatorClient::new(&format!("http://{}/", addr));

        let empty = client.ring().await.unwrap();
        assert_eq!(empty.version, 0);
        assert!(empty.ring.is_empty());

        client.join(&node(5000)).await.unwrap();
        let joined = client.join(&node(5001)).await.unwrap();
        assert_eq!(joined.version, 2);
        assert_eq!(*joined.ring, HashRing::from_nodes([node(5000), node(5001)]));

        let left = client.leave(&node(5000)).await.unwrap();
        assert_eq!(left.ring.len(), 1);
        assert_eq!(client.ring().await.unwrap().version, 3);

        assert!(client.leave(&node(7000)).await.is_err());
    }
}
