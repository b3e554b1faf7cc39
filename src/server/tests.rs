//! Server Module Tests
//!
//! ## Test Scopes
//! - **Command Processing**: Status gates, responsibility checks, storage outcomes.
//! - **End to End**: `RoutingClient` over real TCP against running listeners.
//! - **Replication**: Writes reaching replicas in the order the primary accepted them.
//! - **Hand-off**: Ring installs moving entries through the internal HTTP API.

#[cfg(test)]
mod tests {
    use crate::client::{DeleteReply, GetReply, PutReply, RoutingClient, TcpConnector};
    use crate::coordinator::RingSnapshot;
    use crate::protocol::Response;
    use crate::ring::{HashRing, NodeInfo, Position, RingCache, codec};
    use crate::server::listener::{GREETING, serve};
    use crate::server::replication::{EntryJson, ReplicateRequest, internal_router};
    use crate::server::{CommandProcessor, Rebalancer, Replicator, ServerStatus, StatusCell};
    use crate::storage::{GetStatus, KvStore, Record};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    struct TestNode {
        node: NodeInfo,
        store: Arc<KvStore>,
        ring: Arc<RingCache>,
        status: Arc<StatusCell>,
        _dir: TempDir,
    }

    impl TestNode {
        fn new(node: NodeInfo) -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                node,
                store: Arc::new(KvStore::open(dir.path(), 8).unwrap()),
                ring: Arc::new(RingCache::default()),
                status: Arc::new(StatusCell::default()),
                _dir: dir,
            }
        }

        fn activate(&self, ring: HashRing) {
            self.ring.replace(ring);
            self.status.set(ServerStatus::Active);
        }

        fn processor(&self) -> Arc<CommandProcessor> {
            Arc::new(CommandProcessor::new(
                self.node.clone(),
                self.store.clone(),
                self.ring.clone(),
                self.status.clone(),
                Replicator::new(),
            ))
        }

        fn rebalancer(&self) -> Arc<Rebalancer> {
            Rebalancer::new(
                self.node.clone(),
                self.store.clone(),
                self.ring.clone(),
                self.status.clone(),
                Replicator::new(),
            )
        }
    }

    /// Starts a listener on an ephemeral port and returns the node it serves as.
    async fn spawn_listener() -> TestNode {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let node = TestNode::new(NodeInfo::new("127.0.0.1", port));
        let processor = node.processor();
        tokio::spawn(async move {
            let _ = serve(listener, processor).await;
        });
        node
    }

    /// Starts an internal API on an ephemeral port and returns the node whose client port maps
    /// onto it.
    async fn spawn_internal_api() -> TestNode {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let node = TestNode::new(NodeInfo::new("127.0.0.1", port - 1000));
        let router = internal_router(node.store.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        node
    }

    /// A key whose responsible node in `ring` is `owner`.
    fn key_owned_by(ring: &HashRing, owner: &NodeInfo) -> String {
        (0..10_000)
            .map(|i| format!("key{}", i))
            .find(|key| ring.responsible(Position::of_key(key)).unwrap() == owner)
            .unwrap()
    }

    fn snapshot(version: u64, ring: HashRing) -> RingSnapshot {
        RingSnapshot {
            version,
            ring: Arc::new(ring),
        }
    }

    // ============================================================
    // COMMAND PROCESSING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_stopped_node_refuses_everything() {
        let node = TestNode::new(NodeInfo::new("127.0.0.1", 5000));
        let processor = node.processor();

        assert_eq!(processor.process("get k").await, Response::ServerStopped);
        assert_eq!(processor.process("put k 76").await, Response::ServerStopped);
        assert_eq!(processor.process("keyrange").await, Response::ServerStopped);
    }

    #[tokio::test]
    async fn test_single_node_commands() {
        let me = NodeInfo::new("127.0.0.1", 5000);
        let node = TestNode::new(me.clone());
        node.activate(HashRing::from_nodes([me.clone()]));
        let processor = node.processor();

        assert_eq!(
            processor.process("put k 76").await,
            Response::PutSuccess { key: "k".into() }
        );
        assert_eq!(
            processor.process("put k 77").await,
            Response::PutUpdate { key: "k".into() }
        );
        assert_eq!(
            processor.process("get k").await,
            Response::GetSuccess {
                key: "k".into(),
                value: b"w".to_vec()
            }
        );
        assert_eq!(
            processor.process("delete k").await,
            Response::DeleteSuccess { key: "k".into() }
        );
        assert_eq!(
            processor.process("get k").await,
            Response::GetError { key: "k".into() }
        );
        assert_eq!(
            processor.process("delete k").await,
            Response::DeleteError { key: "k".into() }
        );
        assert_eq!(
            processor.process("keyrange").await,
            Response::KeyRange(codec::encode(&HashRing::from_nodes([me])))
        );
    }

    #[tokio::test]
    async fn test_password_gate() {
        let me = NodeInfo::new("127.0.0.1", 5000);
        let node = TestNode::new(me.clone());
        node.activate(HashRing::from_nodes([me]));
        let processor = node.processor();

        processor.process("put k 76 pw1").await;
        assert_eq!(processor.process("get k pw2").await, Response::InvalidPassword);
        assert_eq!(processor.process("put k 77").await, Response::InvalidPassword);
        assert_eq!(processor.process("delete k").await, Response::InvalidPassword);
        assert_eq!(
            processor.process("get k pw1").await,
            Response::GetSuccess {
                key: "k".into(),
                value: b"v".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn test_write_lock_allows_reads_only() {
        let me = NodeInfo::new("127.0.0.1", 5000);
        let node = TestNode::new(me.clone());
        node.activate(HashRing::from_nodes([me]));
        let processor = node.processor();
        processor.process("put k 76").await;

        node.status.set(ServerStatus::WriteLock);

        assert_eq!(processor.process("put k 77").await, Response::ServerWriteLock);
        assert_eq!(processor.process("delete k").await, Response::ServerWriteLock);
        assert!(matches!(processor.process("get k").await, Response::GetSuccess { .. }));
    }

    #[tokio::test]
    async fn test_responsibility_checks() {
        let ring = HashRing::from_nodes((5001..=5005).map(|port| NodeInfo::new("127.0.0.1", port)));
        let a = NodeInfo::new("127.0.0.1", 5001);
        let node = TestNode::new(a.clone());
        node.activate(ring.clone());
        let processor = node.processor();

        // a key that a neither owns nor replicates
        let foreign = (0..10_000)
            .map(|i| format!("key{}", i))
            .find(|key| !ring.is_read_responsible(&a, Position::of_key(key), 2))
            .unwrap();
        assert_eq!(
            processor.process(&format!("get {}", foreign)).await,
            Response::ServerNotResponsible
        );
        assert_eq!(
            processor.process(&format!("put {} 76", foreign)).await,
            Response::ServerNotResponsible
        );

        // a key a only replicates: readable, not writable
        let replicated = (0..10_000)
            .map(|i| format!("key{}", i))
            .find(|key| {
                let hash = Position::of_key(key);
                ring.is_read_responsible(&a, hash, 2) && !ring.is_responsible(&a, hash)
            })
            .unwrap();
        assert_eq!(
            processor.process(&format!("get {}", replicated)).await,
            Response::GetError {
                key: replicated.clone()
            }
        );
        assert_eq!(
            processor.process(&format!("delete {}", replicated)).await,
            Response::ServerNotResponsible
        );
    }

    #[tokio::test]
    async fn test_malformed_requests_get_error_line() {
        let me = NodeInfo::new("127.0.0.1", 5000);
        let node = TestNode::new(me.clone());
        node.activate(HashRing::from_nodes([me]));
        let processor = node.processor();

        assert!(matches!(processor.process("frobnicate").await, Response::Error(_)));
        assert!(matches!(processor.process("put k nothex").await, Response::Error(_)));
        assert!(matches!(processor.process("get").await, Response::Error(_)));
    }

    #[test]
    fn test_replicate_request_json_shape() {
        let entry = EntryJson::new("k", &Record::new(b"v v".to_vec(), Some("abc".to_string())));
        let json = serde_json::to_value(ReplicateRequest::Put { entry: entry.clone() }).unwrap();

        assert_eq!(json["op"], "put");
        assert_eq!(json["entry"]["value_hex"], "762076");
        assert_eq!(
            entry.into_entry().unwrap(),
            ("k".to_string(), Record::new(b"v v".to_vec(), Some("abc".to_string())))
        );

        let delete: ReplicateRequest =
            serde_json::from_str(r#"{"op":"delete","key":"k"}"#).unwrap();
        assert_eq!(delete, ReplicateRequest::Delete { key: "k".to_string() });
    }

    // ============================================================
    // END TO END TESTS
    // ============================================================

    #[tokio::test]
    async fn test_listener_greets_and_answers() {
        let node = spawn_listener().await;
        node.activate(HashRing::from_nodes([node.node.clone()]));

        let stream = TcpStream::connect(("127.0.0.1", node.node.port)).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), GREETING);
        writer.write_all(b"put k 76\r\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "put_success k");
        writer.write_all(b"nonsense\r\n").await.unwrap();
        assert!(lines.next_line().await.unwrap().unwrap().starts_with("error "));
    }

    #[tokio::test]
    async fn test_one_node_cluster_through_routing_client() {
        let node = spawn_listener().await;
        node.activate(HashRing::from_nodes([node.node.clone()]));

        let mut client = RoutingClient::bootstrap(TcpConnector::default(), node.node.clone())
            .await
            .unwrap();

        assert_eq!(client.put("hello", b"world", None).await.unwrap(), PutReply::Created);
        assert_eq!(
            client.get("hello", None).await.unwrap(),
            GetReply::Found(b"world".to_vec())
        );
        assert_eq!(client.put("hello", b"again", None).await.unwrap(), PutReply::Updated);
        assert_eq!(client.delete("hello", None).await.unwrap(), DeleteReply::Deleted);
        assert_eq!(client.get("hello", None).await.unwrap(), GetReply::NotFound);

        assert_eq!(client.put("secret", b"v", Some("pw")).await.unwrap(), PutReply::Created);
        assert_eq!(
            client.get("secret", Some("other")).await.unwrap(),
            GetReply::PasswordRequired
        );
        assert_eq!(
            client.get("secret", Some("pw")).await.unwrap(),
            GetReply::Found(b"v".to_vec())
        );
    }

    #[tokio::test]
    async fn test_misrouted_client_refreshes_and_succeeds() {
        let (a, b) = (spawn_listener().await, spawn_listener().await);
        let ring = HashRing::from_nodes([a.node.clone(), b.node.clone()]);
        a.activate(ring.clone());
        b.activate(ring.clone());
        let key = key_owned_by(&ring, &b.node);

        // the client only knows a, so the write goes there first
        let mut client =
            RoutingClient::new(TcpConnector::default(), HashRing::from_nodes([a.node.clone()]));

        assert_eq!(client.put(&key, b"v", None).await.unwrap(), PutReply::Created);
        assert_eq!(*client.write_ring(), ring);
        assert_eq!(client.connected_to(), Some(&b.node));
        assert_eq!(b.store.len().await, 1);
        assert_eq!(a.store.len().await, 0);
    }

    // ============================================================
    // HAND-OFF TESTS
    // ============================================================

    #[tokio::test]
    async fn test_leaving_node_hands_everything_off() {
        let me = NodeInfo::new("127.0.0.1", 5000);
        let leaving = TestNode::new(me.clone());
        leaving.activate(HashRing::from_nodes([me.clone()]));
        let entries: Vec<(String, Record)> = (0..30)
            .map(|i| (format!("key{}", i), Record::new(vec![i as u8 + 1], None)))
            .collect();
        leaving.store.insert_entries(entries).await.unwrap();

        let heir = spawn_internal_api().await;
        let moved = leaving
            .rebalancer()
            .install(snapshot(2, HashRing::from_nodes([heir.node.clone()])))
            .await
            .unwrap();

        assert_eq!(moved, 30);
        assert_eq!(leaving.store.len().await, 0);
        assert_eq!(heir.store.len().await, 30);
        assert_eq!(leaving.status.get(), ServerStatus::Stopped);
        assert_eq!(leaving.store.shard_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_hand_off_keeps_entries() {
        let me = NodeInfo::new("127.0.0.1", 5000);
        let node = TestNode::new(me.clone());
        node.activate(HashRing::from_nodes([me.clone()]));
        let entries: Vec<(String, Record)> = (0..5)
            .map(|i| (format!("key{}", i), Record::new(vec![1], None)))
            .collect();
        node.store.insert_entries(entries).await.unwrap();

        // nothing listens on the internal port of this node
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);
        let gone = NodeInfo::new("127.0.0.1", port - 1000);

        let moved = node
            .rebalancer()
            .install(snapshot(2, HashRing::from_nodes([gone])))
            .await
            .unwrap();

        assert_eq!(moved, 0);
        assert_eq!(node.store.len().await, 5);
    }

    #[tokio::test]
    async fn test_install_keeps_entries_still_owned() {
        let me = NodeInfo::new("127.0.0.1", 5000);
        let other = NodeInfo::new("127.0.0.1", 5001);
        let ring = HashRing::from_nodes([me.clone(), other]);
        let node = TestNode::new(me.clone());
        node.activate(HashRing::from_nodes([me.clone()]));
        let key = key_owned_by(&ring, &me);
        node.store
            .insert_entries(vec![(key, Record::new(vec![1], None))])
            .await
            .unwrap();

        let moved = node.rebalancer().install(snapshot(2, ring)).await.unwrap();

        assert_eq!(moved, 0);
        assert_eq!(node.store.len().await, 1);
        assert_eq!(node.status.get(), ServerStatus::Active);
    }

    #[tokio::test]
    async fn test_joining_node_receives_the_keys_it_now_owns() {
        let old_owner = TestNode::new(NodeInfo::new("127.0.0.1", 5000));
        old_owner.activate(HashRing::from_nodes([old_owner.node.clone()]));
        let joiner = spawn_internal_api().await;
        let ring = HashRing::from_nodes([old_owner.node.clone(), joiner.node.clone()]);
        joiner.activate(ring.clone());

        let moving = key_owned_by(&ring, &joiner.node);
        let staying = key_owned_by(&ring, &old_owner.node);
        let processor = old_owner.processor();
        assert_eq!(
            processor.process(&format!("put {} 76 pw", moving)).await,
            Response::PutSuccess { key: moving.clone() }
        );
        processor.process(&format!("put {} 77", staying)).await;

        let moved = old_owner
            .rebalancer()
            .install(snapshot(2, ring))
            .await
            .unwrap();

        assert_eq!(moved, 1);
        // the old owner is the new replica and keeps both
        assert_eq!(old_owner.store.len().await, 2);
        assert_eq!(joiner.store.len().await, 1);

        let joined = joiner.processor();
        assert_eq!(
            joined.process(&format!("get {} pw", moving)).await,
            Response::GetSuccess {
                key: moving.clone(),
                value: b"v".to_vec()
            }
        );
        assert_eq!(
            joined.process(&format!("put {} 68", moving)).await,
            Response::InvalidPassword
        );
        assert_eq!(
            processor.process(&format!("put {} 68 pw", moving)).await,
            Response::ServerNotResponsible
        );
    }

    // ============================================================
    // REPLICATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_replica_applies_put_then_delete_in_order() {
        let me = NodeInfo::new("127.0.0.1", 5000);
        let primary = TestNode::new(me.clone());
        let replica = spawn_internal_api().await;
        let ring = HashRing::from_nodes([me.clone(), replica.node.clone()]);
        primary.activate(ring.clone());
        let processor = primary.processor();

        let key = key_owned_by(&ring, &me);
        let marker = (0..10_000)
            .map(|i| format!("marker{}", i))
            .find(|marker| ring.is_responsible(&me, Position::of_key(marker)))
            .unwrap();

        for _ in 0..20 {
            processor.process(&format!("put {} 76", key)).await;
            processor.process(&format!("delete {}", key)).await;
        }
        processor.process(&format!("put {} 76", marker)).await;

        // the marker is queued last, so every earlier write has landed once it shows up
        let mut landed = false;
        for _ in 0..200 {
            if replica.store.get(&marker, None).await != GetStatus::NotFound {
                landed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(landed);
        assert_eq!(replica.store.get(&key, None).await, GetStatus::NotFound);
        assert_eq!(replica.store.len().await, 1);
    }
}
