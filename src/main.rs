use anyhow::Result;
use clap::{Parser, Subcommand};
use ringkv::client::{DeleteReply, GetReply, PutReply, RoutingClient, TcpConnector};
use ringkv::config::{ClientConfig, CoordinatorConfig, NodeConfig};
use ringkv::coordinator::handlers::router;
use ringkv::coordinator::{ClusterCoordinator, CoordinatorClient};
use ringkv::ring::{NodeInfo, REPLICATION_FACTOR, RingCache, codec};
use ringkv::server::listener::serve;
use ringkv::server::replication::internal_router;
use ringkv::server::{CommandProcessor, Rebalancer, Replicator, ServerStatus, StatusCell};
use ringkv::storage::KvStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "ringkv", version, about = "Consistent-hashing distributed key-value store")]
struct Cli {
    /// trace, debug, info, warn or error
    #[arg(long, global = true, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the membership coordinator.
    Coordinator {
        #[arg(long, default_value = "127.0.0.1:4000")]
        bind: SocketAddr,
    },

    /// Run a storage node. Its internal API listens on port + 1000.
    Node {
        #[arg(long, default_value = "127.0.0.1")]
        address: String,
        #[arg(long, default_value_t = 5000)]
        port: u16,
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        /// Entries per shard before it splits.
        #[arg(long, default_value_t = ringkv::config::DEFAULT_SHARD_CAPACITY)]
        capacity: usize,
        #[arg(long, default_value = "http://127.0.0.1:4000")]
        coordinator: String,
        #[arg(long, default_value_t = 2000)]
        poll_ms: u64,
    },

    /// Interactive client connected through a seed node (address:port).
    Client {
        #[arg(long, default_value = "127.0.0.1:5000")]
        seed: NodeInfo,
        #[arg(long, default_value_t = 2000)]
        connect_timeout_ms: u64,
        #[arg(long, default_value_t = ringkv::client::DEFAULT_MAX_REDIRECTS)]
        max_redirects: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    match cli.command {
        Commands::Coordinator { bind } => run_coordinator(CoordinatorConfig { bind }).await,
        Commands::Node {
            address,
            port,
            data_dir,
            capacity,
            coordinator,
            poll_ms,
        } => {
            run_node(NodeConfig {
                address,
                port,
                data_dir,
                shard_capacity: capacity,
                coordinator_url: coordinator,
                poll_interval: Duration::from_millis(poll_ms),
            })
            .await
        }
        Commands::Client {
            seed,
            connect_timeout_ms,
            max_redirects,
        } => {
            run_client(ClientConfig {
                seed,
                connect_timeout: Duration::from_millis(connect_timeout_ms),
                max_redirects,
            })
            .await
        }
    }
}

async fn run_coordinator(config: CoordinatorConfig) -> Result<()> {
    let coordinator = ClusterCoordinator::new();

    // Stats reporter:
    let stats = coordinator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let snapshot = stats.snapshot();
            tracing::info!(
                "Cluster stats: {} member(s), ring v{}",
                stats.member_count(),
                snapshot.version
            );
            for (position, node) in snapshot.ring.iter() {
                tracing::info!("  - {} at {}", node, position);
            }
        }
    });

    tracing::info!("Coordinator listening on {}", config.bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, router(coordinator)).await?;

    Ok(())
}

async fn run_node(config: NodeConfig) -> Result<()> {
    let node = config.node();
    let internal_port = config
        .internal_port()
        .ok_or_else(|| anyhow::anyhow!("port {} leaves no room for the internal API", config.port))?;
    tracing::info!("Starting storage node {}", node);

    // 1. Storage layer:
    let store = Arc::new(KvStore::open(&config.data_dir, config.shard_capacity)?);

    // 2. Shared ring and status:
    let ring = Arc::new(RingCache::default());
    let status = Arc::new(StatusCell::new(ServerStatus::Stopped));
    let replicator = Replicator::new();

    let processor = Arc::new(CommandProcessor::new(
        node.clone(),
        store.clone(),
        ring.clone(),
        status.clone(),
        replicator.clone(),
    ));
    let rebalancer = Rebalancer::new(
        node.clone(),
        store.clone(),
        ring.clone(),
        status.clone(),
        replicator,
    );

    // 3. Internal HTTP API:
    let internal_addr = format!("{}:{}", config.address, internal_port);
    let internal_listener = tokio::net::TcpListener::bind(&internal_addr).await?;
    let internal_app = internal_router(store.clone());
    tracing::info!("Internal API listening on {}", internal_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(internal_listener, internal_app).await {
            tracing::error!("Internal API stopped: {}", e);
        }
    });

    // 4. Client listener (bound before joining so the ring never points at a closed port):
    let client_listener = tokio::net::TcpListener::bind((config.address.as_str(), config.port)).await?;

    // 5. Join the cluster:
    let coordinator = CoordinatorClient::new(&config.coordinator_url);
    let joined = coordinator.join(&node).await?;
    let version = joined.version;
    let moved = rebalancer.install(joined).await?;
    tracing::info!("Joined cluster at ring v{}, handed off {} entries", version, moved);

    // 6. Spawn rebalancer:
    let poller = rebalancer.clone();
    let poll_client = coordinator.clone();
    let poll_interval = config.poll_interval;
    tokio::spawn(async move {
        poller.run(poll_client, poll_interval, version).await;
    });

    // 7. Spawn stats reporter:
    let stats_store = store.clone();
    let stats_ring = ring.clone();
    let stats_status = status.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let entries = stats_store.len().await;
            let shards = stats_store.shard_count().await;
            tracing::info!(
                "Node stats: {:?}, {} entries in {} shard(s), ring of {} node(s)",
                stats_status.get(),
                entries,
                shards,
                stats_ring.snapshot().len()
            );
        }
    });

    // 8. Serve clients until Ctrl+C, then leave and hand everything off:
    tracing::info!("Press Ctrl+C to shutdown");
    tokio::select! {
        result = serve(client_listener, processor) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down, leaving cluster");
            status.set(ServerStatus::WriteLock);
            let left = coordinator.leave(&node).await?;
            let moved = rebalancer.install(left).await?;
            tracing::info!("Handed off {} entries, bye", moved);
        }
    }

    Ok(())
}

const CLIENT_HELP: &str = "\
commands:
  put <key> <value>     store value (rest of the line)
  get <key>             read a value
  delete <key>          remove a key
  password [<pw>]       set or clear the password sent with requests
  keyrange              show the cached rings
  help                  this text
  quit                  exit";

async fn run_client(config: ClientConfig) -> Result<()> {
    let connector = TcpConnector::new(config.connect_timeout);
    let mut client = RoutingClient::bootstrap(connector, config.seed.clone())
        .await?
        .with_max_redirects(config.max_redirects);
    println!("Connected to cluster via {}. Type 'help' for commands.", config.seed);

    let mut password: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        let outcome = match command {
            "" => continue,
            "quit" | "exit" => break,
            "help" => {
                println!("{}", CLIENT_HELP);
                continue;
            }
            "password" => {
                password = (!rest.is_empty()).then(|| rest.to_string());
                println!("password {}", if password.is_some() { "set" } else { "cleared" });
                continue;
            }
            "keyrange" => {
                println!("keyrange_success {}", codec::encode(&client.write_ring()));
                println!(
                    "keyrange_read_success {}",
                    codec::encode_read(&client.read_ring(), REPLICATION_FACTOR)
                );
                continue;
            }
            "put" => match rest.split_once(' ') {
                Some((key, value)) => client
                    .put(key, value.as_bytes(), password.as_deref())
                    .await
                    .map(|reply| match reply {
                        PutReply::Created => format!("put_success {}", key),
                        PutReply::Updated => format!("put_update {}", key),
                        PutReply::Failed(reason) => format!("put_error {} {}", key, reason),
                        PutReply::PasswordRequired => "password required".to_string(),
                    }),
                None => {
                    println!("usage: put <key> <value>");
                    continue;
                }
            },
            "get" => client
                .get(rest, password.as_deref())
                .await
                .map(|reply| match reply {
                    GetReply::Found(value) => String::from_utf8_lossy(&value).into_owned(),
                    GetReply::NotFound => format!("get_error {}", rest),
                    GetReply::PasswordRequired => "password required".to_string(),
                }),
            "delete" => client
                .delete(rest, password.as_deref())
                .await
                .map(|reply| match reply {
                    DeleteReply::Deleted => format!("delete_success {}", rest),
                    DeleteReply::NotFound => format!("delete_error {}", rest),
                    DeleteReply::PasswordRequired => "password required".to_string(),
                }),
            other => {
                println!("unknown command '{}'. {}", other, CLIENT_HELP);
                continue;
            }
        };

        match outcome {
            Ok(text) => println!("{}", text),
            Err(e) => println!("error: {}", e),
        }
    }

    Ok(())
}
