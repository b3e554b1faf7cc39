//! Routing Client Module
//!
//! Client-side library that sends `get`/`put`/`delete` to the node responsible for a key and
//! keeps its view of the cluster up to date as nodes come and go.
//!
//! ## Core Concepts
//! - **Two Rings**: Writes route with the write ring (primary only), reads with the read ring
//!   (primary or one of its replicas, chosen by `ReplicaPolicy`).
//! - **Self-Healing Metadata**: `server_not_responsible` triggers a ring refresh from the
//!   connected node; unreachable nodes are dropped from the local ring.
//! - **Backoff**: `server_stopped` and `server_write_lock` are retried after a capped,
//!   randomized exponential delay.
//! - **Password Challenge**: `invalid_password` is surfaced to the caller instead of retried.
//!
//! ## Submodules
//! - **`connection`**: Transport traits and the tokio TCP implementation.
//! - **`library`**: `RoutingClient`, the request state machine.
//! - **`selection`**: Replica selection for reads.
//! - **`backoff`**: Retry delays.
//! - **`types`**: Replies and the client error type.

pub mod backoff;
pub mod connection;
pub mod library;
pub mod selection;
pub mod types;

pub use connection::{Connection, Connector, TcpConnector};
pub use library::{DEFAULT_MAX_REDIRECTS, RoutingClient, hash_password};
pub use selection::ReplicaPolicy;
pub use types::{ClientError, DeleteReply, GetReply, PasswordChallenge, PutReply};
