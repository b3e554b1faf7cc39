//! Cluster Coordinator Module
//!
//! Single-process membership authority. Storage nodes announce themselves with explicit
//! join/leave calls; the coordinator turns the member set into versioned ring snapshots which
//! nodes poll and install.
//!
//! ## Core Concepts
//! - **Membership**: Members are keyed by their ring position; a node whose position collides
//!   with a different member is refused.
//! - **Versioned Snapshots**: Every membership change publishes a new immutable ring with a
//!   strictly increasing version, so pollers can tell whether anything changed.
//!
//! ## Submodules
//! - **`service`**: `ClusterCoordinator`, the member set and snapshot publisher.
//! - **`handlers`**: Axum handlers and the coordinator router.
//! - **`client`**: `CoordinatorClient`, used by nodes.
//! - **`protocol`**: Endpoints and JSON bodies.

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod service;

pub use client::CoordinatorClient;
pub use service::{ClusterCoordinator, CoordinatorError, RingSnapshot};

#[cfg(test)]
mod tests;
