use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use super::protocol::{ENDPOINT_JOIN, ENDPOINT_LEAVE, ENDPOINT_RING, RingResponse};
use super::service::{ClusterCoordinator, CoordinatorError, RingSnapshot};
use crate::ring::{NodeInfo, codec};

pub fn router(coordinator: Arc<ClusterCoordinator>) -> Router {
    Router::new()
        .route(ENDPOINT_JOIN, post(handle_join))
        .route(ENDPOINT_LEAVE, post(handle_leave))
        .route(ENDPOINT_RING, get(handle_ring))
        .layer(Extension(coordinator))
}

pub async fn handle_join(
    Extension(coordinator): Extension<Arc<ClusterCoordinator>>,
    Json(node): Json<NodeInfo>,
) -> (StatusCode, Json<RingResponse>) {
    let result = coordinator.join(node);
    respond(&coordinator, result)
}

pub async fn handle_leave(
    Extension(coordinator): Extension<Arc<ClusterCoordinator>>,
    Json(node): Json<NodeInfo>,
) -> (StatusCode, Json<RingResponse>) {
    let result = coordinator.leave(&node);
    respond(&coordinator, result)
}

pub async fn handle_ring(
    Extension(coordinator): Extension<Arc<ClusterCoordinator>>,
) -> Json<RingResponse> {
    Json(to_response(&coordinator.snapshot(), None))
}

fn respond(
    coordinator: &ClusterCoordinator,
    result: Result<RingSnapshot, CoordinatorError>,
) -> (StatusCode, Json<RingResponse>) {
    match result {
        Ok(snapshot) => (StatusCode::OK, Json(to_response(&snapshot, None))),
        Err(e) => {
            tracing::warn!("Membership change refused: {}", e);
            let status = match e {
                CoordinatorError::PositionTaken { .. } => StatusCode::CONFLICT,
                CoordinatorError::UnknownNode(_) => StatusCode::NOT_FOUND,
            };
            (
                status,
                Json(to_response(&coordinator.snapshot(), Some(e.to_string()))),
            )
        }
    }
}

fn to_response(snapshot: &RingSnapshot, error: Option<String>) -> RingResponse {
    RingResponse {
        version: snapshot.version,
        ring: codec::encode(&snapshot.ring),
        error,
    }
}
