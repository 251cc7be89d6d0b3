//! Routing status endpoint
//!
//! Read-only view of the latest recorded routing decision for a lead,
//! for operators and the CRUD layer.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::error::{ApiError, ApiResult};
use crate::types::RoutingDecision;
use crate::AppState;

/// GET /leads/:id/routing
///
/// Latest routing decision for the lead, 404 if none recorded yet.
pub async fn routing_status(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
) -> ApiResult<Json<RoutingDecision>> {
    let decision = state
        .store
        .latest_decision(&lead_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no routing decision for lead {}", lead_id)))?;

    Ok(Json(decision))
}

/// Build routing status routes
pub fn routing_routes() -> Router<AppState> {
    Router::new().route("/leads/:id/routing", get(routing_status))
}
