//! Liveness endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /health
///
/// Always healthy while the process serves requests. `lastCycle` lets callers detect a
/// stalled feed.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime: state.uptime(),
        subscribers: state.hub.len(),
        last_cycle: state.reader.get().map(|snapshot| snapshot.timestamp),
    })
}
