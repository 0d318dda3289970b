//! Latest snapshot and active thresholds

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::trace;

use crate::{
    api::{state::ApiState, types::PendingResponse},
    config::Thresholds,
};

/// GET /metrics
pub async fn latest_metrics(State(state): State<ApiState>) -> Response {
    match state.reader.get() {
        Some(snapshot) => Json(snapshot.as_ref()).into_response(),
        None => {
            trace!("metrics requested before the first cycle");
            Json(PendingResponse::default()).into_response()
        }
    }
}

/// GET /thresholds
pub async fn thresholds(State(state): State<ApiState>) -> Json<Thresholds> {
    Json(state.thresholds.as_ref().clone())
}
