use crate::models::HealthResponse;
use crate::state::AppState;
use axum::{extract::State, Json};

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        observers: state.hub.observer_count(),
        rate_limited_keys: state.rate_limiter.tracked_keys(),
    })
}
