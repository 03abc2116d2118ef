use crate::error::AppError;
use crate::handlers::AppJson;
use crate::models::StatusResponse;
use crate::rate_limit;
use crate::state::AppState;
use axum::{extract::State, Json};
use types::location::LocationUpdate;

/// `POST /update-location/`
///
/// The limiter is keyed by driver, so it only sees drivers the directory
/// knows about.
pub async fn update_location(
    State(state): State<AppState>,
    AppJson(update): AppJson<LocationUpdate>,
) -> Result<Json<StatusResponse>, AppError> {
    let admitted = state.ingest.admit(update).await?;
    state.rate_limiter.check_rate_limit(
        &format!("driver:{}:update_location", admitted.driver_id()),
        rate_limit::LOCATION_UPDATE,
    )?;

    state.ingest.record(admitted).await?;
    Ok(Json(StatusResponse::new("Location updated")))
}
