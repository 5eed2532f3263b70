use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    identity::Actor, services::availability::AvailabilityReport, ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Advisory availability for display; the number is re-validated when a
/// reservation is actually submitted.
pub async fn check_availability(
    State(state): State<AppState>,
    _actor: Actor,
    Path(item_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<AvailabilityReport> {
    let report = state
        .reservations
        .check_availability(item_id, query.start_date, query.end_date)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}
