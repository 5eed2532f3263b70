use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    identity::Actor,
    services::reservations::{
        CreateReservationRequest, ReservationFilter, ReservationListResponse,
        ReservationResponse, TransitionAck, UpdatePaymentStatusRequest, UpdateReservationRequest,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ReservationListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub status: Option<String>,
    pub requester_id: Option<Uuid>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

pub async fn create_reservation(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateReservationRequest>,
) -> ApiResult<ReservationResponse> {
    let reservation = state.reservations.create_reservation(actor, request).await?;
    Ok(Json(ApiResponse::success(reservation)))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<ReservationResponse> {
    let reservation = state.reservations.get_reservation(id, actor).await?;
    Ok(Json(ApiResponse::success(reservation)))
}

pub async fn list_reservations(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ReservationListQuery>,
) -> ApiResult<ReservationListResponse> {
    let filter = ReservationFilter {
        status: query.status,
        requester_id: query.requester_id,
    };
    let list = state
        .reservations
        .list_reservations(actor, filter, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

pub async fn update_reservation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateReservationRequest>,
) -> ApiResult<ReservationResponse> {
    let reservation = state
        .reservations
        .update_reservation(id, actor, request)
        .await?;
    Ok(Json(ApiResponse::success(reservation)))
}

pub async fn confirm_reservation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<TransitionAck> {
    let ack = state.reservations.confirm_reservation(id, actor).await?;
    Ok(Json(ApiResponse::success(ack)))
}

pub async fn reject_reservation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<TransitionAck> {
    let ack = state.reservations.reject_reservation(id, actor).await?;
    Ok(Json(ApiResponse::success(ack)))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<TransitionAck> {
    let ack = state.reservations.cancel_reservation(id, actor).await?;
    Ok(Json(ApiResponse::success(ack)))
}

pub async fn delete_reservation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<TransitionAck> {
    let ack = state.reservations.delete_reservation(id, actor).await?;
    Ok(Json(ApiResponse::success(ack)))
}

pub async fn confirm_pickup(
    State(state): State<AppState>,
    actor: Actor,
    Path(line_id): Path<Uuid>,
) -> ApiResult<TransitionAck> {
    let ack = state.reservations.confirm_pickup(line_id, actor).await?;
    Ok(Json(ApiResponse::success(ack)))
}

pub async fn return_items(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<TransitionAck> {
    let ack = state.reservations.return_items(id, actor).await?;
    Ok(Json(ApiResponse::success(ack)))
}

pub async fn update_payment_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> ApiResult<TransitionAck> {
    let ack = state
        .reservations
        .update_payment_status(id, actor, request)
        .await?;
    Ok(Json(ApiResponse::success(ack)))
}
