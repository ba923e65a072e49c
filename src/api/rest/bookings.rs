use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::rest::StatusResponse;
use crate::engine::dispatch::{self, BookingOutcome};
use crate::error::AppError;
use crate::models::account::Caller;
use crate::models::booking::Booking;
use crate::models::driver::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/accept", post(accept_booking))
        .route("/bookings/:id/reject", post(reject_booking))
        .route("/bookings/:id/start", post(start_ride))
        .route("/bookings/:id/end", post(end_ride))
        .route("/bookings/:id/cancel", post(cancel_booking))
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub pickup: GeoPoint,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let body = match dispatch::create_booking(&state, &caller, payload.pickup)? {
        BookingOutcome::Searching(booking) => json!({
            "status": "searching",
            "booking_id": booking.id,
        }),
        BookingOutcome::NoDriversAvailable(booking) => json!({
            "message": "no drivers available",
            "booking_id": booking.id,
        }),
    };

    Ok(Json(body))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(dispatch::get_booking(&state, &caller, &id)?))
}

async fn accept_booking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    dispatch::accept_booking(&state, &caller, &id)?;
    Ok(StatusResponse::json("accepted"))
}

async fn reject_booking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    dispatch::reject_booking(&state, &caller, &id)?;
    Ok(StatusResponse::json("rejected"))
}

async fn start_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    dispatch::start_ride(&state, &caller, &id)?;
    Ok(StatusResponse::json("in_progress"))
}

async fn end_ride(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    dispatch::end_ride(&state, &caller, &id)?;
    Ok(StatusResponse::json("completed"))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    dispatch::cancel_booking(&state, &caller, &id)?;
    Ok(StatusResponse::json("cancelled"))
}
