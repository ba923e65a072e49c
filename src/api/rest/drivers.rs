use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::rest::StatusResponse;
use crate::engine::dispatch::{report_driver_status, report_location};
use crate::error::AppError;
use crate::models::account::Caller;
use crate::models::driver::{DriverStatus, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", get(fleet_summary))
        .route("/drivers/status", post(update_status))
        .route("/drivers/location", post(update_location))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
    pub reported_at: Option<DateTime<Utc>>,
}

/// Aggregate view of the fleet; individual positions and plates stay private.
#[derive(Serialize)]
pub struct FleetSummary {
    pub offline: usize,
    pub available: usize,
    pub reserved: usize,
    pub on_trip: usize,
}

async fn fleet_summary(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> Json<FleetSummary> {
    let counts = state.drivers.count_by_status();
    let count = |status: DriverStatus| counts.get(&status).copied().unwrap_or(0);

    Json(FleetSummary {
        offline: count(DriverStatus::Offline),
        available: count(DriverStatus::Available),
        reserved: count(DriverStatus::Reserved),
        on_trip: count(DriverStatus::OnTrip),
    })
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    report_driver_status(&state, &caller, payload.status)?;
    Ok(StatusResponse::json("updated"))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    report_location(&state, &caller, payload.location, payload.reported_at)?;
    Ok(StatusResponse::json("ok"))
}
