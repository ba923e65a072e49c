use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::BadRequest(format!(
                "latitude {} out of range",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::BadRequest(format!(
                "longitude {} out of range",
                self.lng
            )));
        }
        Ok(())
    }
}

/// Last reported position of a driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DriverStatus {
    Offline,
    Available,
    Reserved,
    OnTrip,
}

impl DriverStatus {
    pub const ALL: [DriverStatus; 4] = [
        DriverStatus::Offline,
        DriverStatus::Available,
        DriverStatus::Reserved,
        DriverStatus::OnTrip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Offline => "offline",
            DriverStatus::Available => "available",
            DriverStatus::Reserved => "reserved",
            DriverStatus::OnTrip => "on_trip",
        }
    }

    /// Reserved and OnTrip are owned by the dispatch path.
    pub fn is_engaged(&self) -> bool {
        matches!(self, DriverStatus::Reserved | DriverStatus::OnTrip)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub car_type: String,
    pub plate_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub vehicle: Vehicle,
    pub status: DriverStatus,
    pub position: Option<PositionFix>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(id: Uuid, name: String, vehicle: Vehicle) -> Self {
        Self {
            id,
            name,
            vehicle,
            status: DriverStatus::Offline,
            position: None,
            updated_at: Utc::now(),
        }
    }
}
