use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, PositionFix};

/// A driver that looked available when the snapshot was taken.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub driver_id: Uuid,
    pub position: Option<GeoPoint>,
}

/// Authoritative store of driver availability and position.
///
/// Every status change goes through `DashMap::get_mut`, which holds the
/// shard write lock for the entry, so each check-and-set below is atomic
/// per driver.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: DashMap<Uuid, Driver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, driver: Driver) {
        self.drivers.insert(driver.id, driver);
    }

    pub fn get(&self, driver_id: &Uuid) -> Option<Driver> {
        self.drivers.get(driver_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn count_by_status(&self) -> HashMap<DriverStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.drivers.iter() {
            *counts.entry(entry.value().status).or_insert(0) += 1;
        }
        counts
    }

    /// Driver-reported availability. Only `Available` and `Offline` can be
    /// reported, and not while the driver is engaged in a booking.
    pub fn report_status(&self, driver_id: &Uuid, status: DriverStatus) -> Result<Driver, AppError> {
        if status.is_engaged() {
            return Err(AppError::BadRequest(format!(
                "status {} cannot be reported by a driver",
                status.as_str()
            )));
        }

        let mut driver = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if driver.status.is_engaged() {
            return Err(AppError::InvalidState(format!(
                "driver {driver_id} is {}",
                driver.status.as_str()
            )));
        }

        driver.status = status;
        driver.updated_at = Utc::now();
        Ok(driver.clone())
    }

    /// Stores the fix if it is newer than the one on record. Returns whether
    /// it was stored; stale reports are dropped.
    pub fn report_position(
        &self,
        driver_id: &Uuid,
        point: GeoPoint,
        reported_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut driver = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if let Some(current) = &driver.position {
            if reported_at <= current.reported_at {
                debug!(driver_id = %driver_id, "dropping stale position report");
                return Ok(false);
            }
        }

        driver.position = Some(PositionFix { point, reported_at });
        Ok(true)
    }

    /// Best-effort snapshot; a candidate may be gone by the time it is reserved.
    pub fn find_available(&self) -> Vec<Candidate> {
        self.drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                (driver.status == DriverStatus::Available).then(|| Candidate {
                    driver_id: driver.id,
                    position: driver.position.map(|fix| fix.point),
                })
            })
            .collect()
    }

    /// Available -> Reserved, or `Conflict` if the driver is no longer available.
    pub fn try_reserve(&self, driver_id: &Uuid) -> Result<(), AppError> {
        self.transition(driver_id, &[DriverStatus::Available], DriverStatus::Reserved)
            .map_err(|err| match err {
                AppError::InvalidState(msg) => AppError::Conflict(msg),
                other => other,
            })
    }

    /// Reserved -> OnTrip.
    pub fn begin_trip(&self, driver_id: &Uuid) -> Result<(), AppError> {
        self.transition(driver_id, &[DriverStatus::Reserved], DriverStatus::OnTrip)
    }

    /// Reserved or OnTrip -> Available.
    pub fn release(&self, driver_id: &Uuid) -> Result<(), AppError> {
        self.transition(
            driver_id,
            &[DriverStatus::Reserved, DriverStatus::OnTrip],
            DriverStatus::Available,
        )
    }

    fn transition(
        &self,
        driver_id: &Uuid,
        from: &[DriverStatus],
        to: DriverStatus,
    ) -> Result<(), AppError> {
        let mut driver = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if !from.contains(&driver.status) {
            return Err(AppError::InvalidState(format!(
                "driver {driver_id} is {}, cannot become {}",
                driver.status.as_str(),
                to.as_str()
            )));
        }

        driver.status = to;
        driver.updated_at = Utc::now();
        Ok(())
    }
}
