use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{apply, Actor};
use crate::error::AppError;
use crate::models::account::{Caller, Role};
use crate::models::booking::{Booking, BookingEvent};
use crate::models::driver::{Driver, DriverStatus, GeoPoint};
use crate::state::AppState;

/// How far ahead of the server clock a position timestamp may be.
pub const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Result of a booking request that was processed to a decision.
#[derive(Debug, Clone)]
pub enum BookingOutcome {
    /// A driver is reserved and the booking waits for acceptance.
    Searching(Booking),
    /// Nobody could be reserved; the booking is recorded as unmatched.
    NoDriversAvailable(Booking),
}

impl BookingOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            BookingOutcome::Searching(booking) | BookingOutcome::NoDriversAvailable(booking) => {
                booking
            }
        }
    }
}

pub fn create_booking(
    state: &AppState,
    caller: &Caller,
    pickup: GeoPoint,
) -> Result<BookingOutcome, AppError> {
    caller.require(Role::Rider)?;
    pickup.validate()?;

    let mut booking = Booking::new(caller.id, pickup);
    apply(&mut booking, BookingEvent::BeginSearch)?;

    let timer = state.metrics.match_latency_seconds.start_timer();
    let matched = state.matcher.reserve_driver(&state.drivers, &pickup);
    timer.observe_duration();

    match matched {
        Ok(outcome) => {
            state
                .metrics
                .reservation_conflicts_total
                .inc_by(outcome.conflicts as u64);

            if let Err(err) = apply(&mut booking, BookingEvent::DriverFound(outcome.driver_id)) {
                release_or_warn(state, &outcome.driver_id);
                return Err(err);
            }
            state.bookings.insert(booking.clone());
            state
                .metrics
                .bookings_total
                .with_label_values(&["assigned"])
                .inc();

            info!(
                booking_id = %booking.id,
                rider_id = %caller.id,
                driver_id = %outcome.driver_id,
                policy = %state.matcher.policy(),
                "driver reserved for booking"
            );

            Ok(BookingOutcome::Searching(booking))
        }
        Err(AppError::NoDriversAvailable) => {
            apply(&mut booking, BookingEvent::NoDriverFound)?;
            state.bookings.insert(booking.clone());
            state
                .metrics
                .bookings_total
                .with_label_values(&["unmatched"])
                .inc();

            warn!(booking_id = %booking.id, rider_id = %caller.id, "no drivers available");

            Ok(BookingOutcome::NoDriversAvailable(booking))
        }
        Err(err) => Err(err),
    }
}

pub fn accept_booking(
    state: &AppState,
    caller: &Caller,
    booking_id: &Uuid,
) -> Result<Booking, AppError> {
    driver_transition(state, caller, booking_id, BookingEvent::Accept, |_| Ok(()))
}

pub fn reject_booking(
    state: &AppState,
    caller: &Caller,
    booking_id: &Uuid,
) -> Result<Booking, AppError> {
    driver_transition(state, caller, booking_id, BookingEvent::Reject, |driver_id| {
        state.drivers.release(driver_id)
    })
}

pub fn start_ride(
    state: &AppState,
    caller: &Caller,
    booking_id: &Uuid,
) -> Result<Booking, AppError> {
    driver_transition(state, caller, booking_id, BookingEvent::Start, |driver_id| {
        state.drivers.begin_trip(driver_id)
    })
}

pub fn end_ride(state: &AppState, caller: &Caller, booking_id: &Uuid) -> Result<Booking, AppError> {
    driver_transition(state, caller, booking_id, BookingEvent::End, |driver_id| {
        state.drivers.release(driver_id)
    })
}

pub fn cancel_booking(
    state: &AppState,
    caller: &Caller,
    booking_id: &Uuid,
) -> Result<Booking, AppError> {
    caller.require(Role::Rider)?;

    let booking = state.bookings.transition(
        booking_id,
        Actor::Rider(caller.id),
        BookingEvent::Cancel,
        |booking| match booking.driver_id {
            Some(driver_id) => state.drivers.release(&driver_id).map_err(registry_failure),
            None => Ok(()),
        },
    )?;

    state.metrics.record_transition(BookingEvent::Cancel.name());
    Ok(booking)
}

/// Bookings are visible to their rider and their assigned driver.
pub fn get_booking(
    state: &AppState,
    caller: &Caller,
    booking_id: &Uuid,
) -> Result<Booking, AppError> {
    let booking = state
        .bookings
        .get(booking_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    let visible = match caller.role {
        Role::Rider => booking.rider_id == caller.id,
        Role::Driver => booking.driver_id == Some(caller.id),
    };

    if visible {
        Ok(booking)
    } else {
        Err(AppError::Forbidden(format!(
            "you are not part of booking {booking_id}"
        )))
    }
}

pub fn report_driver_status(
    state: &AppState,
    caller: &Caller,
    status: DriverStatus,
) -> Result<Driver, AppError> {
    caller.require(Role::Driver)?;
    let driver = state.drivers.report_status(&caller.id, status)?;
    info!(driver_id = %caller.id, status = status.as_str(), "driver status updated");
    Ok(driver)
}

/// Returns whether the report replaced the stored position.
pub fn report_location(
    state: &AppState,
    caller: &Caller,
    point: GeoPoint,
    reported_at: Option<DateTime<Utc>>,
) -> Result<bool, AppError> {
    caller.require(Role::Driver)?;
    point.validate()?;

    let now = Utc::now();
    let reported_at = reported_at.unwrap_or(now);
    if reported_at > now + chrono::Duration::seconds(MAX_CLOCK_SKEW_SECS) {
        return Err(AppError::BadRequest(format!(
            "reported_at {reported_at} is in the future"
        )));
    }

    state.drivers.report_position(&caller.id, point, reported_at)
}

/// Expires bookings whose driver has not accepted within `timeout`,
/// handing the driver back to the pool.
pub fn expire_unaccepted(
    state: &AppState,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let cutoff = elapsed_cutoff(now, timeout)?;
    let mut expired = 0;

    for booking_id in state.bookings.assigned_before(cutoff) {
        let result = state.bookings.transition(
            &booking_id,
            Actor::System,
            BookingEvent::Expire,
            |booking| match booking.driver_id {
                Some(driver_id) => state.drivers.release(&driver_id).map_err(registry_failure),
                None => Ok(()),
            },
        );

        match result {
            Ok(booking) => {
                expired += 1;
                state.metrics.record_transition(BookingEvent::Expire.name());
                warn!(
                    booking_id = %booking.id,
                    driver_id = ?booking.driver_id,
                    "assignment expired without acceptance"
                );
            }
            // Accepted or rejected since the scan.
            Err(AppError::InvalidState(reason)) => {
                debug!(booking_id = %booking_id, reason = %reason, "skipping expiry");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(expired)
}

pub fn archive_finished(
    state: &AppState,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let before = elapsed_cutoff(now, retention)?;
    Ok(state.bookings.archive_finished(before))
}

fn driver_transition<F>(
    state: &AppState,
    caller: &Caller,
    booking_id: &Uuid,
    event: BookingEvent,
    effect: F,
) -> Result<Booking, AppError>
where
    F: FnOnce(&Uuid) -> Result<(), AppError>,
{
    caller.require(Role::Driver)?;

    let booking = state.bookings.transition(
        booking_id,
        Actor::Driver(caller.id),
        event,
        |_| effect(&caller.id).map_err(registry_failure),
    )?;

    state.metrics.record_transition(event.name());
    Ok(booking)
}

/// Hands a reserved driver back to the pool; failures are logged, not raised.
fn release_or_warn(state: &AppState, driver_id: &Uuid) -> bool {
    match state.drivers.release(driver_id) {
        Ok(()) => true,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "failed to release driver");
            false
        }
    }
}

// The booking and the registry disagree about the driver; not the caller's fault.
fn registry_failure(err: AppError) -> AppError {
    AppError::Internal(format!("driver registry rejected transition: {err}"))
}

/// `now - window`, or an error when the window reaches past the representable range.
fn elapsed_cutoff(now: DateTime<Utc>, window: Duration) -> Result<DateTime<Utc>, AppError> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or_else(|| AppError::Internal(format!("time window of {window:?} is out of range")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::engine::matcher::MatchPolicy;
    use crate::models::booking::BookingState;
    use crate::models::driver::Vehicle;

    const PICKUP: GeoPoint = GeoPoint {
        lat: 59.3293,
        lng: 18.0686,
    };

    fn rider(seed: u128) -> Caller {
        Caller::rider(Uuid::from_u128(seed))
    }

    fn add_driver(state: &AppState, seed: u128, status: DriverStatus) -> Caller {
        let id = Uuid::from_u128(seed);
        let mut driver = Driver::new(
            id,
            format!("driver-{seed}"),
            Vehicle {
                car_type: "sedan".to_string(),
                plate_number: format!("ABC {seed:03}"),
            },
        );
        driver.status = status;
        state.drivers.register(driver);
        Caller::driver(id)
    }

    fn status_of(state: &AppState, caller: &Caller) -> DriverStatus {
        state.drivers.get(&caller.id).unwrap().status
    }

    fn assigned_booking(state: &AppState) -> (Booking, Caller) {
        let driver = add_driver(state, 500, DriverStatus::Available);
        let outcome = create_booking(state, &rider(1), PICKUP).unwrap();
        let booking = outcome.booking().clone();
        assert_eq!(booking.driver_id, Some(driver.id));
        (booking, driver)
    }

    #[test]
    fn no_available_drivers_leaves_only_terminal_bookings() {
        let state = AppState::new(MatchPolicy::Nearest);
        add_driver(&state, 10, DriverStatus::Offline);
        add_driver(&state, 11, DriverStatus::Offline);

        let outcome = create_booking(&state, &rider(1), PICKUP).unwrap();

        assert!(matches!(outcome, BookingOutcome::NoDriversAvailable(_)));
        assert_eq!(outcome.booking().state, BookingState::Unmatched);
        assert_eq!(state.bookings.active_count(), 0);
    }

    #[test]
    fn booking_reserves_exactly_one_driver() {
        let state = AppState::new(MatchPolicy::FirstAvailable);
        let drivers: Vec<Caller> = (10..15)
            .map(|seed| add_driver(&state, seed, DriverStatus::Available))
            .collect();

        let outcome = create_booking(&state, &rider(1), PICKUP).unwrap();
        let booking = outcome.booking();

        assert!(matches!(outcome, BookingOutcome::Searching(_)));
        assert_eq!(booking.state, BookingState::Assigned);
        for driver in &drivers {
            let expected = if Some(driver.id) == booking.driver_id {
                DriverStatus::Reserved
            } else {
                DriverStatus::Available
            };
            assert_eq!(status_of(&state, driver), expected);
        }
    }

    #[test]
    fn drivers_cannot_request_rides() {
        let state = AppState::new(MatchPolicy::Nearest);
        let driver = add_driver(&state, 10, DriverStatus::Available);

        let err = create_booking(&state, &driver, PICKUP).unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(state.bookings.is_empty());
        assert_eq!(status_of(&state, &driver), DriverStatus::Available);
    }

    #[test]
    fn concurrent_requests_never_overbook() {
        let state = Arc::new(AppState::new(MatchPolicy::Nearest));
        let available = 4;
        for seed in 0..available {
            add_driver(&state, 1_000 + seed, DriverStatus::Available);
        }

        let handles: Vec<_> = (0..available + 1)
            .map(|seed| {
                let state = state.clone();
                thread::spawn(move || create_booking(&state, &rider(seed), PICKUP).unwrap())
            })
            .collect();

        let outcomes: Vec<BookingOutcome> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        let matched = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, BookingOutcome::Searching(_)))
            .count();
        assert_eq!(matched, available as usize);

        let mut assigned: Vec<Uuid> = outcomes
            .iter()
            .filter_map(|outcome| outcome.booking().driver_id)
            .collect();
        assigned.sort();
        assigned.dedup();
        assert_eq!(assigned.len(), available as usize);
    }

    #[test]
    fn only_assigned_driver_may_accept() {
        let state = AppState::new(MatchPolicy::Nearest);
        let (booking, driver) = assigned_booking(&state);
        let intruder = add_driver(&state, 501, DriverStatus::Offline);

        let err = accept_booking(&state, &intruder, &booking.id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(
            state.bookings.get(&booking.id).unwrap().state,
            BookingState::Assigned
        );

        let accepted = accept_booking(&state, &driver, &booking.id).unwrap();
        assert_eq!(accepted.state, BookingState::Accepted);
    }

    #[test]
    fn riders_cannot_drive_the_lifecycle() {
        let state = AppState::new(MatchPolicy::Nearest);
        let (booking, _driver) = assigned_booking(&state);

        let err = accept_booking(&state, &rider(1), &booking.id).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn start_on_unmatched_booking_is_invalid() {
        let state = AppState::new(MatchPolicy::Nearest);
        let driver = add_driver(&state, 10, DriverStatus::Offline);
        let outcome = create_booking(&state, &rider(1), PICKUP).unwrap();
        let booking_id = outcome.booking().id;

        let err = start_ride(&state, &driver, &booking_id).unwrap_err();

        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(
            state.bookings.get(&booking_id).unwrap().state,
            BookingState::Unmatched
        );
    }

    #[test]
    fn full_ride_returns_driver_to_pool() {
        let state = AppState::new(MatchPolicy::Nearest);
        let (booking, driver) = assigned_booking(&state);

        accept_booking(&state, &driver, &booking.id).unwrap();
        assert_eq!(status_of(&state, &driver), DriverStatus::Reserved);

        start_ride(&state, &driver, &booking.id).unwrap();
        assert_eq!(status_of(&state, &driver), DriverStatus::OnTrip);

        let completed = end_ride(&state, &driver, &booking.id).unwrap();
        assert_eq!(completed.state, BookingState::Completed);
        assert_eq!(status_of(&state, &driver), DriverStatus::Available);

        // A second end must not release the driver again.
        state.drivers.try_reserve(&driver.id).unwrap();
        let err = end_ride(&state, &driver, &booking.id).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(status_of(&state, &driver), DriverStatus::Reserved);
    }

    #[test]
    fn rejection_releases_driver() {
        let state = AppState::new(MatchPolicy::Nearest);
        let (booking, driver) = assigned_booking(&state);

        let rejected = reject_booking(&state, &driver, &booking.id).unwrap();

        assert_eq!(rejected.state, BookingState::Rejected);
        assert_eq!(status_of(&state, &driver), DriverStatus::Available);
    }

    #[test]
    fn rider_cancellation_releases_driver() {
        let state = AppState::new(MatchPolicy::Nearest);
        let (booking, driver) = assigned_booking(&state);
        accept_booking(&state, &driver, &booking.id).unwrap();

        let err = cancel_booking(&state, &rider(2), &booking.id).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let cancelled = cancel_booking(&state, &rider(1), &booking.id).unwrap();
        assert_eq!(cancelled.state, BookingState::Cancelled);
        assert_eq!(status_of(&state, &driver), DriverStatus::Available);
    }

    #[test]
    fn stale_assignments_expire() {
        let state = AppState::new(MatchPolicy::Nearest);
        let (booking, driver) = assigned_booking(&state);
        let timeout = Duration::from_secs(30);

        assert_eq!(expire_unaccepted(&state, timeout, Utc::now()).unwrap(), 0);

        let later = Utc::now() + chrono::Duration::seconds(31);
        assert_eq!(expire_unaccepted(&state, timeout, later).unwrap(), 1);
        assert_eq!(
            state.bookings.get(&booking.id).unwrap().state,
            BookingState::Expired
        );
        assert_eq!(status_of(&state, &driver), DriverStatus::Available);

        let err = accept_booking(&state, &driver, &booking.id).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn booking_visible_to_participants_only() {
        let state = AppState::new(MatchPolicy::Nearest);
        let (booking, driver) = assigned_booking(&state);

        assert!(get_booking(&state, &rider(1), &booking.id).is_ok());
        assert!(get_booking(&state, &driver, &booking.id).is_ok());
        assert!(matches!(
            get_booking(&state, &rider(2), &booking.id).unwrap_err(),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            get_booking(&state, &rider(1), &Uuid::from_u128(77)).unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn riders_cannot_report_driver_status() {
        let state = AppState::new(MatchPolicy::Nearest);
        let driver = add_driver(&state, 10, DriverStatus::Offline);

        let err = report_driver_status(&state, &rider(1), DriverStatus::Available).unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(_)));
        assert_eq!(status_of(&state, &driver), DriverStatus::Offline);

        report_driver_status(&state, &driver, DriverStatus::Available).unwrap();
        assert_eq!(status_of(&state, &driver), DriverStatus::Available);
    }

    #[test]
    fn location_reports_validate_coordinates() {
        let state = AppState::new(MatchPolicy::Nearest);
        let driver = add_driver(&state, 10, DriverStatus::Available);

        let err = report_location(&state, &driver, GeoPoint { lat: 91.0, lng: 0.0 }, None)
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        assert!(report_location(&state, &driver, PICKUP, None).unwrap());
        let stale = Utc::now() - chrono::Duration::minutes(5);
        assert!(!report_location(&state, &driver, PICKUP, Some(stale)).unwrap());
    }

    #[test]
    fn future_dated_location_cannot_freeze_position() {
        let state = AppState::new(MatchPolicy::Nearest);
        let driver = add_driver(&state, 10, DriverStatus::Available);
        let next_year = Utc::now() + chrono::Duration::days(365);

        let err = report_location(&state, &driver, PICKUP, Some(next_year)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(state.drivers.get(&driver.id).unwrap().position.is_none());

        let moved = GeoPoint {
            lat: 59.3300,
            lng: 18.0700,
        };
        assert!(report_location(&state, &driver, moved, None).unwrap());
        assert_eq!(
            state.drivers.get(&driver.id).unwrap().position.unwrap().point,
            moved
        );
    }

    #[test]
    fn small_clock_skew_is_tolerated() {
        let state = AppState::new(MatchPolicy::Nearest);
        let driver = add_driver(&state, 10, DriverStatus::Available);
        let slightly_ahead = Utc::now() + chrono::Duration::seconds(5);

        assert!(report_location(&state, &driver, PICKUP, Some(slightly_ahead)).unwrap());
    }

    #[test]
    fn release_or_warn_reports_outcome() {
        let state = AppState::new(MatchPolicy::Nearest);
        let reserved = add_driver(&state, 10, DriverStatus::Reserved);
        let idle = add_driver(&state, 11, DriverStatus::Available);

        assert!(release_or_warn(&state, &reserved.id));
        assert_eq!(status_of(&state, &reserved), DriverStatus::Available);

        assert!(!release_or_warn(&state, &idle.id));
        assert!(!release_or_warn(&state, &Uuid::from_u128(404)));
        assert_eq!(status_of(&state, &idle), DriverStatus::Available);
    }

    #[test]
    fn oversized_windows_error_instead_of_panicking() {
        let state = AppState::new(MatchPolicy::Nearest);
        let huge = Duration::from_secs(10_000_000_000_000);

        assert!(matches!(
            archive_finished(&state, huge, Utc::now()).unwrap_err(),
            AppError::Internal(_)
        ));
        assert!(matches!(
            expire_unaccepted(&state, huge, Utc::now()).unwrap_err(),
            AppError::Internal(_)
        ));
    }
}
