use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingEvent, BookingState, StateChange};

/// Who is driving a transition. Riders and drivers may only touch their own
/// bookings; the system actor is used by maintenance jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Rider(Uuid),
    Driver(Uuid),
    System,
}

/// Moves `booking` along `event`, recording the transition time.
pub fn apply(booking: &mut Booking, event: BookingEvent) -> Result<BookingState, AppError> {
    let next = booking.state.on(event).ok_or_else(|| {
        AppError::InvalidState(format!(
            "booking {} is {}, cannot {}",
            booking.id,
            booking.state.as_str(),
            event.name()
        ))
    })?;

    if let BookingEvent::DriverFound(driver_id) = event {
        booking.driver_id = Some(driver_id);
    }

    booking.state = next;
    booking.history.push(StateChange {
        state: next,
        at: Utc::now(),
    });

    Ok(next)
}

fn authorize(booking: &Booking, actor: Actor) -> Result<(), AppError> {
    let allowed = match actor {
        Actor::Rider(rider_id) => booking.rider_id == rider_id,
        Actor::Driver(driver_id) => booking.driver_id == Some(driver_id),
        Actor::System => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "you are not assigned to booking {}",
            booking.id
        )))
    }
}

#[derive(Default)]
pub struct BookingStore {
    bookings: DashMap<Uuid, Booking>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, booking: Booking) {
        self.bookings.insert(booking.id, booking);
    }

    pub fn get(&self, booking_id: &Uuid) -> Option<Booking> {
        self.bookings.get(booking_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.bookings
            .iter()
            .filter(|entry| !entry.value().state.is_terminal())
            .count()
    }

    /// Applies `event` to a stored booking on behalf of `actor`.
    ///
    /// Checks run before anything is written: the booking must exist, the
    /// event must be valid in its current state, and the actor must own the
    /// booking. `effect` then runs while the entry is still locked, and the
    /// booking only advances if it succeeds, so concurrent or repeated calls
    /// cannot run the same side effect twice.
    pub fn transition<F>(
        &self,
        booking_id: &Uuid,
        actor: Actor,
        event: BookingEvent,
        effect: F,
    ) -> Result<Booking, AppError>
    where
        F: FnOnce(&Booking) -> Result<(), AppError>,
    {
        let mut booking = self
            .bookings
            .get_mut(booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        if booking.state.on(event).is_none() {
            return Err(AppError::InvalidState(format!(
                "booking {booking_id} is {}, cannot {}",
                booking.state.as_str(),
                event.name()
            )));
        }

        authorize(booking.value(), actor)?;
        effect(booking.value())?;
        let next = apply(booking.value_mut(), event)?;

        info!(
            booking_id = %booking_id,
            event = event.name(),
            state = next.as_str(),
            "booking transitioned"
        );

        Ok(booking.value().clone())
    }

    /// Ids of bookings that have waited in `Assigned` since before `cutoff`.
    pub fn assigned_before(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        self.bookings
            .iter()
            .filter(|entry| {
                let booking = entry.value();
                booking.state == BookingState::Assigned
                    && booking
                        .entered_at(BookingState::Assigned)
                        .is_some_and(|at| at < cutoff)
            })
            .map(|entry| *entry.key())
            .collect()
    }

    /// Drops terminal bookings last touched before `before`.
    pub fn archive_finished(&self, before: DateTime<Utc>) -> usize {
        let previous = self.bookings.len();
        self.bookings
            .retain(|_, booking| !(booking.state.is_terminal() && booking.updated_at() < before));
        previous.saturating_sub(self.bookings.len())
    }
}
