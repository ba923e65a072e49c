use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingState {
    Requested,
    Searching,
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Unmatched,
    Rejected,
    Cancelled,
    Expired,
}

/// Inputs that drive a booking through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    BeginSearch,
    DriverFound(Uuid),
    NoDriverFound,
    Accept,
    Start,
    End,
    Reject,
    Cancel,
    Expire,
}

impl BookingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::BeginSearch => "begin_search",
            BookingEvent::DriverFound(_) => "driver_found",
            BookingEvent::NoDriverFound => "no_driver_found",
            BookingEvent::Accept => "accept",
            BookingEvent::Start => "start",
            BookingEvent::End => "end",
            BookingEvent::Reject => "reject",
            BookingEvent::Cancel => "cancel",
            BookingEvent::Expire => "expire",
        }
    }
}

impl BookingState {
    /// Target state for `event`, or `None` when the event is not valid here.
    pub fn on(self, event: BookingEvent) -> Option<BookingState> {
        use BookingEvent as E;
        use BookingState as S;

        match (self, event) {
            (S::Requested, E::BeginSearch) => Some(S::Searching),
            (S::Searching, E::DriverFound(_)) => Some(S::Assigned),
            (S::Searching, E::NoDriverFound) => Some(S::Unmatched),
            (S::Assigned, E::Accept) => Some(S::Accepted),
            (S::Assigned, E::Reject) => Some(S::Rejected),
            (S::Assigned, E::Expire) => Some(S::Expired),
            (S::Assigned | S::Accepted, E::Cancel) => Some(S::Cancelled),
            (S::Accepted, E::Start) => Some(S::InProgress),
            (S::InProgress, E::End) => Some(S::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingState::Completed
                | BookingState::Unmatched
                | BookingState::Rejected
                | BookingState::Cancelled
                | BookingState::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingState::Requested => "requested",
            BookingState::Searching => "searching",
            BookingState::Assigned => "assigned",
            BookingState::Accepted => "accepted",
            BookingState::InProgress => "in_progress",
            BookingState::Completed => "completed",
            BookingState::Unmatched => "unmatched",
            BookingState::Rejected => "rejected",
            BookingState::Cancelled => "cancelled",
            BookingState::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub state: BookingState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub pickup: GeoPoint,
    pub driver_id: Option<Uuid>,
    pub state: BookingState,
    pub created_at: DateTime<Utc>,
    pub history: Vec<StateChange>,
}

impl Booking {
    pub fn new(rider_id: Uuid, pickup: GeoPoint) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            rider_id,
            pickup,
            driver_id: None,
            state: BookingState::Requested,
            created_at: now,
            history: vec![StateChange {
                state: BookingState::Requested,
                at: now,
            }],
        }
    }

    /// Time of the most recent transition.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.history
            .last()
            .map(|change| change.at)
            .unwrap_or(self.created_at)
    }

    pub fn entered_at(&self, state: BookingState) -> Option<DateTime<Utc>> {
        self.history
            .iter()
            .rev()
            .find(|change| change.state == state)
            .map(|change| change.at)
    }
}
