use crate::engine::accounts::AccountDirectory;
use crate::engine::lifecycle::BookingStore;
use crate::engine::matcher::{MatchPolicy, Matcher};
use crate::engine::registry::DriverRegistry;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub accounts: AccountDirectory,
    pub drivers: DriverRegistry,
    pub bookings: BookingStore,
    pub matcher: Matcher,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(match_policy: MatchPolicy) -> Self {
        Self {
            accounts: AccountDirectory::new(),
            drivers: DriverRegistry::new(),
            bookings: BookingStore::new(),
            matcher: Matcher::new(match_policy),
            metrics: Metrics::new(),
        }
    }
}
