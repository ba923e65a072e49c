use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::engine::dispatch::{archive_finished, expire_unaccepted};
use crate::state::AppState;

#[derive(Debug, Clone, Copy)]
pub struct SweeperSettings {
    pub interval: Duration,
    pub accept_timeout: Option<Duration>,
    pub retention: Option<Duration>,
}

impl SweeperSettings {
    pub fn is_enabled(&self) -> bool {
        self.accept_timeout.is_some() || self.retention.is_some()
    }
}

pub async fn run_sweeper(state: Arc<AppState>, settings: SweeperSettings) {
    info!(
        interval_secs = settings.interval.as_secs(),
        accept_timeout_secs = settings.accept_timeout.map(|d| d.as_secs()),
        retention_secs = settings.retention.map(|d| d.as_secs()),
        "booking sweeper started"
    );

    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep_once(&state, &settings);
    }
}

pub fn sweep_once(state: &AppState, settings: &SweeperSettings) {
    let now = Utc::now();

    if let Some(timeout) = settings.accept_timeout {
        match expire_unaccepted(state, timeout, now) {
            Ok(0) => {}
            Ok(expired) => info!(expired, "expired unaccepted bookings"),
            Err(err) => error!(error = %err, "failed to expire bookings"),
        }
    }

    if let Some(retention) = settings.retention {
        match archive_finished(state, retention, now) {
            Ok(0) => {}
            Ok(archived) => info!(archived, "archived finished bookings"),
            Err(err) => error!(error = %err, "failed to archive bookings"),
        }
    }
}
