use std::collections::HashMap;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::models::driver::DriverStatus;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bookings_total: IntCounterVec,
    pub booking_transitions_total: IntCounterVec,
    pub reservation_conflicts_total: IntCounter,
    pub match_latency_seconds: Histogram,
    pub drivers: IntGaugeVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_total = IntCounterVec::new(
            Opts::new("bookings_total", "Booking requests by dispatch outcome"),
            &["outcome"],
        )
        .expect("valid bookings_total metric");

        let booking_transitions_total = IntCounterVec::new(
            Opts::new(
                "booking_transitions_total",
                "Lifecycle transitions applied to bookings",
            ),
            &["transition"],
        )
        .expect("valid booking_transitions_total metric");

        let reservation_conflicts_total = IntCounter::new(
            "reservation_conflicts_total",
            "Driver reservations lost to a concurrent match",
        )
        .expect("valid reservation_conflicts_total metric");

        let match_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "match_latency_seconds",
            "Time spent finding and reserving a driver",
        ))
        .expect("valid match_latency_seconds metric");

        let drivers = IntGaugeVec::new(
            Opts::new("drivers", "Registered drivers by status"),
            &["status"],
        )
        .expect("valid drivers metric");

        registry
            .register(Box::new(bookings_total.clone()))
            .expect("register bookings_total");
        registry
            .register(Box::new(booking_transitions_total.clone()))
            .expect("register booking_transitions_total");
        registry
            .register(Box::new(reservation_conflicts_total.clone()))
            .expect("register reservation_conflicts_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(drivers.clone()))
            .expect("register drivers");

        Self {
            registry,
            bookings_total,
            booking_transitions_total,
            reservation_conflicts_total,
            match_latency_seconds,
            drivers,
        }
    }

    pub fn record_transition(&self, transition: &str) {
        self.booking_transitions_total
            .with_label_values(&[transition])
            .inc();
    }

    pub fn set_driver_counts(&self, counts: &HashMap<DriverStatus, usize>) {
        for status in DriverStatus::ALL {
            let count = counts.get(&status).copied().unwrap_or(0);
            self.drivers
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
