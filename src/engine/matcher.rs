use std::fmt;
use std::str::FromStr;

use tracing::debug;
use uuid::Uuid;

use crate::engine::ranking::rank_candidates;
use crate::engine::registry::DriverRegistry;
use crate::error::AppError;
use crate::models::driver::GeoPoint;

/// How candidates are ordered before reservation is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    FirstAvailable,
    Nearest,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "first_available" | "first" => Ok(MatchPolicy::FirstAvailable),
            "nearest" => Ok(MatchPolicy::Nearest),
            other => Err(format!(
                "unknown match policy: {other}, expected nearest/first_available"
            )),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::FirstAvailable => f.write_str("first_available"),
            MatchPolicy::Nearest => f.write_str("nearest"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub driver_id: Uuid,
    /// Reservations lost to concurrent matches before this one succeeded.
    pub conflicts: usize,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    policy: MatchPolicy,
}

impl Matcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Reserves one driver for `pickup`.
    ///
    /// Each candidate in the snapshot is tried at most once, so the number of
    /// reservation attempts is bounded by the snapshot size. Lost races are
    /// absorbed here; callers only ever see `NoDriversAvailable`.
    pub fn reserve_driver(
        &self,
        registry: &DriverRegistry,
        pickup: &GeoPoint,
    ) -> Result<MatchOutcome, AppError> {
        let candidates = registry.find_available();
        if candidates.is_empty() {
            return Err(AppError::NoDriversAvailable);
        }

        let mut conflicts = 0;
        for candidate in rank_candidates(self.policy, candidates, pickup) {
            match registry.try_reserve(&candidate.driver_id) {
                Ok(()) => {
                    return Ok(MatchOutcome {
                        driver_id: candidate.driver_id,
                        conflicts,
                    });
                }
                Err(AppError::Conflict(reason)) => {
                    debug!(driver_id = %candidate.driver_id, reason = %reason, "reservation lost");
                    conflicts += 1;
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::NoDriversAvailable)
    }
}
