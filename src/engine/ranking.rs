use std::cmp::Ordering;

use crate::engine::matcher::MatchPolicy;
use crate::engine::registry::Candidate;
use crate::geo::haversine_km;
use crate::models::driver::GeoPoint;

/// Orders candidates in the sequence the matcher should try to reserve them.
pub fn rank_candidates(
    policy: MatchPolicy,
    mut candidates: Vec<Candidate>,
    pickup: &GeoPoint,
) -> Vec<Candidate> {
    match policy {
        MatchPolicy::FirstAvailable => candidates,
        MatchPolicy::Nearest => {
            candidates.sort_by(|a, b| {
                compare_distance(pickup_distance(a, pickup), pickup_distance(b, pickup))
            });
            candidates
        }
    }
}

pub fn pickup_distance(candidate: &Candidate, pickup: &GeoPoint) -> Option<f64> {
    candidate
        .position
        .as_ref()
        .map(|position| haversine_km(position, pickup))
}

// Drivers without a known position go last.
fn compare_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
