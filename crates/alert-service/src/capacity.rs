//! Venue capacity from floor area and crowd densities

use crate::config::CrowdConfig;
use crate::types::CapacityEstimate;

/// Estimate safe and maximum capacity for a venue.
///
/// A missing, non-positive or non-finite `area` falls back to
/// `config.default_area_sqm`; the returned estimate carries the area that was
/// actually used. Capacities are rounded down to whole people.
pub fn estimate_capacity(config: &CrowdConfig, area: Option<f64>) -> CapacityEstimate {
    let area = match area {
        Some(a) if a.is_finite() && a > 0.0 => a,
        _ => config.default_area_sqm,
    };

    CapacityEstimate {
        area,
        safe_capacity: people_at(area, config.safe_density),
        max_capacity: people_at(area, config.max_density),
    }
}

fn people_at(area: f64, density: f64) -> u64 {
    // Float to int casts saturate, so huge areas clamp at u64::MAX
    (area * density).floor() as u64
}
