use crate::types::{AlertResult, AlertStatus, CapacityEstimate};

/// One rung of the alert ladder
struct Tier {
    status: AlertStatus,
    reached: fn(count: u64, safe_capacity: u64, max_capacity: u64) -> bool,
}

/// Tiers in evaluation order; the first one reached wins
const LADDER: [Tier; 3] = [
    Tier {
        status: AlertStatus::Critical,
        reached: |count, _, max| count >= max,
    },
    Tier {
        status: AlertStatus::Warning,
        reached: |count, safe, _| count >= safe,
    },
    Tier {
        status: AlertStatus::Safe,
        reached: |_, _, _| true,
    },
];

/// Classify a people count against safe and maximum capacity.
///
/// The thresholds are not checked against each other: with `safe > max`
/// the maximum still decides CRITICAL first. A zero maximum makes every
/// count CRITICAL with a reported occupancy of 0%.
pub fn evaluate_alert(current_count: u64, safe_capacity: u64, max_capacity: u64) -> AlertResult {
    let status = LADDER
        .iter()
        .find(|tier| (tier.reached)(current_count, safe_capacity, max_capacity))
        .map_or(AlertStatus::Safe, |tier| tier.status);

    AlertResult::new(status, occupancy_percentage(current_count, max_capacity))
}

/// Evaluate against a stored capacity estimate
pub fn evaluate_against(current_count: u64, capacity: &CapacityEstimate) -> AlertResult {
    evaluate_alert(current_count, capacity.safe_capacity, capacity.max_capacity)
}

/// Occupancy as a percentage of max capacity, 0 when the maximum is 0
pub fn occupancy_percentage(current_count: u64, max_capacity: u64) -> f64 {
    if max_capacity == 0 {
        return 0.0;
    }
    (current_count as f64 / max_capacity as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_safe_below_safe_capacity() {
        let result = evaluate_alert(100, 200, 335);
        assert_eq!(result.status, AlertStatus::Safe);
        assert!(approx(result.percentage, 29.85), "{}", result.percentage);
        assert_eq!(result.message, "Normal Operations");
        assert_eq!(
            result.recommendations,
            vec!["Continue monitoring", "Maintain regular checks"]
        );
    }

    #[test]
    fn test_warning_between_thresholds() {
        let result = evaluate_alert(250, 200, 335);
        assert_eq!(result.status, AlertStatus::Warning);
        assert!(approx(result.percentage, 74.63), "{}", result.percentage);
        assert_eq!(result.message, "Approaching Capacity");
        assert_eq!(result.recommendations[0], "Reduce entry rate");
    }

    #[test]
    fn test_warning_at_safe_capacity() {
        assert_eq!(evaluate_alert(200, 200, 335).status, AlertStatus::Warning);
        assert_eq!(evaluate_alert(199, 200, 335).status, AlertStatus::Safe);
    }

    #[test]
    fn test_critical_at_max_capacity() {
        let result = evaluate_alert(335, 200, 335);
        assert_eq!(result.status, AlertStatus::Critical);
        assert_eq!(result.percentage, 100.0);
        assert_eq!(result.message, "Overcrowding Detected");
        assert_eq!(result.recommendations.len(), 5);
    }

    #[test]
    fn test_critical_above_max_exceeds_hundred_percent() {
        let result = evaluate_alert(400, 200, 335);
        assert_eq!(result.status, AlertStatus::Critical);
        assert!(approx(result.percentage, 119.40), "{}", result.percentage);
    }

    #[test]
    fn test_zero_capacity_is_critical() {
        let result = evaluate_alert(0, 0, 0);
        assert_eq!(result.status, AlertStatus::Critical);
        assert_eq!(result.percentage, 0.0);

        let result = evaluate_alert(5, 0, 0);
        assert_eq!(result.status, AlertStatus::Critical);
        assert_eq!(result.percentage, 0.0);
    }

    #[test]
    fn test_inverted_thresholds_follow_ladder() {
        // safe > max: the max check runs first
        assert_eq!(evaluate_alert(250, 300, 200).status, AlertStatus::Critical);
        assert_eq!(evaluate_alert(150, 300, 200).status, AlertStatus::Safe);
    }

    #[test]
    fn test_idempotent() {
        for count in [0, 1, 199, 200, 334, 335, 1000] {
            assert_eq!(evaluate_alert(count, 200, 335), evaluate_alert(count, 200, 335));
        }
    }

    #[test]
    fn test_monotonic_in_count() {
        let mut previous = evaluate_alert(0, 200, 335);
        for count in 1..=500 {
            let current = evaluate_alert(count, 200, 335);
            assert!(current.percentage >= previous.percentage);
            assert!(current.status >= previous.status, "count {}", count);
            previous = current;
        }
    }

    #[test]
    fn test_no_hysteresis() {
        // Oscillating around the threshold flips status every time
        let statuses: Vec<_> = [199, 200, 199, 200]
            .iter()
            .map(|&c| evaluate_alert(c, 200, 335).status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                AlertStatus::Safe,
                AlertStatus::Warning,
                AlertStatus::Safe,
                AlertStatus::Warning
            ]
        );
    }

    #[test]
    fn test_evaluate_against_estimate() {
        let capacity = CapacityEstimate {
            area: 500.0,
            safe_capacity: 200,
            max_capacity: 335,
        };
        assert_eq!(evaluate_against(250, &capacity), evaluate_alert(250, 200, 335));
    }
}
