use chrono::{DateTime, Duration, Local};

/// Fold a fresh heat-up rate sample (degrees C per second) into the running
/// estimate. The first sample becomes the estimate unchanged.
pub fn merge_rate(previous: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match previous {
        Some(old) => alpha * sample + (1.0 - alpha) * old,
        None => sample,
    }
}

/// Rate observed over one approach to the setpoint. `None` unless both the
/// temperature delta and the elapsed time are positive.
pub fn rate_sample(start_c: f64, end_c: f64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.num_milliseconds() as f64 / 1000.0;
    let delta = end_c - start_c;
    if secs > 0.0 && delta > 0.0 {
        Some(delta / secs)
    } else {
        None
    }
}

/// Seconds of heating needed to close the gap to the setpoint at the
/// estimated rate. Zero when already at temperature or when no usable
/// estimate exists (the pre-heat then starts exactly at the target time).
pub fn required_heat_secs(desired_c: f64, bench_c: f64, rate_c_per_sec: Option<f64>) -> f64 {
    let gap = (desired_c - bench_c).max(0.0);
    match rate_c_per_sec {
        Some(rate) if rate > 0.0 => gap / rate,
        _ => 0.0,
    }
}

/// A scheduled pre-heat fires once the time left before the target no
/// longer covers the required heating time.
pub fn preheat_due(
    scheduled_start_at: DateTime<Local>,
    now: DateTime<Local>,
    required_secs: f64,
) -> bool {
    let until_target =
        scheduled_start_at.signed_duration_since(now).num_milliseconds() as f64 / 1000.0;
    until_target <= required_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn first_sample_becomes_the_estimate() {
        assert_eq!(merge_rate(None, 0.02, 0.3), 0.02);
    }

    #[test]
    fn merge_weights_new_sample_by_alpha() {
        let merged = merge_rate(Some(0.01), 0.02, 0.3);
        assert!((merged - 0.013).abs() < 1e-12);
    }

    #[test]
    fn rate_sample_requires_positive_delta_and_time() {
        assert_eq!(
            rate_sample(50.0, 70.0, Duration::seconds(2000)),
            Some(0.01)
        );
        assert_eq!(rate_sample(70.0, 70.0, Duration::seconds(2000)), None);
        assert_eq!(rate_sample(75.0, 70.0, Duration::seconds(2000)), None);
        assert_eq!(rate_sample(50.0, 70.0, Duration::zero()), None);
    }

    #[test]
    fn required_time_scales_with_gap() {
        assert_eq!(required_heat_secs(70.0, 50.0, Some(0.01)), 2000.0);
        assert_eq!(required_heat_secs(70.0, 70.0, Some(0.01)), 0.0);
        assert_eq!(required_heat_secs(70.0, 75.0, Some(0.01)), 0.0);
    }

    #[test]
    fn degenerate_rates_need_no_lead_time() {
        assert_eq!(required_heat_secs(70.0, 50.0, None), 0.0);
        assert_eq!(required_heat_secs(70.0, 50.0, Some(0.0)), 0.0);
        assert_eq!(required_heat_secs(70.0, 50.0, Some(-0.5)), 0.0);
    }

    #[test]
    fn fires_exactly_when_lead_time_is_consumed() {
        // 20 C gap at 0.01 C/s needs 2000 s of heating: a target 3600 s out
        // must fire at the 1600 s mark and not a poll before.
        let target = at(3600);
        let required = required_heat_secs(70.0, 50.0, Some(0.01));
        assert!(!preheat_due(target, at(1598), required));
        assert!(preheat_due(target, at(1600), required));
        assert!(preheat_due(target, at(1602), required));
    }

    #[test]
    fn past_target_is_always_due() {
        assert!(preheat_due(at(0), at(100), 0.0));
        assert!(preheat_due(at(0), at(0), 0.0));
    }
}
