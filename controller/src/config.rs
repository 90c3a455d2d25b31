use anyhow::{ensure, Result};
use chrono::Duration;

/// Control-loop constants. Chosen at startup; never adjusted at runtime.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Half-width of the dead-band around the setpoint, degrees C.
    pub hysteresis_c: f64,
    /// Bench-sensor hard limit; reaching it trips a lockout.
    pub max_temp_c: f64,
    /// Ceiling-sensor hard limit.
    pub ceiling_limit_c: f64,
    /// Longest continuous heating run before the operator must step in.
    pub max_on_time: Duration,
    /// Grace period granted when `max_on_time` is hit.
    pub confirmation_timeout: Duration,
    /// Poll period of the control loop.
    pub control_interval: std::time::Duration,
    /// EMA weight given to a fresh heat-up rate sample.
    pub heatup_rate_alpha: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            hysteresis_c: 1.0,
            max_temp_c: 90.0,
            ceiling_limit_c: 93.3,
            max_on_time: Duration::hours(2),
            confirmation_timeout: Duration::seconds(90),
            control_interval: std::time::Duration::from_secs(2),
            heatup_rate_alpha: 0.3,
        }
    }
}

impl Tuning {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1.0..=2.5).contains(&self.hysteresis_c),
            "hysteresis {} C outside the supported 1.0..=2.5 range",
            self.hysteresis_c
        );
        ensure!(
            self.max_temp_c > 0.0 && self.max_temp_c < self.ceiling_limit_c,
            "bench limit {} C must be positive and below the ceiling limit {} C",
            self.max_temp_c,
            self.ceiling_limit_c
        );
        ensure!(
            self.max_on_time > Duration::zero(),
            "max on-time must be positive"
        );
        ensure!(
            self.confirmation_timeout > Duration::zero(),
            "confirmation timeout must be positive"
        );
        ensure!(
            !self.control_interval.is_zero(),
            "control interval must be positive"
        );
        ensure!(
            self.heatup_rate_alpha > 0.0 && self.heatup_rate_alpha <= 1.0,
            "EMA alpha {} outside (0, 1]",
            self.heatup_rate_alpha
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tuning_is_sane() {
        let tuning = Tuning::default();
        tuning.validate().unwrap();
        assert_eq!(tuning.max_temp_c, 90.0);
        assert_eq!(tuning.ceiling_limit_c, 93.3);
        assert_eq!(tuning.max_on_time, Duration::hours(2));
        assert_eq!(tuning.confirmation_timeout, Duration::seconds(90));
        assert_eq!(tuning.control_interval, std::time::Duration::from_secs(2));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut tuning = Tuning::default();
        tuning.hysteresis_c = 0.2;
        assert!(tuning.validate().is_err());

        let mut tuning = Tuning::default();
        tuning.max_temp_c = 95.0; // above the ceiling limit
        assert!(tuning.validate().is_err());

        let mut tuning = Tuning::default();
        tuning.heatup_rate_alpha = 0.0;
        assert!(tuning.validate().is_err());
    }
}
