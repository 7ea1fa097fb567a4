//! Incremental PID strategy
//!
//! Velocity form: each tick computes a duty *change* and adds it to the
//! controller's last emitted duty, so switching between strategies never
//! causes a jump.
//!
//! ```text
//! duty = last_duty + kp*(e0 - e1) + ki*e0 + kd*(e0 - 2*e1 + e2)
//! ```
//!
//! `e = temp - target` in °C, `e0` is the current error and `e1`/`e2` the
//! previous two. A tick without a usable sample leaves an empty slot in the
//! history and returns the configured invalid duty.

use crate::data::policy::{PidConfig, PwmPolicy};
use crate::data::types::MilliCelsius;

#[derive(Debug, Clone)]
pub struct Pid {
    channel: usize,
    kp: f64,
    ki: f64,
    kd: f64,
    target: MilliCelsius,
    invalid_duty: u8,
    /// Errors of the last two ticks, newest first
    history: [Option<f64>; 2],
}

impl Pid {
    /// `fallback` is the invalid duty used when the policy leaves it unset
    pub fn new(config: &PidConfig, channel: usize, fallback: u8) -> Self {
        Self {
            channel,
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            target: config.target,
            invalid_duty: config.invalid_duty.unwrap_or(fallback),
            history: [None, None],
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn update(&mut self, sample: Option<MilliCelsius>, last_duty: u8, bounds: &PwmPolicy) -> u8 {
        let Some(temp) = sample else {
            self.history = [None, self.history[0]];
            return self.invalid_duty;
        };

        let e0 = temp.as_celsius() - self.target.as_celsius();
        // Gaps in the history take the current error, so re-entry has no derivative kick
        let e1 = self.history[0].unwrap_or(e0);
        let e2 = self.history[1].unwrap_or(e1);
        self.history = [Some(e0), self.history[0]];

        let delta = self.kp * (e0 - e1) + self.ki * e0 + self.kd * (e0 - 2.0 * e1 + e2);
        let duty = (f64::from(last_duty) + delta).round();

        duty.clamp(f64::from(bounds.min_pwm), f64::from(bounds.max_pwm)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(kp: f64, ki: f64, kd: f64) -> Pid {
        let config = PidConfig {
            channel: "CPU".to_string(),
            enabled: true,
            kp,
            ki,
            kd,
            target: MilliCelsius(60000),
            invalid_duty: Some(0xe0),
        };
        Pid::new(&config, 0, 0xff)
    }

    fn at(c: f64) -> Option<MilliCelsius> {
        Some(MilliCelsius::from_celsius(c))
    }

    #[test]
    fn test_integral_drives_towards_target() {
        let bounds = PwmPolicy::default();
        let mut pid = pid(0.0, 2.0, 0.0);
        // 5°C above target: +10 per tick
        assert_eq!(pid.update(at(65.0), 0xa0, &bounds), 0xaa);
        // 5°C below target: -10 per tick
        assert_eq!(pid.update(at(55.0), 0xa0, &bounds), 0x96);
    }

    #[test]
    fn test_proportional_acts_on_change() {
        let bounds = PwmPolicy::default();
        let mut pid = pid(4.0, 0.0, 0.0);
        // First sample: no history, no proportional step
        assert_eq!(pid.update(at(62.0), 0xa0, &bounds), 0xa0);
        assert_eq!(pid.update(at(64.0), 0xa0, &bounds), 0xa8);
    }

    #[test]
    fn test_output_clamped() {
        let bounds = PwmPolicy::default();
        let mut pid = pid(0.0, 50.0, 0.0);
        assert_eq!(pid.update(at(90.0), 0xf0, &bounds), 0xff);
        assert_eq!(pid.update(at(20.0), 0x90, &bounds), 0x80);
    }

    #[test]
    fn test_missing_sample_returns_invalid_duty() {
        let bounds = PwmPolicy::default();
        let mut pid = pid(4.0, 0.0, 1.0);
        pid.update(at(62.0), 0xa0, &bounds);
        assert_eq!(pid.update(None, 0xa0, &bounds), 0xe0);
        assert_eq!(pid.history, [None, Some(2.0)]);

        // Gap is filled with the current error, so the history reads flat
        let duty = pid.update(at(62.0), 0xa0, &bounds);
        assert_eq!(duty, 0xa0);
    }
}
