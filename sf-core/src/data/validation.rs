//! Policy validation
//!
//! Runs once after parsing. Every cross reference in the policy (channel
//! names, fan names, duty bounds) is checked here so the controller can index
//! its tables without further checks.
//!
//! # Rules
//!
//! - `min_pwm <= max_pwm`, and every configured duty lies inside that range
//!   (airflow and repair tables may also use 0 to park a unit)
//! - curves are non-empty, strictly ascending in temperature and never
//!   decreasing in duty
//! - repeat counts and stall/poll counts are non-zero
//! - unit and channel names are unique and every reference resolves

use std::collections::HashSet;
use std::path::Path;

use crate::constants::{limits, pwm};
use crate::data::policy::{CurvePoint, Policy, PwmPolicy};
use crate::error::{Result, SwitchfanError};

/// Validate a complete policy
pub fn validate_policy(policy: &Policy) -> Result<()> {
    let bounds = &policy.pwm;
    if bounds.min_pwm > bounds.max_pwm {
        return Err(SwitchfanError::invalid_policy(
            "pwm.min_pwm",
            format!(
                "{:#04x} is greater than max_pwm {:#04x}",
                bounds.min_pwm, bounds.max_pwm
            ),
        ));
    }
    validate_duty(bounds, "pwm.abnormal_duty", bounds.abnormal_duty, false)?;
    validate_duty(bounds, "pwm.warning_duty", bounds.warning_duty(), false)?;

    validate_counts(policy)?;
    validate_intervals(policy)?;

    let channels = unique_names(
        "channels",
        policy.channels.iter().map(|c| c.name.as_str()),
    )?;
    let fans = unique_names("fans", policy.fans.iter().map(|f| f.name.as_str()))?;
    let units = unique_names(
        "units",
        policy
            .fans
            .iter()
            .map(|f| f.name.as_str())
            .chain(policy.psus.iter().map(|p| p.name.as_str())),
    )?;

    for fan in &policy.fans {
        if fan.rotors == 0 {
            return Err(SwitchfanError::invalid_policy(
                format!("fans.{}.rotors", fan.name),
                "a fan needs at least one rotor",
            ));
        }
        if !fan.rotor_paths.is_empty() && fan.rotor_paths.len() != fan.rotors {
            return Err(SwitchfanError::invalid_policy(
                format!("fans.{}.rotor_paths", fan.name),
                format!("{} paths for {} rotors", fan.rotor_paths.len(), fan.rotors),
            ));
        }
    }

    if let Some(open_loop) = &policy.open_loop {
        require_channel(&channels, &open_loop.channel)?;
        validate_curve_points(bounds, "open_loop.points", &open_loop.points)?;
        if let Some(floor) = open_loop.floor_duty {
            validate_duty(bounds, "open_loop.floor_duty", floor, false)?;
        }
    }

    for hyst in &policy.hysteresis {
        require_channel(&channels, &hyst.channel)?;
        validate_curve_points(bounds, &format!("hysteresis.{}.points", hyst.channel), &hyst.points)?;
        if hyst.deadband.0 < 0 {
            return Err(SwitchfanError::invalid_policy(
                format!("hysteresis.{}.deadband", hyst.channel),
                "must not be negative",
            ));
        }
    }

    for pid in &policy.pid {
        require_channel(&channels, &pid.channel)?;
        if ![pid.kp, pid.ki, pid.kd].iter().all(|g| g.is_finite()) {
            return Err(SwitchfanError::invalid_policy(
                format!("pid.{}", pid.channel),
                "gains must be finite",
            ));
        }
        if let Some(duty) = pid.invalid_duty {
            validate_duty(bounds, &format!("pid.{}.invalid_duty", pid.channel), duty, false)?;
        }
    }

    if let Some(divergence) = &policy.divergence {
        require_channel(&channels, &divergence.primary)?;
        require_channel(&channels, &divergence.secondary)?;
        if divergence.delta.0 <= 0 {
            return Err(SwitchfanError::invalid_policy(
                "divergence.delta",
                "must be positive",
            ));
        }
    }

    let airflow = &policy.airflow;
    validate_duty(bounds, "airflow.correct_duty", airflow.correct_duty, true)?;
    validate_duty(bounds, "airflow.error_duty", airflow.error_duty, true)?;
    for (unit, duty) in &airflow.unit_duties {
        if !units.contains(unit.as_str()) {
            return Err(SwitchfanError::UnknownUnit(unit.clone()));
        }
        validate_duty(bounds, &format!("airflow.unit_duties.{}", unit), duty.correct, true)?;
        validate_duty(bounds, &format!("airflow.unit_duties.{}", unit), duty.error, true)?;
    }

    validate_duty(bounds, "plug_in.duty", policy.plug_in.duty, false)?;

    for (faulty, table) in &policy.repair.tables {
        if !fans.contains(faulty.as_str()) {
            return Err(SwitchfanError::UnknownUnit(faulty.clone()));
        }
        for (fan, duty) in table {
            if !fans.contains(fan.as_str()) {
                return Err(SwitchfanError::UnknownUnit(fan.clone()));
            }
            validate_duty(bounds, &format!("repair.tables.{}.{}", faulty, fan), *duty, true)?;
        }
    }

    let safety = &policy.safety;
    if let Some(switch) = &safety.switch_channel {
        require_channel(&channels, switch)?;
    }
    for name in &safety.emergency_group {
        require_channel(&channels, name)?;
    }
    if safety.reboot_command.is_empty() {
        return Err(SwitchfanError::invalid_policy(
            "safety.reboot_command",
            "must name a program",
        ));
    }

    Ok(())
}

/// Validate curve points against the duty bounds
pub fn validate_curve_points(bounds: &PwmPolicy, field: &str, points: &[CurvePoint]) -> Result<()> {
    if points.is_empty() {
        return Err(SwitchfanError::invalid_policy(field, "curve must have at least one point"));
    }

    if points.len() > limits::MAX_CURVE_POINTS {
        return Err(SwitchfanError::invalid_policy(
            field,
            format!("curve exceeds maximum of {} points", limits::MAX_CURVE_POINTS),
        ));
    }

    for point in points {
        validate_duty(bounds, field, point.duty, false)?;
    }

    for window in points.windows(2) {
        if window[0].temp >= window[1].temp {
            return Err(SwitchfanError::invalid_policy(
                field,
                "curve points must be sorted by strictly ascending temperature",
            ));
        }
        if window[0].duty > window[1].duty {
            return Err(SwitchfanError::invalid_policy(
                field,
                "curve duty must not decrease as temperature rises",
            ));
        }
    }

    Ok(())
}

/// Validate policy file size before reading it
pub fn validate_file_size(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| SwitchfanError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > limits::MAX_POLICY_SIZE {
        return Err(SwitchfanError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: limits::MAX_POLICY_SIZE,
        });
    }

    Ok(())
}

fn validate_duty(bounds: &PwmPolicy, field: &str, duty: u8, allow_parked: bool) -> Result<()> {
    if allow_parked && duty == pwm::PARKED {
        return Ok(());
    }
    if duty < bounds.min_pwm || duty > bounds.max_pwm {
        return Err(SwitchfanError::invalid_policy(
            field,
            format!(
                "duty {:#04x} outside [{:#04x}, {:#04x}]",
                duty, bounds.min_pwm, bounds.max_pwm
            ),
        ));
    }
    Ok(())
}

fn validate_counts(policy: &Policy) -> Result<()> {
    let counts = [
        ("thresholds.warning_repeat", policy.thresholds.warning_repeat),
        ("thresholds.critical_repeat", policy.thresholds.critical_repeat),
        ("thresholds.emergency_repeat", policy.thresholds.emergency_repeat),
        ("thresholds.read_fail_threshold", policy.thresholds.read_fail_threshold),
        ("abnormal.fan_absent_threshold", policy.abnormal.fan_absent_threshold),
        ("abnormal.psu_absent_threshold", policy.abnormal.psu_absent_threshold),
        ("abnormal.psu_fault_threshold", policy.abnormal.psu_fault_threshold),
        ("abnormal.rotor_stall_ticks", policy.abnormal.rotor_stall_ticks),
        ("safety.poll_count", policy.safety.poll_count),
    ];
    for (field, value) in counts {
        if value == 0 {
            return Err(SwitchfanError::invalid_policy(field, "must be at least 1"));
        }
    }
    Ok(())
}

fn validate_intervals(policy: &Policy) -> Result<()> {
    let max_ms = limits::MAX_INTERVAL_SECS * 1000;
    let intervals = [
        ("timing.tick_interval_secs", policy.timing.tick_interval_secs.saturating_mul(1000)),
        ("timing.presence_poll_ms", policy.timing.presence_poll_ms.unwrap_or(0)),
        ("safety.poll_interval_secs", policy.safety.poll_interval_secs.saturating_mul(1000)),
    ];
    for (field, ms) in intervals {
        if ms > max_ms {
            return Err(SwitchfanError::invalid_policy(
                field,
                format!("must not exceed {} seconds", limits::MAX_INTERVAL_SECS),
            ));
        }
    }
    Ok(())
}

fn unique_names<'a>(field: &str, names: impl Iterator<Item = &'a str>) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(SwitchfanError::invalid_policy(field, "name cannot be empty"));
        }
        if !seen.insert(name) {
            return Err(SwitchfanError::invalid_policy(
                field,
                format!("duplicate name '{}'", name),
            ));
        }
    }
    Ok(seen)
}

fn require_channel(channels: &HashSet<&str>, name: &str) -> Result<()> {
    if channels.contains(name) {
        Ok(())
    } else {
        Err(SwitchfanError::UnknownChannel(name.to_string()))
    }
}
