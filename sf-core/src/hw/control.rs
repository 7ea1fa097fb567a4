//! File-backed sensor and PWM primitives
//!
//! Low-level read/write operations over sysfs-style attribute files. Each
//! helper maps I/O failures to a typed error naming the unit.
//!
//! # Temperature Values
//!
//! Temperature files hold millidegrees Celsius (e.g., 45000 = 45.0°C). A file
//! that reads fine but does not hold an integer is the sensor reporting an
//! invalid value, not a read failure.
//!
//! # Presence and Status Values
//!
//! `1` means present/healthy, `0` means absent/faulted.

use std::fs;
use std::path::Path;

use crate::data::types::{MilliCelsius, Reading};
use crate::error::{Result, SwitchfanError};

/// Read a temperature attribute
pub fn read_temperature(channel: &str, temp_path: &Path) -> Result<Reading> {
    let content = fs::read_to_string(temp_path)
        .map_err(|e| SwitchfanError::sensor(channel, format!("{}: {}", temp_path.display(), e)))?;

    Ok(match content.trim().parse::<i32>() {
        Ok(millidegrees) => Reading::Valid(MilliCelsius(millidegrees)),
        Err(_) => Reading::Invalid,
    })
}

/// Read a `0`/`1` attribute
pub fn read_flag(unit: &str, what: &'static str, path: &Path) -> Result<bool> {
    let content = fs::read_to_string(path)
        .map_err(|e| SwitchfanError::inventory(unit, what, format!("{}: {}", path.display(), e)))?;

    match content.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => other
            .parse::<i64>()
            .map(|v| v != 0)
            .map_err(|_| SwitchfanError::inventory(unit, what, format!("unexpected value '{}'", other))),
    }
}

/// Read a presence attribute; a missing file means the unit is absent
pub fn read_presence(unit: &str, path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    read_flag(unit, "presence", path)
}

/// Read a speed attribute in RPM
pub fn read_speed(unit: &str, path: &Path) -> Result<u32> {
    let content = fs::read_to_string(path)
        .map_err(|e| SwitchfanError::inventory(unit, "rotor speed", format!("{}: {}", path.display(), e)))?;

    content
        .trim()
        .parse::<u32>()
        .map_err(|e| SwitchfanError::inventory(unit, "rotor speed", format!("failed to parse '{}': {}", content.trim(), e)))
}

/// Read a free-form text attribute such as a part number
pub fn read_text(unit: &str, what: &'static str, path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| SwitchfanError::inventory(unit, what, format!("{}: {}", path.display(), e)))
}

/// Write a duty value (0-255)
pub fn write_duty(unit: &str, pwm_path: &Path, duty: u8) -> Result<()> {
    fs::write(pwm_path, duty.to_string())
        .map_err(|e| SwitchfanError::pwm_write(unit, duty, format!("{}: {}", pwm_path.display(), e)))
}
