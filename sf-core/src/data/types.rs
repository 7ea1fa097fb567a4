//! Core data types for switchfan
//!
//! Primitive values shared by the policy, the controller and the collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::temperature::MILLIDEGREE_DIVISOR;

/// Temperature in millidegrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct MilliCelsius(pub i32);

impl MilliCelsius {
    pub fn from_celsius(c: f64) -> Self {
        Self((c * MILLIDEGREE_DIVISOR).round() as i32)
    }

    pub fn as_celsius(self) -> f64 {
        self.0 as f64 / MILLIDEGREE_DIVISOR
    }

    pub fn saturating_add(self, other: MilliCelsius) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn abs_diff(self, other: MilliCelsius) -> u32 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for MilliCelsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.as_celsius())
    }
}

/// A successful answer from a temperature sensor
///
/// Transport failures are reported through `Err`, not through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Valid(MilliCelsius),
    /// The sensor answered but flagged its own value as unusable
    Invalid,
}

/// Physical direction of cooling air through the chassis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AirflowDirection {
    /// Front to back (port side intake)
    F2B,
    /// Back to front (port side exhaust)
    B2F,
    #[default]
    Unknown,
}

impl AirflowDirection {
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl FromStr for AirflowDirection {
    type Err = std::convert::Infallible;

    /// Never fails: anything unrecognised maps to `Unknown`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "f2b" | "intake" | "front-to-back" | "front_to_back" => Self::F2B,
            "b2f" | "exhaust" | "back-to-front" | "back_to_front" => Self::B2F,
            _ => Self::Unknown,
        })
    }
}

impl fmt::Display for AirflowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::F2B => "F2B",
            Self::B2F => "B2F",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Threshold severities tracked per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Warning,
    Critical,
    Emergency,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Warning, Severity::Critical, Severity::Emergency];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

/// Index of a fan unit inside the controller's fan table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FanId(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millicelsius_conversion() {
        assert_eq!(MilliCelsius::from_celsius(73.0), MilliCelsius(73000));
        assert_eq!(MilliCelsius(-5500).as_celsius(), -5.5);
        assert_eq!(MilliCelsius(74000).abs_diff(MilliCelsius(70000)), 4000);
        assert_eq!(MilliCelsius(45000).to_string(), "45.0°C");
    }

    #[test]
    fn test_airflow_parse() {
        assert_eq!("F2B".parse::<AirflowDirection>().unwrap(), AirflowDirection::F2B);
        assert_eq!(" exhaust\n".parse::<AirflowDirection>().unwrap(), AirflowDirection::B2F);
        assert_eq!("sideways".parse::<AirflowDirection>().unwrap(), AirflowDirection::Unknown);
        assert!(!AirflowDirection::Unknown.is_known());
    }
}
