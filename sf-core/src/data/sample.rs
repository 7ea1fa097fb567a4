//! Per-tick telemetry snapshot
//!
//! A `TickSample` is everything the controller needs for one decision. It is
//! built by `hw::sampling` from the collaborators, or by hand in tests.

use crate::data::policy::Policy;
use crate::data::types::{AirflowDirection, MilliCelsius, Reading};

/// Outcome of sampling one temperature channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSample {
    Valid(MilliCelsius),
    /// The sensor answered with a value it marks as unusable
    Invalid,
    /// The read itself failed
    Failed,
}

impl From<Reading> for ChannelSample {
    fn from(reading: Reading) -> Self {
        match reading {
            Reading::Valid(t) => Self::Valid(t),
            Reading::Invalid => Self::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotorSample {
    pub running: bool,
    pub alarm: bool,
    pub speed: Option<u32>,
}

impl RotorSample {
    pub fn running() -> Self {
        Self {
            running: true,
            alarm: false,
            speed: None,
        }
    }

    pub fn stalled() -> Self {
        Self {
            running: false,
            alarm: false,
            speed: Some(0),
        }
    }

    pub fn is_stalled(&self) -> bool {
        !self.running || self.alarm
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanSample {
    pub present: bool,
    pub rotors: Vec<RotorSample>,
    pub airflow: AirflowDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsuSample {
    pub present: bool,
    /// Input and output both healthy
    pub io_ok: bool,
    pub airflow: AirflowDirection,
}

/// Everything sampled in one tick, indexed like the policy tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSample {
    pub channels: Vec<ChannelSample>,
    pub fans: Vec<FanSample>,
    pub psus: Vec<PsuSample>,
    pub board_airflow: AirflowDirection,
}

impl TickSample {
    /// Every unit present and healthy, every channel reading `temp`
    pub fn nominal(policy: &Policy, temp: MilliCelsius) -> Self {
        Self {
            channels: vec![ChannelSample::Valid(temp); policy.channels.len()],
            fans: policy
                .fans
                .iter()
                .map(|fan| FanSample {
                    present: true,
                    rotors: vec![RotorSample::running(); fan.rotors],
                    airflow: AirflowDirection::Unknown,
                })
                .collect(),
            psus: vec![
                PsuSample {
                    present: true,
                    io_ok: true,
                    airflow: AirflowDirection::Unknown,
                };
                policy.psus.len()
            ],
            board_airflow: AirflowDirection::Unknown,
        }
    }
}
