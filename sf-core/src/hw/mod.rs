//! Hardware collaborators
//!
//! The controller never touches hardware directly. These traits are the only
//! seams between the decision engine and the platform; the daemon implements
//! them over sysfs-style files and tests substitute mocks.
//!
//! Units and channels are addressed by their policy name.

pub mod control;
pub mod sampling;

use crate::data::types::{AirflowDirection, Reading};
use crate::error::Result;

pub use sampling::{sample_presence, sample_tick, Collaborators};

/// Temperature readings
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource {
    fn read_temperature(&self, channel: &str) -> Result<Reading>;
}

/// Fan presence and rotor state
#[cfg_attr(test, mockall::automock)]
pub trait FanInventory {
    fn fan_presence(&self, fan: &str) -> Result<bool>;

    fn rotor_running(&self, fan: &str, rotor: usize) -> Result<bool>;

    fn rotor_alarm(&self, _fan: &str, _rotor: usize) -> Result<bool> {
        Ok(false)
    }

    fn rotor_speed(&self, _fan: &str, _rotor: usize) -> Result<Option<u32>> {
        Ok(None)
    }
}

/// PSU presence and electrical health
#[cfg_attr(test, mockall::automock)]
pub trait PsuInventory {
    fn psu_presence(&self, psu: &str) -> Result<bool>;

    /// True when both input and output are healthy
    fn psu_io_status(&self, psu: &str) -> Result<bool>;
}

/// Declared airflow of the board and of each unit
#[cfg_attr(test, mockall::automock)]
pub trait AirflowSource {
    fn board_airflow(&self) -> Result<AirflowDirection>;

    fn unit_airflow(&self, unit: &str) -> Result<AirflowDirection>;
}

/// Duty output
#[cfg_attr(test, mockall::automock)]
pub trait Actuator {
    fn set_fan_duty(&self, fan: &str, duty: u8) -> Result<()>;

    fn set_psu_duty(&self, psu: &str, duty: u8) -> Result<()>;
}

/// Reboot requests
#[cfg_attr(test, mockall::automock)]
pub trait SystemControl {
    /// Persist the reboot-cause marker before rebooting
    fn persist_marker(&self, cause: &str) -> Result<()>;

    fn request_reboot(&self, cause: &str) -> Result<()>;
}
