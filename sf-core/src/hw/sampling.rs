//! Build a `TickSample` from the collaborators
//!
//! Every collaborator call degrades to a conservative value on error, so one
//! failing file never aborts a tick:
//!
//! | call              | fallback                 |
//! |-------------------|--------------------------|
//! | temperature       | `ChannelSample::Failed`  |
//! | fan/psu presence  | absent                   |
//! | rotor running     | not running              |
//! | rotor alarm/speed | no alarm / unknown speed |
//! | psu io status     | faulted                  |
//! | airflow           | `Unknown`                |

use tracing::debug;

use crate::data::policy::Policy;
use crate::data::sample::{ChannelSample, FanSample, PsuSample, RotorSample, TickSample};
use crate::data::types::AirflowDirection;
use crate::error::Result;
use crate::hw::{AirflowSource, FanInventory, PsuInventory, SensorSource};

/// The read-side collaborators used for sampling
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub sensors: &'a dyn SensorSource,
    pub fans: &'a dyn FanInventory,
    pub psus: &'a dyn PsuInventory,
    pub airflow: &'a dyn AirflowSource,
}

fn or_fallback<T>(result: Result<T>, fallback: T, what: &str, unit: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!("{} for {} unavailable, using fallback: {}", what, unit, e);
            fallback
        }
    }
}

/// Sample every channel and unit named in the policy
pub fn sample_tick(policy: &Policy, hw: Collaborators<'_>) -> TickSample {
    let channels = policy
        .channels
        .iter()
        .map(|channel| match hw.sensors.read_temperature(&channel.name) {
            Ok(reading) => ChannelSample::from(reading),
            Err(e) => {
                debug!("Temperature read failed for {}: {}", channel.name, e);
                ChannelSample::Failed
            }
        })
        .collect();

    let fans = policy
        .fans
        .iter()
        .map(|fan| {
            let name = fan.name.as_str();
            let present = or_fallback(hw.fans.fan_presence(name), false, "presence", name);
            let rotors = (0..fan.rotors)
                .map(|rotor| RotorSample {
                    running: or_fallback(hw.fans.rotor_running(name, rotor), false, "rotor state", name),
                    alarm: or_fallback(hw.fans.rotor_alarm(name, rotor), false, "rotor alarm", name),
                    speed: or_fallback(hw.fans.rotor_speed(name, rotor), None, "rotor speed", name),
                })
                .collect();
            let airflow = or_fallback(
                hw.airflow.unit_airflow(name),
                AirflowDirection::Unknown,
                "airflow",
                name,
            );
            FanSample {
                present,
                rotors,
                airflow,
            }
        })
        .collect();

    let psus = policy
        .psus
        .iter()
        .map(|psu| {
            let name = psu.name.as_str();
            PsuSample {
                present: or_fallback(hw.psus.psu_presence(name), false, "presence", name),
                io_ok: or_fallback(hw.psus.psu_io_status(name), false, "io status", name),
                airflow: or_fallback(
                    hw.airflow.unit_airflow(name),
                    AirflowDirection::Unknown,
                    "airflow",
                    name,
                ),
            }
        })
        .collect();

    let board_airflow = or_fallback(
        hw.airflow.board_airflow(),
        AirflowDirection::Unknown,
        "airflow",
        "board",
    );

    TickSample {
        channels,
        fans,
        psus,
        board_airflow,
    }
}

/// Presence-only sample for the sub-tick
pub fn sample_presence(
    policy: &Policy,
    fans: &dyn FanInventory,
    psus: &dyn PsuInventory,
) -> (Vec<bool>, Vec<bool>) {
    let fan_presence = policy
        .fans
        .iter()
        .map(|f| or_fallback(fans.fan_presence(&f.name), false, "presence", &f.name))
        .collect();
    let psu_presence = policy
        .psus
        .iter()
        .map(|p| or_fallback(psus.psu_presence(&p.name), false, "presence", &p.name))
        .collect();
    (fan_presence, psu_presence)
}
