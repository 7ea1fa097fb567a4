//! Sysfs-backed chassis platform
//!
//! Implements every collaborator trait from `sf_core::hw` over the attribute
//! files named in the policy. Units are looked up by name; a unit or channel
//! the policy does not know is an error, as is a path the policy leaves out.
//!
//! In dry-run mode reads still hit the files but PWM writes, the reboot
//! marker and the reboot command are only logged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, error, info, warn};

use sf_core::hw::control;
use sf_core::{
    write_marker, Actuator, AirflowDirection, AirflowSource, FanInventory, Policy, PsuInventory,
    Reading, SensorSource, SystemControl,
};
use sf_error::{Result, SwitchfanError};

#[derive(Debug, Clone, Default)]
struct FanPaths {
    presence: Option<PathBuf>,
    rotors: Vec<PathBuf>,
    pwm: Option<PathBuf>,
    part_number: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
struct PsuPaths {
    presence: Option<PathBuf>,
    status: Option<PathBuf>,
    pwm: Option<PathBuf>,
    part_number: Option<PathBuf>,
}

/// File-backed implementation of the hardware collaborators
#[derive(Debug, Clone)]
pub struct SysfsPlatform {
    channels: HashMap<String, Option<PathBuf>>,
    fans: HashMap<String, FanPaths>,
    psus: HashMap<String, PsuPaths>,
    board_airflow_path: Option<PathBuf>,
    part_numbers: HashMap<String, AirflowDirection>,
    marker_path: PathBuf,
    reboot_command: Vec<String>,
    dry_run: bool,
}

impl SysfsPlatform {
    pub fn new(policy: &Policy, dry_run: bool) -> Self {
        let channels = policy
            .channels
            .iter()
            .map(|c| (c.name.clone(), c.input_path.clone()))
            .collect();

        let fans = policy
            .fans
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    FanPaths {
                        presence: f.presence_path.clone(),
                        rotors: f.rotor_paths.clone(),
                        pwm: f.pwm_path.clone(),
                        part_number: f.part_number_path.clone(),
                    },
                )
            })
            .collect();

        let psus = policy
            .psus
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    PsuPaths {
                        presence: p.presence_path.clone(),
                        status: p.status_path.clone(),
                        pwm: p.pwm_path.clone(),
                        part_number: p.part_number_path.clone(),
                    },
                )
            })
            .collect();

        Self {
            channels,
            fans,
            psus,
            board_airflow_path: policy.airflow.board_airflow_path.clone(),
            part_numbers: policy.airflow.part_numbers.clone(),
            marker_path: policy.safety.marker_path.clone(),
            reboot_command: policy.safety.reboot_command.clone(),
            dry_run,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn fan(&self, name: &str) -> Result<&FanPaths> {
        self.fans
            .get(name)
            .ok_or_else(|| SwitchfanError::UnknownUnit(name.to_string()))
    }

    fn rotor(&self, fan: &str, rotor: usize, what: &'static str) -> Result<&Path> {
        self.fan(fan)?
            .rotors
            .get(rotor)
            .map(PathBuf::as_path)
            .ok_or_else(|| missing(fan, what))
    }

    fn psu(&self, name: &str) -> Result<&PsuPaths> {
        self.psus
            .get(name)
            .ok_or_else(|| SwitchfanError::UnknownUnit(name.to_string()))
    }

    /// Map a part number (or a literal `F2B`/`B2F`) to a direction
    fn airflow_from_text(&self, unit: &str, text: &str) -> AirflowDirection {
        if let Some(direction) = self.part_numbers.get(text) {
            return *direction;
        }
        let direction: AirflowDirection = text.parse().unwrap_or_default();
        if direction == AirflowDirection::Unknown {
            debug!("No airflow mapping for {} part number '{}'", unit, text);
        }
        direction
    }

    fn write(&self, unit: &str, path: Option<&Path>, duty: u8) -> Result<()> {
        let path = path.ok_or_else(|| {
            SwitchfanError::pwm_write(unit, duty, "no pwm_path configured")
        })?;
        if self.dry_run {
            debug!("DRY-RUN: {} <- {:#04x} ({})", unit, duty, path.display());
            return Ok(());
        }
        control::write_duty(unit, path, duty)
    }
}

fn missing(unit: &str, what: &'static str) -> SwitchfanError {
    SwitchfanError::inventory(unit, what, "no path configured")
}

impl SensorSource for SysfsPlatform {
    fn read_temperature(&self, channel: &str) -> Result<Reading> {
        let path = self
            .channels
            .get(channel)
            .ok_or_else(|| SwitchfanError::UnknownChannel(channel.to_string()))?
            .as_deref()
            .ok_or_else(|| SwitchfanError::sensor(channel, "no input_path configured"))?;
        control::read_temperature(channel, path)
    }
}

impl FanInventory for SysfsPlatform {
    fn fan_presence(&self, fan: &str) -> Result<bool> {
        let path = self.fan(fan)?.presence.as_deref().ok_or_else(|| missing(fan, "presence"))?;
        control::read_presence(fan, path)
    }

    /// Any non-zero value in the rotor file counts as running
    fn rotor_running(&self, fan: &str, rotor: usize) -> Result<bool> {
        let path = self.rotor(fan, rotor, "rotor state")?;
        control::read_flag(fan, "rotor state", path)
    }

    /// The rotor file read as RPM; a 0/1 state file yields 0 or 1
    fn rotor_speed(&self, fan: &str, rotor: usize) -> Result<Option<u32>> {
        let path = self.rotor(fan, rotor, "rotor speed")?;
        control::read_speed(fan, path).map(Some)
    }
}

impl PsuInventory for SysfsPlatform {
    fn psu_presence(&self, psu: &str) -> Result<bool> {
        let path = self.psu(psu)?.presence.as_deref().ok_or_else(|| missing(psu, "presence"))?;
        control::read_presence(psu, path)
    }

    fn psu_io_status(&self, psu: &str) -> Result<bool> {
        let path = self.psu(psu)?.status.as_deref().ok_or_else(|| missing(psu, "io status"))?;
        control::read_flag(psu, "io status", path)
    }
}

impl AirflowSource for SysfsPlatform {
    fn board_airflow(&self) -> Result<AirflowDirection> {
        let path = self
            .board_airflow_path
            .as_deref()
            .ok_or_else(|| missing("board", "airflow"))?;
        let text = control::read_text("board", "airflow", path)?;
        Ok(self.airflow_from_text("board", &text))
    }

    fn unit_airflow(&self, unit: &str) -> Result<AirflowDirection> {
        let path = match (self.fans.get(unit), self.psus.get(unit)) {
            (Some(fan), _) => fan.part_number.as_deref(),
            (None, Some(psu)) => psu.part_number.as_deref(),
            (None, None) => return Err(SwitchfanError::UnknownUnit(unit.to_string())),
        }
        .ok_or_else(|| missing(unit, "part number"))?;

        let text = control::read_text(unit, "part number", path)?;
        Ok(self.airflow_from_text(unit, &text))
    }
}

impl Actuator for SysfsPlatform {
    fn set_fan_duty(&self, fan: &str, duty: u8) -> Result<()> {
        let path = self.fan(fan)?.pwm.as_deref();
        self.write(fan, path, duty)
    }

    fn set_psu_duty(&self, psu: &str, duty: u8) -> Result<()> {
        let path = self.psu(psu)?.pwm.as_deref();
        self.write(psu, path, duty)
    }
}

impl SystemControl for SysfsPlatform {
    fn persist_marker(&self, cause: &str) -> Result<()> {
        if self.dry_run {
            info!("DRY-RUN: would write reboot marker {}", self.marker_path.display());
            return Ok(());
        }
        write_marker(&self.marker_path, cause)?;
        info!("SAFETY: Reboot cause written to {}", self.marker_path.display());
        Ok(())
    }

    fn request_reboot(&self, cause: &str) -> Result<()> {
        let Some((program, args)) = self.reboot_command.split_first() else {
            return Err(SwitchfanError::Reboot("empty reboot command".to_string()));
        };

        if self.dry_run {
            info!("DRY-RUN: would run {:?} ({})", self.reboot_command, cause);
            return Ok(());
        }

        warn!("ACTION: Requesting reboot: {}", cause);
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| SwitchfanError::Reboot(format!("{}: {}", program, e)))?;

        if status.success() {
            Ok(())
        } else {
            error!("SAFETY: Reboot command exited with {}", status);
            Err(SwitchfanError::Reboot(format!("{} exited with {}", program, status)))
        }
    }
}
