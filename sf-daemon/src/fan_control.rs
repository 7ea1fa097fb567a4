//! Fan Control Loop
//!
//! Drives the `Controller` against the chassis: sample, tick, actuate, sleep.
//!
//! # Safety Features
//! - **Fail-safe exit**: every non-parked unit is driven to `max_pwm` on shutdown
//! - **Graceful degradation**: a failed read or write never aborts a tick
//! - **Error counting**: consecutive write failures per unit, logged every N
//! - **Reboot check**: fans at max while the thermal trigger is re-polled
//! - **Presence sub-tick**: optional presence refresh between full ticks

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use sf_core::constants::limits::MAX_INTERVAL_SECS;
use sf_core::constants::timing::LOG_EVERY_N_ERRORS;
use sf_core::{
    sample_presence, sample_tick, Actuator, AirflowSource, Collaborators, Controller,
    FanInventory, PsuInventory, RebootStep, SensorSource, SystemControl, TickDecision, TickSample,
};
use sf_error::Result;

/// Granularity of shutdown checks while sleeping
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Everything the loop needs from the chassis
pub trait Platform:
    SensorSource + FanInventory + PsuInventory + AirflowSource + Actuator + SystemControl
{
}

impl<T> Platform for T where
    T: SensorSource + FanInventory + PsuInventory + AirflowSource + Actuator + SystemControl
{
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown flag set; fans were left at max
    Shutdown,
    /// A reboot was requested
    Rebooting { cause: String },
}

/// Result of one reboot check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootOutcome {
    Stabilized,
    Rebooting { cause: String },
    /// The reboot request failed; the check was dropped
    Failed,
    /// Shutdown arrived mid-check
    Interrupted,
}

/// The loop driver: owns the controller, borrows the platform
pub struct ControlLoop<'a, P: Platform> {
    controller: Controller,
    platform: &'a P,
    /// Consecutive write failures per unit
    write_errors: HashMap<String, u32>,
}

impl<'a, P: Platform> ControlLoop<'a, P> {
    pub fn new(controller: Controller, platform: &'a P) -> Self {
        Self {
            controller,
            platform,
            write_errors: HashMap::new(),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn write_errors(&self, unit: &str) -> u32 {
        self.write_errors.get(unit).copied().unwrap_or(0)
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            sensors: self.platform,
            fans: self.platform,
            psus: self.platform,
            airflow: self.platform,
        }
    }

    pub fn sample(&self) -> TickSample {
        sample_tick(self.controller.policy(), self.collaborators())
    }

    /// Sample, decide and actuate once
    pub fn run_tick(&mut self) -> TickDecision {
        let sample = self.sample();
        let decision = self.controller.tick(&sample);
        self.apply(&decision);
        decision
    }

    /// Write a decision to every unit
    pub fn apply(&mut self, decision: &TickDecision) {
        let policy = self.controller.policy();
        let fans: Vec<(String, u8)> = policy
            .fans
            .iter()
            .map(|f| f.name.clone())
            .zip(decision.fan_duties.iter().copied())
            .collect();
        let psus: Vec<(String, u8)> = policy
            .psus
            .iter()
            .map(|p| p.name.clone())
            .zip(decision.psu_duties.iter().copied())
            .collect();

        for (name, duty) in fans {
            let result = self.platform.set_fan_duty(&name, duty);
            self.record_write(&name, duty, result);
        }
        for (name, duty) in psus {
            let result = self.platform.set_psu_duty(&name, duty);
            self.record_write(&name, duty, result);
        }
    }

    fn record_write(&mut self, unit: &str, duty: u8, result: Result<()>) {
        match result {
            Ok(()) => {
                if let Some(count) = self.write_errors.remove(unit) {
                    debug!("CONTROL: {} writes recovered after {} errors", unit, count);
                }
            }
            Err(e) => {
                let count = self.write_errors.entry(unit.to_string()).or_insert(0);
                *count += 1;
                if *count == 1 || *count % LOG_EVERY_N_ERRORS == 0 {
                    warn!(
                        "CONTROL: Failed to set {} to {:#04x} (count: {}): {}",
                        unit, duty, count, e
                    );
                }
            }
        }
    }

    /// Drive every non-parked unit to `max_pwm`
    pub fn drive_max(&mut self) {
        let policy = self.controller.policy();
        let max = policy.pwm.max_pwm;
        let fans: Vec<String> = policy
            .fans
            .iter()
            .filter(|f| !f.parked)
            .map(|f| f.name.clone())
            .collect();
        let psus: Vec<String> = policy.psus.iter().map(|p| p.name.clone()).collect();

        for name in fans {
            let result = self.platform.set_fan_duty(&name, max);
            self.record_write(&name, max, result);
        }
        for name in psus {
            let result = self.platform.set_psu_duty(&name, max);
            self.record_write(&name, max, result);
        }
    }

    /// Presence-only refresh between full ticks
    pub fn refresh_presence(&mut self) {
        let (fans, psus) = sample_presence(self.controller.policy(), self.platform, self.platform);
        self.controller.observe_presence(&fans, &psus);
    }

    /// Hold fans at max and re-poll the reboot trigger until it resolves
    pub async fn run_reboot_check(&mut self, shutdown: &AtomicBool) -> RebootOutcome {
        loop {
            self.drive_max();

            let interval = match &self.controller.state().reboot_check {
                Some(check) => check.poll_interval(),
                None => return RebootOutcome::Stabilized,
            };

            if !sleep_unless_shutdown(interval, shutdown).await {
                self.controller.abort_reboot_check();
                return RebootOutcome::Interrupted;
            }

            let sample = self.sample();
            match self.controller.poll_reboot_check(&sample) {
                None | Some(RebootStep::Stabilized) => {
                    info!("SAFETY: Thermal condition stabilized, resuming normal control");
                    return RebootOutcome::Stabilized;
                }
                Some(RebootStep::Continue) => {}
                Some(RebootStep::Reboot { cause }) => {
                    error!("SAFETY: Thermal condition persisted: {}", cause);
                    if let Err(e) = self.platform.persist_marker(&cause) {
                        error!("SAFETY: Failed to persist reboot cause: {}", e);
                    }
                    return match self.platform.request_reboot(&cause) {
                        Ok(()) => RebootOutcome::Rebooting { cause },
                        Err(e) => {
                            error!("SAFETY: Reboot request failed: {}", e);
                            self.controller.abort_reboot_check();
                            RebootOutcome::Failed
                        }
                    };
                }
            }
        }
    }

    /// Sleep until the next full tick, refreshing presence if configured
    ///
    /// Returns false when shutdown was requested.
    async fn wait_for_next_tick(&mut self, shutdown: &AtomicBool) -> bool {
        let timing = &self.controller.policy().timing;
        let deadline = deadline_after(timing.tick_interval());
        let presence_poll = timing.presence_poll();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            let step = presence_poll.map_or(remaining, |p| p.min(remaining));
            if !sleep_unless_shutdown(step, shutdown).await {
                return false;
            }
            if presence_poll.is_some() && Instant::now() < deadline {
                self.refresh_presence();
            }
        }
    }

    /// Run until shutdown or reboot
    pub async fn run(&mut self, shutdown: &AtomicBool) -> LoopExit {
        info!(
            "CONTROL: Loop starting ({} channels, {} fans, {} PSUs, tick {:?})",
            self.controller.policy().channels.len(),
            self.controller.policy().fans.len(),
            self.controller.policy().psus.len(),
            self.controller.policy().timing.tick_interval()
        );

        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            let decision = self.run_tick();
            debug!(
                "CONTROL: duty {:#04x} ({:.0}%), level {}",
                decision.scalar,
                sf_core::constants::pwm::to_percent(decision.scalar),
                decision.level
            );

            if let Some(cause) = &decision.reboot_check {
                warn!("SAFETY: Reboot check started: {}", cause);
                match self.run_reboot_check(shutdown).await {
                    RebootOutcome::Rebooting { cause } => return LoopExit::Rebooting { cause },
                    RebootOutcome::Interrupted => break,
                    RebootOutcome::Stabilized | RebootOutcome::Failed => {}
                }
            }

            if !self.wait_for_next_tick(shutdown).await {
                break;
            }
        }

        info!("CONTROL: Shutdown requested, driving fans to maximum");
        self.drive_max();
        LoopExit::Shutdown
    }
}

/// `now + duration`, capped at the longest interval a policy may configure
fn deadline_after(duration: Duration) -> Instant {
    let capped = duration.min(Duration::from_secs(MAX_INTERVAL_SECS));
    let now = Instant::now();
    now.checked_add(capped).unwrap_or(now)
}

/// Sleep for `duration`, waking early if shutdown is requested
///
/// Returns false when shutdown was requested.
async fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = deadline_after(duration);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        tokio::time::sleep(remaining.min(SHUTDOWN_POLL)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SysfsPlatform;
    use sf_core::{parse_policy, EscalationLevel, Policy};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: &str) {
        fs::write(dir.join(name), value).unwrap();
    }

    fn read(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap()
    }

    /// A two-fan, one-PSU chassis in a temp directory
    fn chassis(dir: &Path) -> Policy {
        let p = |name: &str| dir.join(name).to_string_lossy().to_string();
        let json = serde_json::json!({
            "pwm": {"min_pwm": 128, "max_pwm": 255, "abnormal_duty": 192},
            "channels": [
                {"name": "INLET", "critical": 60000, "input_path": p("inlet")},
                {"name": "SWITCH_TEMP", "critical": 73000, "input_path": p("switch")}
            ],
            "fans": [
                {"name": "FAN1", "presence_path": p("fan1_present"),
                 "rotor_paths": [p("fan1_rotor")], "pwm_path": p("fan1_pwm")},
                {"name": "FAN2", "presence_path": p("fan2_present"),
                 "rotor_paths": [p("fan2_rotor")], "pwm_path": p("fan2_pwm")}
            ],
            "psus": [
                {"name": "PSU1", "presence_path": p("psu1_present"),
                 "status_path": p("psu1_status"), "pwm_path": p("psu1_pwm")}
            ],
            "open_loop": {
                "channel": "INLET",
                "points": [{"temp": 25000, "duty": 128}, {"temp": 45000, "duty": 224}]
            },
            "safety": {
                "switch_channel": "SWITCH_TEMP",
                "poll_count": 2,
                "poll_interval_secs": 0,
                "marker_path": p("reboot/cause"),
                "reboot_command": ["true"]
            }
        });

        for name in ["fan1_present", "fan2_present", "fan1_rotor", "fan2_rotor", "psu1_present", "psu1_status"] {
            write(dir, name, "1\n");
        }
        write(dir, "inlet", "30000\n");
        write(dir, "switch", "50000\n");

        parse_policy(&json.to_string()).unwrap()
    }

    #[test]
    fn test_tick_writes_every_unit() {
        let dir = TempDir::new().unwrap();
        let policy = chassis(dir.path());
        let platform = SysfsPlatform::new(&policy, false);
        let mut control = ControlLoop::new(Controller::new(policy).unwrap(), &platform);

        let decision = control.run_tick();
        assert_eq!(decision.scalar, 152);
        assert_eq!(read(dir.path(), "fan1_pwm"), "152");
        assert_eq!(read(dir.path(), "fan2_pwm"), "152");
        assert_eq!(read(dir.path(), "psu1_pwm"), "152");
    }

    #[test]
    fn test_write_failures_are_counted_and_cleared() {
        let dir = TempDir::new().unwrap();
        let mut policy = chassis(dir.path());
        policy.fans[1].pwm_path = Some(dir.path().join("missing/fan2_pwm"));
        let platform = SysfsPlatform::new(&policy, false);
        let mut control = ControlLoop::new(Controller::new(policy).unwrap(), &platform);

        for _ in 0..3 {
            control.run_tick();
        }
        assert_eq!(control.write_errors("FAN2"), 3);
        assert_eq!(control.write_errors("FAN1"), 0);
        assert_eq!(read(dir.path(), "fan1_pwm"), "152");

        fs::create_dir(dir.path().join("missing")).unwrap();
        control.run_tick();
        assert_eq!(control.write_errors("FAN2"), 0);
    }

    #[test]
    fn test_drive_max_skips_parked_fans() {
        let dir = TempDir::new().unwrap();
        let mut policy = chassis(dir.path());
        policy.fans[1].parked = true;
        let platform = SysfsPlatform::new(&policy, false);
        let mut control = ControlLoop::new(Controller::new(policy).unwrap(), &platform);

        control.drive_max();
        assert_eq!(read(dir.path(), "fan1_pwm"), "255");
        assert!(!dir.path().join("fan2_pwm").exists());
        assert_eq!(read(dir.path(), "psu1_pwm"), "255");
    }

    #[test]
    fn test_presence_refresh_latches_reinsertion() {
        let dir = TempDir::new().unwrap();
        let policy = chassis(dir.path());
        let platform = SysfsPlatform::new(&policy, false);
        let mut control = ControlLoop::new(Controller::new(policy).unwrap(), &platform);

        control.run_tick();
        write(dir.path(), "fan2_present", "0\n");
        control.refresh_presence();
        assert!(control.controller().fans()[1].is_absent());

        write(dir.path(), "fan2_present", "1\n");
        control.refresh_presence();
        assert!(control.controller().fans()[1].is_present());
    }

    #[tokio::test]
    async fn test_reboot_check_reboots_when_heat_persists() {
        let dir = TempDir::new().unwrap();
        let policy = chassis(dir.path());
        let platform = SysfsPlatform::new(&policy, false);
        let mut control = ControlLoop::new(Controller::new(policy).unwrap(), &platform);
        let shutdown = AtomicBool::new(false);

        write(dir.path(), "switch", "74000\n");
        let decision = (0..3).map(|_| control.run_tick()).last().unwrap();
        assert_eq!(decision.level, EscalationLevel::ShutdownPending);
        assert!(decision.reboot_check.is_some());

        let outcome = control.run_reboot_check(&shutdown).await;
        assert!(matches!(outcome, RebootOutcome::Rebooting { ref cause } if cause.contains("SWITCH_TEMP")));
        assert!(read(dir.path(), "reboot/cause").contains("SWITCH_TEMP"));
        assert_eq!(read(dir.path(), "fan1_pwm"), "255");
    }

    #[tokio::test]
    async fn test_reboot_check_stabilizes() {
        let dir = TempDir::new().unwrap();
        let policy = chassis(dir.path());
        let platform = SysfsPlatform::new(&policy, false);
        let mut control = ControlLoop::new(Controller::new(policy).unwrap(), &platform);
        let shutdown = AtomicBool::new(false);

        write(dir.path(), "switch", "74000\n");
        for _ in 0..3 {
            control.run_tick();
        }
        assert!(control.controller().reboot_in_flight());

        write(dir.path(), "switch", "60000\n");
        let outcome = control.run_reboot_check(&shutdown).await;
        assert_eq!(outcome, RebootOutcome::Stabilized);
        assert!(!control.controller().reboot_in_flight());
        assert!(!dir.path().join("reboot/cause").exists());
    }

    #[tokio::test]
    async fn test_failed_reboot_drops_the_check() {
        let dir = TempDir::new().unwrap();
        let mut policy = chassis(dir.path());
        policy.safety.reboot_command = vec!["false".to_string()];
        let platform = SysfsPlatform::new(&policy, false);
        let mut control = ControlLoop::new(Controller::new(policy).unwrap(), &platform);
        let shutdown = AtomicBool::new(false);

        write(dir.path(), "switch", "74000\n");
        for _ in 0..3 {
            control.run_tick();
        }
        assert_eq!(control.run_reboot_check(&shutdown).await, RebootOutcome::Failed);
        assert!(!control.controller().reboot_in_flight());
    }

    #[tokio::test]
    async fn test_oversized_sleep_is_capped() {
        let start = Instant::now();
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline <= Instant::now() + Duration::from_secs(MAX_INTERVAL_SECS));
        assert!(deadline >= start);

        let shutdown = AtomicBool::new(true);
        assert!(!sleep_unless_shutdown(Duration::MAX, &shutdown).await);
        assert!(sleep_unless_shutdown(Duration::ZERO, &AtomicBool::new(false)).await);
    }

    #[tokio::test]
    async fn test_shutdown_leaves_fans_at_max() {
        let dir = TempDir::new().unwrap();
        let policy = chassis(dir.path());
        let platform = SysfsPlatform::new(&policy, false);
        let mut control = ControlLoop::new(Controller::new(policy).unwrap(), &platform);
        let shutdown = AtomicBool::new(true);

        assert_eq!(control.run(&shutdown).await, LoopExit::Shutdown);
        assert_eq!(read(dir.path(), "fan1_pwm"), "255");
        assert_eq!(read(dir.path(), "fan2_pwm"), "255");
        assert_eq!(read(dir.path(), "psu1_pwm"), "255");
    }
}
