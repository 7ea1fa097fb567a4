//! The thermal controller
//!
//! `Controller::tick` turns one `TickSample` into a `TickDecision`. It never
//! performs I/O or sleeps, so a fixed sample stream always produces the same
//! decisions. The loop driver owns the controller, samples the hardware,
//! applies the decision and runs reboot checks.
//!
//! # Tick pipeline
//!
//! 1. Threshold tracking and unit observation
//! 2. Escalation level
//! 3. Strategies (open-loop curve, hysteresis, PID)
//! 4. Abnormal floors and the scalar duty
//! 5. Per-fan overrides (repair table, plug-in grace)
//! 6. Airflow table, escalation maximum, parked units

use tracing::{debug, info, warn};

use crate::constants::pwm;
use crate::data::policy::{Policy, PwmPolicy};
use crate::data::sample::{FanSample, PsuSample, TickSample};
use crate::data::types::{FanId, Severity};
use crate::engine::abnormal::{self, AbnormalCause, AbnormalInputs};
use crate::engine::airflow;
use crate::engine::arbitrator;
use crate::engine::curve::OpenLoopCurve;
use crate::engine::escalation::{reboot_trigger, Escalation, EscalationLevel, RebootCheck, RebootStep};
use crate::engine::hysteresis::Hysteresis;
use crate::engine::pid::Pid;
use crate::engine::threshold::ThresholdTracker;
use crate::engine::units::{FanState, PsuState};
use crate::error::{Result, SwitchfanError};

/// State carried from one tick to the next
#[derive(Debug, Clone)]
pub struct ControllerState {
    /// Scalar duty emitted by the previous tick; PID feedback
    pub last_duty: u8,
    pub escalation: Escalation,
    pub level: EscalationLevel,
    /// Fan currently under the repair policy
    pub repair: Option<FanId>,
    pub reboot_check: Option<RebootCheck>,
    pub airflow_inconsistent: bool,
    pub ticks: u64,
}

/// Output of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickDecision {
    /// Uniform duty before per-unit overrides
    pub scalar: u8,
    pub fan_duties: Vec<u8>,
    pub psu_duties: Vec<u8>,
    pub level: EscalationLevel,
    pub causes: Vec<AbnormalCause>,
    pub airflow_inconsistent: bool,
    /// Set when this tick started a reboot check
    pub reboot_check: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Controller {
    policy: Policy,
    tracker: ThresholdTracker,
    open_loop: Option<OpenLoopCurve>,
    hysteresis: Vec<Hysteresis>,
    pid: Vec<Pid>,
    fans: Vec<FanState>,
    psus: Vec<PsuState>,
    state: ControllerState,
}

impl Controller {
    /// Build a controller from a validated policy
    pub fn new(policy: Policy) -> Result<Self> {
        let tracker = ThresholdTracker::new(&policy.channels, policy.thresholds.clone());
        let channel_index = |name: &str| {
            tracker
                .index_of(name)
                .ok_or_else(|| SwitchfanError::UnknownChannel(name.to_string()))
        };

        let max = policy.pwm.max_pwm;
        let open_loop = match &policy.open_loop {
            Some(config) if config.enabled => {
                Some(OpenLoopCurve::new(config, channel_index(&config.channel)?, max))
            }
            _ => None,
        };

        let hysteresis = policy
            .hysteresis
            .iter()
            .filter(|h| h.enabled)
            .map(|h| Ok(Hysteresis::new(h, channel_index(&h.channel)?)))
            .collect::<Result<Vec<_>>>()?;

        let pid = policy
            .pid
            .iter()
            .filter(|p| p.enabled)
            .map(|p| Ok(Pid::new(p, channel_index(&p.channel)?, max)))
            .collect::<Result<Vec<_>>>()?;

        let state = ControllerState {
            last_duty: max,
            escalation: Escalation::new(&policy.safety),
            level: EscalationLevel::Normal,
            repair: None,
            reboot_check: None,
            airflow_inconsistent: false,
            ticks: 0,
        };

        Ok(Self {
            fans: policy.fans.iter().map(FanState::new).collect(),
            psus: policy.psus.iter().map(PsuState::new).collect(),
            tracker,
            open_loop,
            hysteresis,
            pid,
            state,
            policy,
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn tracker(&self) -> &ThresholdTracker {
        &self.tracker
    }

    pub fn fans(&self) -> &[FanState] {
        &self.fans
    }

    pub fn psus(&self) -> &[PsuState] {
        &self.psus
    }

    pub fn reboot_in_flight(&self) -> bool {
        self.state.reboot_check.is_some()
    }

    /// Presence-only sub-tick: refresh latches, no decision
    pub fn observe_presence(&mut self, fans: &[bool], psus: &[bool]) {
        for (fan, present) in self.fans.iter_mut().zip(fans) {
            fan.observe_presence(*present);
        }
        for (psu, present) in self.psus.iter_mut().zip(psus) {
            psu.present = *present;
        }
    }

    /// Run one full tick
    pub fn tick(&mut self, sample: &TickSample) -> TickDecision {
        self.state.ticks += 1;
        let bounds = self.policy.pwm.clone();

        self.tracker.update(&sample.channels);
        self.observe_units(sample);

        let elapsed = self.policy.timing.tick_interval().as_secs();
        let mut level = self.state.escalation.update(&self.tracker, elapsed);
        if self.state.reboot_check.is_some() {
            level = EscalationLevel::ShutdownPending;
        }
        self.log_level_change(level);

        let strategy_duty = self.run_strategies(&bounds);

        let report = abnormal::detect(
            &AbnormalInputs {
                policy: &self.policy.abnormal,
                bounds: &bounds,
                divergence: self.policy.divergence.as_ref(),
                tracker: &self.tracker,
                fans: &self.fans,
                psus: &self.psus,
            },
            strategy_duty,
        );

        let mut candidates = vec![strategy_duty];
        candidates.extend(report.floor());
        match level {
            EscalationLevel::Warning => candidates.push(bounds.warning_duty()),
            l if l.forces_max() => candidates.push(bounds.max_pwm),
            _ => {}
        }
        let scalar = arbitrator::combine(candidates, &bounds);

        let repair = arbitrator::repair_overrides(
            &mut self.fans,
            &mut self.state.repair,
            &self.policy.repair,
            &report.faulty_fans,
            report.absent_fans,
        );
        let plug_in = arbitrator::plug_in_overrides(&mut self.fans, &self.policy.plug_in, report.absent_fans);

        let inconsistent = self.policy.airflow.enabled
            && airflow::check(sample.board_airflow, &mut self.fans, &mut self.psus);
        if inconsistent != self.state.airflow_inconsistent {
            if inconsistent {
                warn!("Airflow mismatch against board direction {}", sample.board_airflow);
            } else {
                info!("Airflow consistent again");
            }
            self.state.airflow_inconsistent = inconsistent;
        }

        for (index, fan) in self.fans.iter_mut().enumerate() {
            let mut duty = plug_in[index].or(repair[index]).unwrap_or(scalar);
            if inconsistent {
                duty = self.policy.airflow.duty_for(&fan.name, fan.inconsistent);
            }
            fan.duty = finalize(duty, fan.parked, level, &bounds);
        }
        for psu in self.psus.iter_mut() {
            let duty = if inconsistent {
                self.policy.airflow.duty_for(&psu.name, psu.inconsistent)
            } else {
                scalar
            };
            psu.duty = finalize(duty, false, level, &bounds);
        }

        self.state.last_duty = scalar;

        let mut reboot_check = None;
        if level.forces_max() && self.state.reboot_check.is_none() {
            if let Some(cause) = reboot_trigger(&self.tracker, &self.policy.safety) {
                warn!("Reboot trigger holds ({}), starting reboot check", cause);
                self.state.reboot_check = Some(RebootCheck::new(cause.clone(), &self.policy.safety));
                level = EscalationLevel::ShutdownPending;
                self.state.level = level;
                reboot_check = Some(cause);
            }
        }

        let causes: Vec<AbnormalCause> = report.causes().cloned().collect();
        debug!(
            "Tick {}: scalar {:#04x}, level {}, {} abnormal cause(s)",
            self.state.ticks,
            scalar,
            level,
            causes.len()
        );

        TickDecision {
            scalar,
            fan_duties: self.fans.iter().map(|f| f.duty).collect(),
            psu_duties: self.psus.iter().map(|p| p.duty).collect(),
            level,
            causes,
            airflow_inconsistent: inconsistent,
            reboot_check,
        }
    }

    /// Feed a fresh sample into the reboot check in flight
    ///
    /// Returns `None` when no check is running. On `Stabilized` the check is
    /// cleared and the escalation countdowns restart at their full value.
    pub fn poll_reboot_check(&mut self, sample: &TickSample) -> Option<RebootStep> {
        self.state.reboot_check.as_ref()?;

        self.tracker.update(&sample.channels);
        let trigger = reboot_trigger(&self.tracker, &self.policy.safety);
        let step = self.state.reboot_check.as_mut()?.poll(trigger);

        if step == RebootStep::Stabilized {
            self.state.reboot_check = None;
            self.state.escalation.reset_countdowns();
        }
        Some(step)
    }

    /// Drop the check in flight so a later tick may start a new one
    pub fn abort_reboot_check(&mut self) {
        if self.state.reboot_check.take().is_some() {
            warn!("Reboot check aborted");
        }
    }

    fn observe_units(&mut self, sample: &TickSample) {
        for (index, fan) in self.fans.iter_mut().enumerate() {
            match sample.fans.get(index) {
                Some(fan_sample) => fan.observe(fan_sample),
                None => fan.observe(&FanSample {
                    present: false,
                    rotors: Vec::new(),
                    airflow: Default::default(),
                }),
            }
        }
        for (index, psu) in self.psus.iter_mut().enumerate() {
            let psu_sample = sample.psus.get(index).copied().unwrap_or(PsuSample {
                present: false,
                io_ok: false,
                airflow: Default::default(),
            });
            psu.observe(&psu_sample);
        }
    }

    fn run_strategies(&mut self, bounds: &PwmPolicy) -> u8 {
        let tracker = &self.tracker;
        let sample_of = |index: usize| tracker.get(index).and_then(|c| c.sample());

        let mut candidates = Vec::new();
        if let Some(curve) = &self.open_loop {
            candidates.push(curve.evaluate(sample_of(curve.channel())));
        }
        for hyst in &mut self.hysteresis {
            candidates.extend(hyst.update(sample_of(hyst.channel())));
        }
        for pid in &mut self.pid {
            candidates.push(pid.update(sample_of(pid.channel()), self.state.last_duty, bounds));
        }

        arbitrator::combine(candidates, bounds)
    }

    fn log_level_change(&mut self, level: EscalationLevel) {
        if level == self.state.level {
            return;
        }
        let channels: Vec<&str> = match level {
            EscalationLevel::Warning => self.tracker.active_channels(Severity::Warning),
            EscalationLevel::Critical => self.tracker.active_channels(Severity::Critical),
            _ => self.tracker.active_channels(Severity::Emergency),
        }
        .map(|c| c.name())
        .collect();

        if level > self.state.level {
            warn!("Escalation {} -> {} [{}]", self.state.level, level, channels.join(", "));
        } else {
            info!("Escalation {} -> {}", self.state.level, level);
        }
        self.state.level = level;
    }
}

/// Parked units get 0; everything else is bounded, then forced to maximum
/// at Critical or above
fn finalize(duty: u8, parked: bool, level: EscalationLevel, bounds: &PwmPolicy) -> u8 {
    if parked {
        return pwm::PARKED;
    }
    if level.forces_max() {
        return bounds.max_pwm;
    }
    if duty == pwm::PARKED {
        return duty;
    }
    duty.clamp(bounds.min_pwm, bounds.max_pwm)
}
