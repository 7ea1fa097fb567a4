//! Abnormal condition detection
//!
//! Each check is independent and turns one hardware or sensor problem into a
//! duty floor for the arbitrator.

use std::fmt;

use crate::data::policy::{AbnormalPolicy, DivergenceConfig, PwmPolicy};
use crate::data::types::{FanId, MilliCelsius};
use crate::engine::threshold::ThresholdTracker;
use crate::engine::units::{FanState, PsuState};

/// Why a floor was raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbnormalCause {
    FanAbsent { count: usize },
    RotorStall { fans: Vec<String> },
    PsuAbsent { count: usize },
    PsuFault { count: usize },
    Divergence { primary: String, secondary: String, delta: u32 },
    ReadFailure { channel: String, failures: u32 },
}

impl fmt::Display for AbnormalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FanAbsent { count } => write!(f, "{} fan(s) absent", count),
            Self::RotorStall { fans } => write!(f, "rotor stall on {}", fans.join(", ")),
            Self::PsuAbsent { count } => write!(f, "{} psu(s) absent", count),
            Self::PsuFault { count } => write!(f, "{} psu(s) with an electrical fault", count),
            Self::Divergence { primary, secondary, delta } => write!(
                f,
                "{} and {} differ by {}",
                primary,
                secondary,
                MilliCelsius(*delta as i32)
            ),
            Self::ReadFailure { channel, failures } => {
                write!(f, "{} failed {} consecutive reads", channel, failures)
            }
        }
    }
}

/// Floors raised this tick
#[derive(Debug, Clone, Default)]
pub struct AbnormalReport {
    pub floors: Vec<(AbnormalCause, u8)>,
    /// Fans with a rotor stalled past the threshold
    pub faulty_fans: Vec<FanId>,
    pub absent_fans: usize,
}

impl AbnormalReport {
    pub fn floor(&self) -> Option<u8> {
        self.floors.iter().map(|(_, duty)| *duty).max()
    }

    pub fn causes(&self) -> impl Iterator<Item = &AbnormalCause> {
        self.floors.iter().map(|(cause, _)| cause)
    }
}

/// Inputs borrowed from the controller for one detection pass
pub struct AbnormalInputs<'a> {
    pub policy: &'a AbnormalPolicy,
    pub bounds: &'a PwmPolicy,
    pub divergence: Option<&'a DivergenceConfig>,
    pub tracker: &'a ThresholdTracker,
    pub fans: &'a [FanState],
    pub psus: &'a [PsuState],
}

/// Run every check; `strategy_duty` is the strategies' combined result
pub fn detect(inputs: &AbnormalInputs<'_>, strategy_duty: u8) -> AbnormalReport {
    let mut report = AbnormalReport::default();
    let max = inputs.bounds.max_pwm;
    let abnormal = inputs.bounds.abnormal_duty;

    report.absent_fans = inputs.fans.iter().filter(|f| f.is_absent()).count();
    if report.absent_fans > 0 && report.absent_fans as u32 >= inputs.policy.fan_absent_threshold {
        report.floors.push((AbnormalCause::FanAbsent { count: report.absent_fans }, max));
    }

    report.faulty_fans = inputs
        .fans
        .iter()
        .enumerate()
        .filter(|(_, fan)| fan.is_faulty(inputs.policy.rotor_stall_ticks))
        .map(|(index, _)| FanId(index))
        .collect();
    if !report.faulty_fans.is_empty() {
        let fans = report
            .faulty_fans
            .iter()
            .map(|id| inputs.fans[id.0].name.clone())
            .collect();
        report.floors.push((AbnormalCause::RotorStall { fans }, max));
    }

    let absent_psus = inputs.psus.iter().filter(|p| !p.present).count();
    if absent_psus > 0 && absent_psus as u32 >= inputs.policy.psu_absent_threshold {
        report.floors.push((AbnormalCause::PsuAbsent { count: absent_psus }, max));
    }

    let faulted_psus = inputs.psus.iter().filter(|p| p.is_faulted()).count();
    if faulted_psus > 0 && faulted_psus as u32 >= inputs.policy.psu_fault_threshold {
        report.floors.push((AbnormalCause::PsuFault { count: faulted_psus }, max));
    }

    if let Some(divergence) = inputs.divergence {
        if let Some(cause) = check_divergence(divergence, inputs.tracker) {
            let floor = if strategy_duty > abnormal { max } else { abnormal };
            report.floors.push((cause, floor));
        }
    }

    for channel in inputs.tracker.failing_channels() {
        report.floors.push((
            AbnormalCause::ReadFailure {
                channel: channel.name().to_string(),
                failures: channel.fail_num(),
            },
            abnormal,
        ));
    }

    report
}

fn check_divergence(config: &DivergenceConfig, tracker: &ThresholdTracker) -> Option<AbnormalCause> {
    let primary = tracker.by_name(&config.primary)?.sample()?;
    let secondary = tracker.by_name(&config.secondary)?.sample()?;
    let delta = primary.abs_diff(secondary);
    let limit = u32::try_from(config.delta.0).unwrap_or(0);

    (delta >= limit).then(|| AbnormalCause::Divergence {
        primary: config.primary.clone(),
        secondary: config.secondary.clone(),
        delta,
    })
}
