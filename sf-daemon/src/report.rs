//! Human-readable output for `--check` and `--once`

use std::collections::BTreeMap;

use serde::Serialize;

use sf_core::{Policy, TickDecision};

/// Summary of a validated policy
#[derive(Debug, Serialize)]
pub struct PolicySummary {
    pub channels: Vec<String>,
    pub fans: Vec<String>,
    pub psus: Vec<String>,
    pub min_pwm: u8,
    pub max_pwm: u8,
    pub tick_interval_secs: u64,
    pub strategies: Vec<String>,
    pub repair_enabled: bool,
    pub airflow_enabled: bool,
}

impl PolicySummary {
    pub fn new(policy: &Policy) -> Self {
        let mut strategies = Vec::new();
        if let Some(open_loop) = policy.open_loop.as_ref().filter(|o| o.enabled) {
            strategies.push(format!("open-loop({})", open_loop.channel));
        }
        strategies.extend(
            policy
                .hysteresis
                .iter()
                .filter(|h| h.enabled)
                .map(|h| format!("hysteresis({})", h.channel)),
        );
        strategies.extend(
            policy
                .pid
                .iter()
                .filter(|p| p.enabled)
                .map(|p| format!("pid({})", p.channel)),
        );

        Self {
            channels: policy.channels.iter().map(|c| c.name.clone()).collect(),
            fans: policy.fans.iter().map(|f| f.name.clone()).collect(),
            psus: policy.psus.iter().map(|p| p.name.clone()).collect(),
            min_pwm: policy.pwm.min_pwm,
            max_pwm: policy.pwm.max_pwm,
            tick_interval_secs: policy.timing.tick_interval().as_secs(),
            strategies,
            repair_enabled: policy.repair.enabled,
            airflow_enabled: policy.airflow.enabled,
        }
    }
}

/// One tick decision keyed by unit name
#[derive(Debug, Serialize)]
pub struct DecisionReport {
    pub scalar: u8,
    pub level: String,
    pub fans: BTreeMap<String, u8>,
    pub psus: BTreeMap<String, u8>,
    pub causes: Vec<String>,
    pub airflow_inconsistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reboot_check: Option<String>,
}

impl DecisionReport {
    pub fn new(policy: &Policy, decision: &TickDecision) -> Self {
        Self {
            scalar: decision.scalar,
            level: decision.level.to_string(),
            fans: policy
                .fans
                .iter()
                .map(|f| f.name.clone())
                .zip(decision.fan_duties.iter().copied())
                .collect(),
            psus: policy
                .psus
                .iter()
                .map(|p| p.name.clone())
                .zip(decision.psu_duties.iter().copied())
                .collect(),
            causes: decision.causes.iter().map(|c| c.to_string()).collect(),
            airflow_inconsistent: decision.airflow_inconsistent,
            reboot_check: decision.reboot_check.clone(),
        }
    }
}
