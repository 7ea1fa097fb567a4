//! Thermal policy model
//!
//! Typed view of the JSON policy file. Every field carries a serde default so
//! a sparse file still yields a complete policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{abnormal, overrides, paths, pwm, safety, thresholds, timing};
use crate::data::types::{AirflowDirection, MilliCelsius, Severity};

/// Complete controller policy, loaded once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub pwm: PwmPolicy,
    #[serde(default)]
    pub timing: TimingPolicy,
    #[serde(default)]
    pub thresholds: ThresholdPolicy,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub fans: Vec<FanConfig>,
    #[serde(default)]
    pub psus: Vec<PsuConfig>,
    #[serde(default)]
    pub open_loop: Option<OpenLoopConfig>,
    #[serde(default)]
    pub hysteresis: Vec<HysteresisConfig>,
    #[serde(default)]
    pub pid: Vec<PidConfig>,
    #[serde(default)]
    pub abnormal: AbnormalPolicy,
    #[serde(default)]
    pub divergence: Option<DivergenceConfig>,
    #[serde(default)]
    pub airflow: AirflowPolicy,
    #[serde(default)]
    pub plug_in: PlugInPolicy,
    #[serde(default)]
    pub repair: RepairPolicy,
    #[serde(default)]
    pub safety: SafetyPolicy,
}

// ============================================================================
// Duty bounds and timing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PwmPolicy {
    #[serde(default = "default_min_pwm")]
    pub min_pwm: u8,
    #[serde(default = "default_max_pwm")]
    pub max_pwm: u8,
    /// Floor for abnormal-but-not-maximum conditions
    #[serde(default = "default_abnormal_duty")]
    pub abnormal_duty: u8,
    /// Floor while a warning is active; falls back to `abnormal_duty`
    #[serde(default)]
    pub warning_duty: Option<u8>,
}

impl PwmPolicy {
    pub fn warning_duty(&self) -> u8 {
        self.warning_duty.unwrap_or(self.abnormal_duty)
    }
}

impl Default for PwmPolicy {
    fn default() -> Self {
        Self {
            min_pwm: default_min_pwm(),
            max_pwm: default_max_pwm(),
            abnormal_duty: default_abnormal_duty(),
            warning_duty: None,
        }
    }
}

fn default_min_pwm() -> u8 {
    pwm::DEFAULT_MIN
}

fn default_max_pwm() -> u8 {
    pwm::DEFAULT_MAX
}

fn default_abnormal_duty() -> u8 {
    pwm::DEFAULT_ABNORMAL
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingPolicy {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Presence-only sub-tick between full ticks
    #[serde(default)]
    pub presence_poll_ms: Option<u64>,
}

impl TimingPolicy {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs).max(timing::MIN_TICK_INTERVAL)
    }

    pub fn presence_poll(&self) -> Option<Duration> {
        self.presence_poll_ms
            .map(|ms| Duration::from_millis(ms).max(timing::MIN_PRESENCE_POLL))
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            presence_poll_ms: None,
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    timing::DEFAULT_TICK_INTERVAL_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    #[serde(default = "default_warning_repeat")]
    pub warning_repeat: u32,
    #[serde(default = "default_critical_repeat")]
    pub critical_repeat: u32,
    #[serde(default = "default_emergency_repeat")]
    pub emergency_repeat: u32,
    #[serde(default = "default_read_fail_threshold")]
    pub read_fail_threshold: u32,
}

impl ThresholdPolicy {
    pub fn repeat(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Warning => self.warning_repeat,
            Severity::Critical => self.critical_repeat,
            Severity::Emergency => self.emergency_repeat,
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            warning_repeat: default_warning_repeat(),
            critical_repeat: default_critical_repeat(),
            emergency_repeat: default_emergency_repeat(),
            read_fail_threshold: default_read_fail_threshold(),
        }
    }
}

fn default_warning_repeat() -> u32 {
    thresholds::DEFAULT_WARNING_REPEAT
}

fn default_critical_repeat() -> u32 {
    thresholds::DEFAULT_CRITICAL_REPEAT
}

fn default_emergency_repeat() -> u32 {
    thresholds::DEFAULT_EMERGENCY_REPEAT
}

fn default_read_fail_threshold() -> u32 {
    thresholds::DEFAULT_READ_FAIL
}

// ============================================================================
// Inventory
// ============================================================================

/// One temperature channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Fixed correction added to every valid reading
    #[serde(default)]
    pub offset: MilliCelsius,
    #[serde(default)]
    pub warning: Option<MilliCelsius>,
    #[serde(default)]
    pub critical: Option<MilliCelsius>,
    #[serde(default)]
    pub emergency: Option<MilliCelsius>,
    /// Ignored channels are sampled but never escalate
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub input_path: Option<PathBuf>,
}

impl ChannelConfig {
    pub fn threshold(&self, severity: Severity) -> Option<MilliCelsius> {
        match severity {
            Severity::Warning => self.warning,
            Severity::Critical => self.critical,
            Severity::Emergency => self.emergency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanConfig {
    pub name: String,
    #[serde(default = "default_rotors")]
    pub rotors: usize,
    #[serde(default)]
    pub presence_path: Option<PathBuf>,
    /// One speed/status file per rotor
    #[serde(default)]
    pub rotor_paths: Vec<PathBuf>,
    #[serde(default)]
    pub pwm_path: Option<PathBuf>,
    #[serde(default)]
    pub part_number_path: Option<PathBuf>,
    /// Parked fans are always driven to 0 and excluded from fault checks
    #[serde(default)]
    pub parked: bool,
}

impl FanConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rotors: default_rotors(),
            presence_path: None,
            rotor_paths: Vec::new(),
            pwm_path: None,
            part_number_path: None,
            parked: false,
        }
    }
}

fn default_rotors() -> usize {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PsuConfig {
    pub name: String,
    #[serde(default)]
    pub presence_path: Option<PathBuf>,
    #[serde(default)]
    pub status_path: Option<PathBuf>,
    #[serde(default)]
    pub pwm_path: Option<PathBuf>,
    #[serde(default)]
    pub part_number_path: Option<PathBuf>,
}

impl PsuConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// A point on a temperature to duty curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub temp: MilliCelsius,
    pub duty: u8,
}

impl CurvePoint {
    pub fn new(temp_c: f64, duty: u8) -> Self {
        Self {
            temp: MilliCelsius::from_celsius(temp_c),
            duty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurveShape {
    /// Straight-line interpolation between points
    #[default]
    Linear,
    /// Step curve holding each point's duty until the next point
    Piecewise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenLoopConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Primary channel driving the curve
    pub channel: String,
    #[serde(default)]
    pub shape: CurveShape,
    pub points: Vec<CurvePoint>,
    /// Output when the primary reading is unavailable; defaults to `max_pwm`
    #[serde(default)]
    pub floor_duty: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HysteresisConfig {
    pub channel: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub points: Vec<CurvePoint>,
    #[serde(default = "default_deadband")]
    pub deadband: MilliCelsius,
}

fn default_deadband() -> MilliCelsius {
    MilliCelsius(2000)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidConfig {
    pub channel: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub kp: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default)]
    pub kd: f64,
    pub target: MilliCelsius,
    /// Output while the channel has no usable sample; defaults to `max_pwm`
    #[serde(default)]
    pub invalid_duty: Option<u8>,
}

// ============================================================================
// Abnormal conditions and airflow
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbnormalPolicy {
    #[serde(default = "default_fan_absent")]
    pub fan_absent_threshold: u32,
    #[serde(default = "default_psu_absent")]
    pub psu_absent_threshold: u32,
    #[serde(default = "default_psu_fault")]
    pub psu_fault_threshold: u32,
    #[serde(default = "default_rotor_stall_ticks")]
    pub rotor_stall_ticks: u32,
}

impl Default for AbnormalPolicy {
    fn default() -> Self {
        Self {
            fan_absent_threshold: default_fan_absent(),
            psu_absent_threshold: default_psu_absent(),
            psu_fault_threshold: default_psu_fault(),
            rotor_stall_ticks: default_rotor_stall_ticks(),
        }
    }
}

fn default_fan_absent() -> u32 {
    abnormal::DEFAULT_FAN_ABSENT
}

fn default_psu_absent() -> u32 {
    abnormal::DEFAULT_PSU_ABSENT
}

fn default_psu_fault() -> u32 {
    abnormal::DEFAULT_PSU_FAULT
}

fn default_rotor_stall_ticks() -> u32 {
    abnormal::DEFAULT_ROTOR_STALL_TICKS
}

/// Pair of ambient channels that should track each other
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergenceConfig {
    pub primary: String,
    pub secondary: String,
    pub delta: MilliCelsius,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirflowDuty {
    pub correct: u8,
    pub error: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirflowPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub board_airflow_path: Option<PathBuf>,
    #[serde(default = "default_airflow_correct")]
    pub correct_duty: u8,
    #[serde(default = "default_airflow_error")]
    pub error_duty: u8,
    /// Per-unit replacement for the global correct/error pair
    #[serde(default)]
    pub unit_duties: HashMap<String, AirflowDuty>,
    /// Part number to declared airflow
    #[serde(default)]
    pub part_numbers: HashMap<String, AirflowDirection>,
}

impl AirflowPolicy {
    pub fn duty_for(&self, unit: &str, inconsistent: bool) -> u8 {
        let duty = self.unit_duties.get(unit).copied().unwrap_or(AirflowDuty {
            correct: self.correct_duty,
            error: self.error_duty,
        });
        if inconsistent {
            duty.error
        } else {
            duty.correct
        }
    }
}

impl Default for AirflowPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            board_airflow_path: None,
            correct_duty: default_airflow_correct(),
            error_duty: default_airflow_error(),
            unit_duties: HashMap::new(),
            part_numbers: HashMap::new(),
        }
    }
}

fn default_airflow_correct() -> u8 {
    pwm::DEFAULT_MAX
}

fn default_airflow_error() -> u8 {
    pwm::DEFAULT_MIN
}

// ============================================================================
// Transient overrides
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlugInPolicy {
    #[serde(default = "default_plug_in_duty")]
    pub duty: u8,
    #[serde(default = "default_plug_in_ticks")]
    pub ticks: u32,
}

impl Default for PlugInPolicy {
    fn default() -> Self {
        Self {
            duty: default_plug_in_duty(),
            ticks: default_plug_in_ticks(),
        }
    }
}

fn default_plug_in_duty() -> u8 {
    pwm::DEFAULT_PLUG_IN
}

fn default_plug_in_ticks() -> u32 {
    overrides::DEFAULT_PLUG_IN_TICKS
}

/// Single-fan repair policy
///
/// `tables` is keyed by the faulty fan's name; each table maps fan names to
/// the duty they get while that fan is under repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_repair_ticks")]
    pub ticks: u32,
    #[serde(default)]
    pub tables: HashMap<String, HashMap<String, u8>>,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            ticks: default_repair_ticks(),
            tables: HashMap::new(),
        }
    }
}

fn default_repair_ticks() -> u32 {
    overrides::DEFAULT_REPAIR_TICKS
}

// ============================================================================
// Safety escalation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyPolicy {
    #[serde(default = "default_critical_hold_secs")]
    pub critical_hold_secs: u64,
    #[serde(default = "default_emergency_hold_secs")]
    pub emergency_hold_secs: u64,
    /// Channel that alone may trigger a reboot once above critical
    #[serde(default)]
    pub switch_channel: Option<String>,
    /// Channels that trigger a reboot when all are above emergency
    #[serde(default)]
    pub emergency_group: Vec<String>,
    #[serde(default = "default_poll_count")]
    pub poll_count: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_marker_path")]
    pub marker_path: PathBuf,
    #[serde(default = "default_reboot_command")]
    pub reboot_command: Vec<String>,
}

impl SafetyPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            critical_hold_secs: default_critical_hold_secs(),
            emergency_hold_secs: default_emergency_hold_secs(),
            switch_channel: None,
            emergency_group: Vec::new(),
            poll_count: default_poll_count(),
            poll_interval_secs: default_poll_interval_secs(),
            marker_path: default_marker_path(),
            reboot_command: default_reboot_command(),
        }
    }
}

fn default_critical_hold_secs() -> u64 {
    safety::DEFAULT_CRITICAL_HOLD_SECS
}

fn default_emergency_hold_secs() -> u64 {
    safety::DEFAULT_EMERGENCY_HOLD_SECS
}

fn default_poll_count() -> u32 {
    safety::DEFAULT_POLL_COUNT
}

fn default_poll_interval_secs() -> u64 {
    safety::DEFAULT_POLL_INTERVAL_SECS
}

fn default_marker_path() -> PathBuf {
    PathBuf::from(paths::REBOOT_MARKER)
}

fn default_reboot_command() -> Vec<String> {
    safety::DEFAULT_REBOOT_COMMAND
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_policy_gets_defaults() {
        let policy: Policy = serde_json::from_str(r#"{"channels": [{"name": "SWITCH_TEMP"}]}"#).unwrap();
        assert_eq!(policy.pwm.min_pwm, 0x80);
        assert_eq!(policy.pwm.max_pwm, 0xff);
        assert_eq!(policy.pwm.warning_duty(), policy.pwm.abnormal_duty);
        assert_eq!(policy.thresholds.critical_repeat, 3);
        assert_eq!(policy.timing.tick_interval(), Duration::from_secs(5));
        assert!(policy.airflow.enabled);
        assert!(!policy.repair.enabled);
        assert_eq!(policy.channels[0].offset, MilliCelsius(0));
        assert!(policy.channels[0].critical.is_none());
    }

    #[test]
    fn test_curve_shape_and_airflow_parse() {
        let json = r#"{
            "open_loop": {"channel": "INLET", "shape": "piecewise",
                          "points": [{"temp": 30000, "duty": 128}]},
            "airflow": {"part_numbers": {"FAN-24K-F": "F2B", "FAN-24K-R": "B2F"}}
        }"#;
        let policy: Policy = serde_json::from_str(json).unwrap();
        let open_loop = policy.open_loop.unwrap();
        assert_eq!(open_loop.shape, CurveShape::Piecewise);
        assert!(open_loop.enabled);
        assert_eq!(policy.airflow.part_numbers["FAN-24K-R"], AirflowDirection::B2F);
    }

    #[test]
    fn test_airflow_unit_override() {
        let mut airflow = AirflowPolicy {
            correct_duty: 0xc0,
            error_duty: 0x90,
            ..Default::default()
        };
        airflow
            .unit_duties
            .insert("PSU1".to_string(), AirflowDuty { correct: 0xa0, error: 0x80 });
        assert_eq!(airflow.duty_for("FAN1", false), 0xc0);
        assert_eq!(airflow.duty_for("FAN1", true), 0x90);
        assert_eq!(airflow.duty_for("PSU1", true), 0x80);
    }

    #[test]
    fn test_tick_interval_floor() {
        let timing = TimingPolicy { tick_interval_secs: 0, presence_poll_ms: Some(10) };
        assert_eq!(timing.tick_interval(), Duration::from_secs(1));
        assert_eq!(timing.presence_poll(), Some(Duration::from_millis(200)));
    }
}
