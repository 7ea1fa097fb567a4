//! Constants and policy defaults for switchfan
//!
//! Centralizes the magic numbers the controller falls back to when a policy
//! file leaves a field out. Add new defaults here rather than inline.

use std::time::Duration;

/// Filesystem locations used by the daemon
pub mod paths {
    /// Default policy file
    pub const POLICY_FILE: &str = "/etc/switchfan/policy.json";

    /// Default reboot-cause marker written before a thermal reboot
    pub const REBOOT_MARKER: &str = "/etc/.reboot/.thermal_reboot_cause";

    /// Daemon PID file
    pub const PID_FILE: &str = "/run/switchfand.pid";

    /// journald socket, used to decide between journald and stdout logging
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Duty cycle constants (8-bit PWM)
pub mod pwm {
    /// Value reserved for units that are intentionally parked
    pub const PARKED: u8 = 0;

    /// Default lower bound for every emitted duty (50%)
    pub const DEFAULT_MIN: u8 = 0x80;

    /// Default upper bound for every emitted duty (100%)
    pub const DEFAULT_MAX: u8 = 0xff;

    /// Default floor applied on abnormal-but-not-fatal conditions
    pub const DEFAULT_ABNORMAL: u8 = 0xc0;

    /// Default plug-in duty for a freshly reinserted fan
    pub const DEFAULT_PLUG_IN: u8 = 0xc0;

    /// Convert an 8-bit duty to a percentage, for logging
    #[inline]
    pub fn to_percent(value: u8) -> f32 {
        (value as f32 / 255.0) * 100.0
    }
}

/// Temperature constants
pub mod temperature {
    /// Readings are millidegrees Celsius; divide by this for Celsius
    pub const MILLIDEGREE_DIVISOR: f64 = 1000.0;
}

/// Threshold tracker defaults
pub mod thresholds {
    /// Consecutive samples before a warning becomes active
    pub const DEFAULT_WARNING_REPEAT: u32 = 3;

    /// Consecutive samples before a critical becomes active
    pub const DEFAULT_CRITICAL_REPEAT: u32 = 3;

    /// Consecutive samples before an emergency becomes active
    pub const DEFAULT_EMERGENCY_REPEAT: u32 = 3;

    /// Consecutive read failures before the abnormal floor applies
    pub const DEFAULT_READ_FAIL: u32 = 3;
}

/// Abnormal condition defaults
pub mod abnormal {
    /// Absent fans needed to force maximum duty
    pub const DEFAULT_FAN_ABSENT: u32 = 1;

    /// Absent PSUs needed to force maximum duty
    pub const DEFAULT_PSU_ABSENT: u32 = 1;

    /// Faulted PSUs needed to force maximum duty
    pub const DEFAULT_PSU_FAULT: u32 = 1;

    /// Consecutive ticks a rotor may stay stopped before it counts as faulted
    pub const DEFAULT_ROTOR_STALL_TICKS: u32 = 3;
}

/// Loop timing
pub mod timing {
    use super::*;

    /// Default interval between full ticks
    pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;

    /// Lower bound for the tick interval
    pub const MIN_TICK_INTERVAL: Duration = Duration::from_secs(1);

    /// Lower bound for the presence sub-tick
    pub const MIN_PRESENCE_POLL: Duration = Duration::from_millis(200);

    /// Consecutive failed ticks before the error is logged again
    pub const LOG_EVERY_N_ERRORS: u32 = 10;
}

/// Transient override defaults
pub mod overrides {
    /// Ticks a reinserted fan stays at the plug-in duty
    pub const DEFAULT_PLUG_IN_TICKS: u32 = 3;

    /// Ticks a single faulty fan may run on its repair table
    pub const DEFAULT_REPAIR_TICKS: u32 = 12;
}

/// Safety escalation defaults
pub mod safety {
    /// Seconds a critical condition stays sticky after it clears
    pub const DEFAULT_CRITICAL_HOLD_SECS: u64 = 60;

    /// Seconds an emergency condition stays sticky after it clears
    pub const DEFAULT_EMERGENCY_HOLD_SECS: u64 = 60;

    /// Polls performed by a reboot check before the reboot is requested
    pub const DEFAULT_POLL_COUNT: u32 = 3;

    /// Seconds between reboot-check polls
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

    /// Command used to reboot the system
    pub const DEFAULT_REBOOT_COMMAND: &[&str] = &["/sbin/reboot"];
}

/// Size limits
pub mod limits {
    /// Maximum policy file size (1MB)
    pub const MAX_POLICY_SIZE: u64 = 1024 * 1024;

    /// Maximum number of points in any curve or table
    pub const MAX_CURVE_POINTS: usize = 32;

    /// Longest tick, presence or reboot poll interval (1 hour)
    pub const MAX_INTERVAL_SECS: u64 = 3600;
}
