//! Safety escalation
//!
//! # Levels
//!
//! `Normal -> Warning -> Critical -> Emergency -> ShutdownPending`
//!
//! Critical and emergency are sticky: activation (re)starts a countdown in
//! seconds and the level stays raised until it runs out, even when the raw
//! counters have reset.
//!
//! # Reboot check
//!
//! When the reboot trigger holds at Critical or above, a `RebootCheck` is
//! started. The driver keeps fans at maximum, sleeps `poll_interval`, re-samples
//! and feeds the trigger back in. The check never sleeps itself, so the tick
//! pipeline stays deterministic.

use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::data::policy::SafetyPolicy;
use crate::data::types::Severity;
use crate::engine::threshold::ThresholdTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EscalationLevel {
    Normal,
    Warning,
    Critical,
    Emergency,
    ShutdownPending,
}

impl EscalationLevel {
    /// Critical or above: every unit runs at maximum
    pub fn forces_max(self) -> bool {
        self >= Self::Critical
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
            Self::ShutdownPending => "shutdown-pending",
        };
        f.write_str(s)
    }
}

/// Sticky countdowns for critical and emergency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    critical_hold: u64,
    emergency_hold: u64,
    critical_remaining: u64,
    emergency_remaining: u64,
}

impl Escalation {
    pub fn new(policy: &SafetyPolicy) -> Self {
        Self {
            critical_hold: policy.critical_hold_secs,
            emergency_hold: policy.emergency_hold_secs,
            critical_remaining: 0,
            emergency_remaining: 0,
        }
    }

    pub fn critical_remaining(&self) -> u64 {
        self.critical_remaining
    }

    pub fn emergency_remaining(&self) -> u64 {
        self.emergency_remaining
    }

    /// Advance by one tick of `elapsed_secs` and return the resulting level
    pub fn update(&mut self, tracker: &ThresholdTracker, elapsed_secs: u64) -> EscalationLevel {
        self.critical_remaining = self.critical_remaining.saturating_sub(elapsed_secs);
        self.emergency_remaining = self.emergency_remaining.saturating_sub(elapsed_secs);

        let critical = tracker.is_active(Severity::Critical);
        let emergency = tracker.is_active(Severity::Emergency);
        if critical {
            self.critical_remaining = self.critical_hold;
        }
        if emergency {
            self.emergency_remaining = self.emergency_hold;
        }

        if emergency || self.emergency_remaining > 0 {
            EscalationLevel::Emergency
        } else if critical || self.critical_remaining > 0 {
            EscalationLevel::Critical
        } else if tracker.is_active(Severity::Warning) {
            EscalationLevel::Warning
        } else {
            EscalationLevel::Normal
        }
    }

    /// Restart both countdowns at their full value
    pub fn reset_countdowns(&mut self) {
        self.critical_remaining = self.critical_hold;
        self.emergency_remaining = self.emergency_hold;
    }
}

/// Evaluate the reboot trigger on the current temperatures
///
/// Returns a human-readable cause when any of these holds:
/// - every non-ignored channel with a critical threshold is at or above it
/// - the switch channel is at or above critical
/// - every channel of the emergency group is at or above emergency
pub fn reboot_trigger(tracker: &ThresholdTracker, policy: &SafetyPolicy) -> Option<String> {
    let mut critical_channels = tracker
        .channels()
        .iter()
        .filter(|c| !c.is_ignored() && c.config().critical.is_some())
        .peekable();
    if critical_channels.peek().is_some()
        && critical_channels.all(|c| c.at_or_above(Severity::Critical))
    {
        return Some("all monitored channels above critical".to_string());
    }

    if let Some(switch) = &policy.switch_channel {
        if let Some(channel) = tracker.by_name(switch) {
            if channel.at_or_above(Severity::Critical) {
                let temp = channel.temp().map(|t| t.to_string()).unwrap_or_default();
                return Some(format!("{} above critical ({})", switch, temp));
            }
        }
    }

    if !policy.emergency_group.is_empty()
        && policy.emergency_group.iter().all(|name| {
            tracker
                .by_name(name)
                .is_some_and(|c| c.at_or_above(Severity::Emergency))
        })
    {
        return Some(format!(
            "{} all above emergency",
            policy.emergency_group.join(", ")
        ));
    }

    None
}

/// Outcome of one reboot-check poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootStep {
    /// Trigger still holds; poll again after the interval
    Continue,
    /// Trigger held through every poll
    Reboot { cause: String },
    /// Trigger cleared
    Stabilized,
}

/// A reboot check in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootCheck {
    cause: String,
    polls_done: u32,
    poll_count: u32,
    poll_interval: Duration,
}

impl RebootCheck {
    pub fn new(cause: String, policy: &SafetyPolicy) -> Self {
        Self {
            cause,
            polls_done: 0,
            poll_count: policy.poll_count,
            poll_interval: policy.poll_interval(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn polls_done(&self) -> u32 {
        self.polls_done
    }

    /// Feed the trigger evaluated on a fresh sample
    pub fn poll(&mut self, trigger: Option<String>) -> RebootStep {
        let Some(cause) = trigger else {
            info!(
                "Thermal condition stabilized after {} of {} polls",
                self.polls_done, self.poll_count
            );
            return RebootStep::Stabilized;
        };

        self.polls_done += 1;
        self.cause = cause;
        warn!(
            "Reboot check poll {}/{}: {}",
            self.polls_done, self.poll_count, self.cause
        );

        if self.polls_done >= self.poll_count {
            RebootStep::Reboot {
                cause: self.cause.clone(),
            }
        } else {
            RebootStep::Continue
        }
    }
}
