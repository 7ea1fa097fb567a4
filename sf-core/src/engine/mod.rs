//! Thermal control engine
//!
//! Pure decision logic: thresholds, strategies, abnormal floors, airflow,
//! arbitration and safety escalation, tied together by `Controller`.

pub mod abnormal;
pub mod airflow;
pub mod arbitrator;
pub mod controller;
pub mod curve;
pub mod escalation;
pub mod hysteresis;
pub mod pid;
pub mod threshold;
pub mod units;

pub use abnormal::{AbnormalCause, AbnormalReport};
pub use controller::{Controller, ControllerState, TickDecision};
pub use curve::OpenLoopCurve;
pub use escalation::{reboot_trigger, Escalation, EscalationLevel, RebootCheck, RebootStep};
pub use hysteresis::Hysteresis;
pub use pid::Pid;
pub use threshold::{ChannelState, ThresholdTracker};
pub use units::{FanState, PsuState, RotorState};
