//! Switchfan Core Library
//!
//! Adaptive fan and thermal control for network-switch chassis.
//!
//! # Features
//!
//! - **Threshold Tracking**: Per-channel warning/critical/emergency counters with read-failure tracking
//! - **Control Strategies**: Open-loop curves, hysteresis bands and incremental PID
//! - **Abnormal Detection**: Fan/PSU absence, rotor stall, PSU faults, sensor divergence
//! - **Airflow Safety**: Per-unit duty tables when a unit blows against the board direction
//! - **Safety Escalation**: Sticky critical/emergency levels and reboot checks
//!
//! # Module Structure
//!
//! - `data/` - Policy model, per-tick samples, loading and validation
//! - `engine/` - Decision engine and `Controller`
//! - `hw/` - Collaborator traits, sampling and file primitives
//!
//! # Example
//!
//! ```no_run
//! use sf_core::{load_policy, Controller, TickSample, MilliCelsius};
//! use std::path::Path;
//!
//! let policy = load_policy(Path::new("/etc/switchfan/policy.json")).unwrap();
//! let mut controller = Controller::new(policy.clone()).unwrap();
//!
//! let decision = controller.tick(&TickSample::nominal(&policy, MilliCelsius(45000)));
//! println!("duty {:#04x}", decision.scalar);
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod error;

// Re-export primary types from data/
pub use data::{
    AirflowDirection, ChannelConfig, ChannelSample, CurvePoint, CurveShape, FanConfig, FanId,
    FanSample, MilliCelsius, Policy, PsuConfig, PsuSample, Reading, RotorSample, Severity,
    TickSample,
};

// Re-export policy functions from data/
pub use data::{load_policy, parse_policy, validate_policy, write_marker};

// Re-export error types
pub use error::{Result, SwitchfanError};

// Re-export engine types
pub use engine::{
    AbnormalCause, Controller, ControllerState, EscalationLevel, RebootStep, TickDecision,
};

// Re-export collaborator traits from hw/
pub use hw::{
    sample_presence, sample_tick, Actuator, AirflowSource, Collaborators, FanInventory,
    PsuInventory, SensorSource, SystemControl,
};
