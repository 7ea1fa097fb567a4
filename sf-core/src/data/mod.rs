//! Data types, policy model, loading and validation
//!
//! Everything the controller reads from disk or shares with collaborators.

pub mod persistence;
pub mod policy;
pub mod sample;
pub mod types;
pub mod validation;

pub use persistence::{load_policy, parse_policy, write_marker};
pub use policy::{
    AbnormalPolicy, AirflowDuty, AirflowPolicy, ChannelConfig, CurvePoint, CurveShape,
    DivergenceConfig, FanConfig, HysteresisConfig, OpenLoopConfig, PidConfig, PlugInPolicy,
    Policy, PsuConfig, PwmPolicy, RepairPolicy, SafetyPolicy, ThresholdPolicy, TimingPolicy,
};
pub use sample::{ChannelSample, FanSample, PsuSample, RotorSample, TickSample};
pub use types::{AirflowDirection, FanId, MilliCelsius, Reading, Severity};
pub use validation::{validate_curve_points, validate_file_size, validate_policy};
