//! Unified error handling for switchfan
//!
//! A single error type shared by the controller library and the daemon.
//! Built on thiserror so every variant gets Display and Error impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using SwitchfanError
pub type Result<T> = std::result::Result<T, SwitchfanError>;

/// Unified error type for all switchfan operations
#[derive(thiserror::Error, Debug)]
pub enum SwitchfanError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File too large: {path} ({size} bytes, max {max_size} bytes)")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Failed to read temperature for {channel}: {reason}")]
    SensorRead {
        channel: String,
        reason: String,
    },

    #[error("Failed to read {what} for {unit}: {reason}")]
    InventoryRead {
        unit: String,
        what: &'static str,
        reason: String,
    },

    #[error("Failed to write duty {duty:#04x} to {unit}: {reason}")]
    PwmWrite {
        unit: String,
        duty: u8,
        reason: String,
    },

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    // ============================================================================
    // Policy Errors
    // ============================================================================
    #[error("Failed to parse policy: {0}")]
    PolicyParse(#[from] serde_json::Error),

    #[error("Invalid policy value for {field}: {reason}")]
    InvalidPolicy {
        field: String,
        reason: String,
    },

    #[error("Policy references unknown channel '{0}'")]
    UnknownChannel(String),

    // ============================================================================
    // Safety Errors
    // ============================================================================
    #[error("Reboot request failed: {0}")]
    Reboot(String),

    #[error("{0}")]
    Generic(String),
}

impl SwitchfanError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a policy validation error
    pub fn invalid_policy(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a sensor read error
    pub fn sensor(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SensorRead {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Create an inventory read error
    pub fn inventory(unit: impl Into<String>, what: &'static str, reason: impl Into<String>) -> Self {
        Self::InventoryRead {
            unit: unit.into(),
            what,
            reason: reason.into(),
        }
    }

    /// Create a PWM write error
    pub fn pwm_write(unit: impl Into<String>, duty: u8, reason: impl Into<String>) -> Self {
        Self::PwmWrite {
            unit: unit.into(),
            duty,
            reason: reason.into(),
        }
    }
}
