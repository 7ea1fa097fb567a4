//! Error types for switchfan
//!
//! Re-exported from the shared sf-error crate.

pub use sf_error::{Result, SwitchfanError};
