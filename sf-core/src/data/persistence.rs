//! Policy loading and reboot-cause marker persistence
//!
//! The policy is read once at startup. The marker is the only file the
//! controller ever writes, right before a thermal reboot.

use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::data::policy::Policy;
use crate::data::validation::{validate_file_size, validate_policy};
use crate::error::{Result, SwitchfanError};

/// Load, parse and validate a policy file
pub fn load_policy(path: &Path) -> Result<Policy> {
    validate_file_size(path)?;

    let contents = fs::read_to_string(path).map_err(|e| SwitchfanError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let policy = parse_policy(&contents)?;

    info!(
        "Loaded policy from {:?}: {} channels, {} fans, {} psus",
        path,
        policy.channels.len(),
        policy.fans.len(),
        policy.psus.len()
    );
    Ok(policy)
}

/// Parse and validate policy JSON already in memory
pub fn parse_policy(contents: &str) -> Result<Policy> {
    let policy: Policy = serde_json::from_str(contents)?;
    validate_policy(&policy)?;
    Ok(policy)
}

/// Write the reboot-cause marker atomically (temp file, fsync, rename)
pub fn write_marker(path: &Path, cause: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SwitchfanError::FileWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path).map_err(|e| SwitchfanError::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;

    writeln!(file, "{}", cause).map_err(|e| SwitchfanError::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;

    file.sync_all().map_err(|e| SwitchfanError::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;

    drop(file);

    fs::rename(&temp_path, path).map_err(|e| SwitchfanError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Wrote reboot marker {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"{
        "channels": [{"name": "SWITCH_TEMP", "critical": 73000}],
        "fans": [{"name": "FAN1"}, {"name": "FAN2"}]
    }"#;

    #[test]
    fn test_load_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        fs::write(&path, MINIMAL).unwrap();

        let policy = load_policy(&path).unwrap();
        assert_eq!(policy.fans.len(), 2);
        assert_eq!(policy.channels[0].critical.map(|t| t.0), Some(73000));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_policy(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SwitchfanError::FileRead { .. }));
    }

    #[test]
    fn test_load_rejects_invalid_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        fs::write(&path, r#"{"pwm": {"min_pwm": 200, "max_pwm": 100}}"#).unwrap();

        let err = load_policy(&path).unwrap_err();
        assert!(matches!(err, SwitchfanError::InvalidPolicy { .. }));
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        fs::write(&path, "{ channels: ").unwrap();

        let err = load_policy(&path).unwrap_err();
        assert!(matches!(err, SwitchfanError::PolicyParse(_)));
    }

    #[test]
    fn test_write_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reboot").join(".thermal_reboot_cause");

        write_marker(&path, "SWITCH_TEMP above critical").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "SWITCH_TEMP above critical");
        assert!(!path.with_extension("tmp").exists());
    }
}
