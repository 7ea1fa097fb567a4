//! Switchfan Daemon (switchfand)
//!
//! Chassis fan and thermal control for network switches. Reads the policy
//! once at startup, then runs the control loop until SIGINT/SIGTERM or a
//! thermal reboot.
//!
//! # Modes
//! - **Daemon** (default): continuous control, PID file, signal handling
//! - **`--check`**: validate the policy and print a summary
//! - **`--once`**: run a single tick and print the decision
//! - **`--dry-run`**: sample hardware but never write PWM or reboot
//!
//! # Exit Behavior
//! - Shutdown leaves every non-parked unit at `max_pwm`
//! - A failed reboot request drops the check; control continues

mod fan_control;
mod platform;
mod report;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, error, info, warn};

use sf_core::constants::paths;
use sf_core::{load_policy, Controller};

use crate::fan_control::{ControlLoop, LoopExit};
use crate::platform::SysfsPlatform;
use crate::report::{DecisionReport, PolicySummary};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable consulted when `--log-level` is absent
const LOG_ENV: &str = "SWITCHFAN_LOG";

/// Global shutdown flag for clean termination
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "switchfand", version, about = "Switch chassis fan and thermal control daemon")]
struct Args {
    /// Policy file
    #[arg(short, long, default_value = paths::POLICY_FILE)]
    policy: PathBuf,

    /// Validate the policy, print a summary and exit
    #[arg(long)]
    check: bool,

    /// Run a single tick, print the decision and exit
    #[arg(long)]
    once: bool,

    /// Sample hardware but never write PWM values or reboot
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

// ============================================================================
// Logging
// ============================================================================

/// `--log-level`, then `SWITCHFAN_LOG`, then `info`
fn resolve_log_level(cli: Option<&str>) -> String {
    cli.map(str::to_string)
        .or_else(|| std::env::var(LOG_ENV).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "info".to_string())
}

/// Initialize tracing; returns true when logging to the journal
fn init_logging(log_level: &str) -> bool {
    if Path::new(paths::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

// ============================================================================
// Privileges
// ============================================================================

fn verify_privileges() -> anyhow::Result<()> {
    // SAFETY: geteuid only returns the effective user ID.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        bail!("switchfand must run as root (euid=0) to write PWM values; use --dry-run otherwise");
    }
    Ok(())
}

// ============================================================================
// PID File Management
// ============================================================================

/// PID recorded in `path` if that process is still alive
///
/// Two switchfand instances would fight over the same PWM files, so a live
/// owner blocks startup. Anything else in the file (garbage, a non-positive
/// value, an exited process) is a leftover from a crash or power loss.
fn live_pid_owner(path: &Path) -> Option<i32> {
    let pid = std::fs::read_to_string(path).ok()?.trim().parse::<i32>().ok()?;
    // SAFETY: signal 0 only checks that the process exists.
    (pid > 0 && unsafe { libc::kill(pid, 0) } == 0).then_some(pid)
}

/// Claim the PID file, replacing a stale one
fn write_pid_file(path: &Path) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if let Some(owner) = live_pid_owner(path) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            format!("switchfand already controls the fans (PID {})", owner),
        ));
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale PID file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    debug!("PID file written: {}", path.display());
    Ok(())
}

fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove PID file: {}", e);
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // PHASE 0: Log panics before unwinding
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        eprintln!("PANIC at {}: {}", location, panic_info);
    }));

    // PHASE 1: Arguments and logging
    let args = Args::parse();
    let log_level = resolve_log_level(args.log_level.as_deref());
    let use_journald = init_logging(&log_level);

    info!("STARTUP: switchfand {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });

    // PHASE 2: Policy
    let policy = load_policy(&args.policy)
        .with_context(|| format!("loading policy {}", args.policy.display()))?;

    if args.check {
        let summary = serde_json::to_string_pretty(&PolicySummary::new(&policy))?;
        println!("{}", summary);
        info!("STARTUP: Policy {} is valid", args.policy.display());
        return Ok(());
    }

    let controller = Controller::new(policy.clone()).context("building controller")?;
    let platform = SysfsPlatform::new(&policy, args.dry_run);
    if platform.dry_run() {
        info!("STARTUP: Dry run, PWM writes and reboot are disabled");
    }

    // PHASE 3: Privileges
    if !args.dry_run {
        verify_privileges()?;
    }

    let mut control = ControlLoop::new(controller, &platform);

    if args.once {
        let decision = control.run_tick();
        let report = serde_json::to_string_pretty(&DecisionReport::new(&policy, &decision))?;
        println!("{}", report);
        return Ok(());
    }

    // PHASE 4: PID file (detect other instances)
    let pid_file = Path::new(paths::PID_FILE);
    write_pid_file(pid_file).context("writing PID file")?;

    // PHASE 5: Signal handlers
    if let Err(e) = ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    info!("STARTUP: PID: {}", std::process::id());
    info!("STARTUP: Policy: {}", args.policy.display());
    info!("STARTUP: Log level: {}", log_level);

    // PHASE 6: Control loop
    let exit = control.run(&SHUTDOWN).await;

    // PHASE 7: Cleanup
    remove_pid_file(pid_file);
    match exit {
        LoopExit::Shutdown => info!("SHUTDOWN: Daemon terminated gracefully"),
        LoopExit::Rebooting { cause } => error!("SHUTDOWN: Exiting for thermal reboot: {}", cause),
    }

    Ok(())
}
