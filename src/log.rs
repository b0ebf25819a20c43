//! Structured logging for debugging agentflow.
//!
//! Log levels:
//! - ERROR: Checkpoint writes that failed
//! - WARN: Item failures, skips, observer panics and aggregation refusals
//! - INFO: Run start and finish
//! - DEBUG: Per-item transitions, config loading, conflicts found
//! - TRACE: Dropped channel events
//!
//! Output goes to `~/.agentflow/agentflow.log`, truncated on startup. The
//! filter comes from `AGENTFLOW_LOG` when set (same syntax as `RUST_LOG`);
//! otherwise debug mode, enabled with `init_with_debug(true)` or
//! `AGENTFLOW_DEBUG=1`, selects `debug` over `info`.

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Environment variable holding a full filter directive.
pub const LOG_ENV: &str = "AGENTFLOW_LOG";

/// Environment variable enabling debug mode.
pub const DEBUG_ENV: &str = "AGENTFLOW_DEBUG";

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize logging to ~/.agentflow/agentflow.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Safe to call more than once; only the first subscriber is installed.
/// Library users who install their own subscriber need not call this.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_debug();
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let Some(file) = open_log_file() else {
        return;
    };

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| default_filter(debug_enabled));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init();

    if installed.is_ok() {
        tracing::info!(debug = debug_enabled, "logging initialized");
    }
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

fn env_debug() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { "agentflow=debug" } else { "agentflow=info" })
}

fn open_log_file() -> Option<File> {
    let dir = Config::agentflow_dir().ok()?;
    std::fs::create_dir_all(&dir).ok()?;
    // File::create truncates
    File::create(dir.join("agentflow.log")).ok()
}
