//! Desktop host for the AI Agent Pro backend.
//!
//! The library holds everything that does not need a window: the backend
//! supervisor and its readiness prober, process-tree control, the page
//! message relay and the shutdown bookkeeping. The `desktop` binary wires
//! these into a Tauri window.

pub mod backend_config;
pub mod backend_http;
pub mod backend_path;
pub mod backend_process;
pub mod exit_cleanup;
pub mod http_response;
pub mod launch_plan;
pub mod logging;
pub mod origin_policy;
pub mod process_control;
pub mod readiness;
pub mod relay;
pub mod session_store;
pub mod shutdown_state;
pub mod supervisor;
pub mod supervisor_state;

use std::sync::atomic::{AtomicBool, Ordering};

pub use backend_config::SupervisorConfig;
pub use launch_plan::LaunchPlan;
pub use logging::{DesktopLogCategory, FileLogSink, LogSink, OutputStream};
pub use relay::{MessageRelay, RelayChannel, RelayHost, RelayOutcome};
pub use supervisor::{BackendSupervisor, ExitObserver, SupervisorError};
pub use supervisor_state::SupervisorState;

pub const APP_TITLE: &str = "AI Agent Pro";
pub const MAIN_WINDOW_LABEL: &str = "main";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000/";
pub const BACKEND_URL_ENV: &str = "AGENT_PRO_BACKEND_URL";
pub const BACKEND_CMD_ENV: &str = "AGENT_PRO_BACKEND_CMD";
pub const BACKEND_CWD_ENV: &str = "AGENT_PRO_BACKEND_CWD";
pub const BACKEND_DIR_ENV: &str = "AGENT_PRO_BACKEND_DIR";
pub const BACKEND_PYTHON_ENV: &str = "AGENT_PRO_PYTHON";
pub const BACKEND_SCRIPT: &str = "main.py";
pub const BACKEND_TIMEOUT_ENV: &str = "AGENT_PRO_BACKEND_TIMEOUT_MS";
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 30_000;
pub const BACKEND_TIMEOUT_MIN_MS: u64 = 1_000;
pub const BACKEND_TIMEOUT_MAX_MS: u64 = 600_000;
pub const BACKEND_READY_POLL_INTERVAL_ENV: &str = "AGENT_PRO_BACKEND_READY_POLL_INTERVAL_MS";
pub const DEFAULT_BACKEND_READY_POLL_INTERVAL_MS: u64 = 250;
pub const BACKEND_READY_POLL_INTERVAL_MIN_MS: u64 = 50;
pub const BACKEND_READY_POLL_INTERVAL_MAX_MS: u64 = 10_000;
pub const BACKEND_READY_PROBE_TIMEOUT_ENV: &str = "AGENT_PRO_BACKEND_READY_PROBE_TIMEOUT_MS";
pub const DEFAULT_BACKEND_READY_PROBE_TIMEOUT_MS: u64 = 800;
pub const BACKEND_READY_PROBE_TIMEOUT_MIN_MS: u64 = 100;
pub const BACKEND_READY_PROBE_TIMEOUT_MAX_MS: u64 = 30_000;
pub const BACKEND_READY_TCP_PROBE_TIMEOUT_MAX_MS: u64 = 1_000;
pub const BACKEND_READY_HTTP_PATH_ENV: &str = "AGENT_PRO_BACKEND_READY_HTTP_PATH";
pub const DEFAULT_BACKEND_READY_HTTP_PATH: &str = "/";
pub const BACKEND_READY_MODE_ENV: &str = "AGENT_PRO_BACKEND_READY_MODE";
pub const GRACEFUL_STOP_TIMEOUT_ENV: &str = "AGENT_PRO_GRACEFUL_STOP_TIMEOUT_MS";
pub const DEFAULT_GRACEFUL_STOP_TIMEOUT_MS: u64 = 5_000;
pub const GRACEFUL_STOP_TIMEOUT_MIN_MS: u64 = 200;
pub const GRACEFUL_STOP_TIMEOUT_MAX_MS: u64 = 60_000;
pub const SERVER_STARTED_MARKER: &str = "Running on http";
pub const DESKTOP_ROOT_ENV: &str = "AGENT_PRO_ROOT";
pub const DESKTOP_LOG_PATH_ENV: &str = "AGENT_PRO_DESKTOP_LOG_PATH";
pub const DESKTOP_EXTRA_PATH_ENV: &str = "AGENT_PRO_DESKTOP_EXTRA_PATH";
pub const DESKTOP_LOG_FILE: &str = "desktop.log";
pub const BACKEND_LOG_FILE: &str = "backend.log";
pub const DESKTOP_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
pub const BACKEND_LOG_MAX_BYTES: u64 = 20 * 1024 * 1024;
pub const LOG_BACKUP_COUNT: usize = 5;
pub const APP_CLOSING_EVENT: &str = "app-closing";

/// Holds an [`AtomicBool`] high for the lifetime of the guard.
pub struct AtomicFlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> AtomicFlagGuard<'a> {
    pub fn try_set(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self { flag })
    }
}

impl Drop for AtomicFlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
