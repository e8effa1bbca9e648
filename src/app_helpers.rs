use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use agent_pro_desktop::{
    launch_plan, FileLogSink, LaunchPlan, LogSink, SupervisorError, BACKEND_SCRIPT,
};
use tauri::{AppHandle, Manager};

static DESKTOP_LOGS: OnceLock<Arc<FileLogSink>> = OnceLock::new();

pub(crate) fn desktop_logs() -> Arc<FileLogSink> {
    DESKTOP_LOGS
        .get_or_init(|| Arc::new(FileLogSink::from_env()))
        .clone()
}

pub(crate) fn append_desktop_log(message: &str) {
    desktop_logs().runtime(message);
}

pub(crate) fn append_startup_log(message: &str) {
    desktop_logs().startup(message);
}

pub(crate) fn append_restart_log(message: &str) {
    desktop_logs().restart(message);
}

pub(crate) fn append_shutdown_log(message: &str) {
    desktop_logs().shutdown(message);
}

/// Backend sources bundled next to the executable, when present.
fn bundled_backend_dir(app_handle: &AppHandle) -> Option<PathBuf> {
    let dir = app_handle.path().resource_dir().ok()?.join("backend");
    dir.join(BACKEND_SCRIPT).is_file().then_some(dir)
}

pub(crate) fn resolve_launch_plan(app_handle: &AppHandle) -> Result<LaunchPlan, SupervisorError> {
    launch_plan::resolve_launch_plan(bundled_backend_dir(app_handle).as_deref())
}
