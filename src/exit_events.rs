use agent_pro_desktop::{
    exit_cleanup::{self, ExitTrigger},
    shutdown_state::{decide_exit_requested_flow, ExitRequestedDecision},
    RelayChannel,
};
use tauri::{AppHandle, Emitter, Manager, Window};

use crate::{append_shutdown_log, DesktopState};

/// Apps on macOS outlive their last window.
const STAY_RESIDENT_WITHOUT_WINDOWS: bool = cfg!(target_os = "macos");

/// Main window is going away: tell the page, then stop the backend off the
/// main thread. The app itself keeps running until the runtime asks to exit.
pub fn handle_main_window_close(window: &Window) {
    let app_handle = window.app_handle();
    let state = app_handle.state::<DesktopState>();
    if state.shutdown.is_quitting() {
        return;
    }

    match state.relay.outbound(RelayChannel::AppClosing) {
        Ok(event_name) => {
            if let Err(error) = window.emit(event_name, ()) {
                append_shutdown_log(&format!("failed to emit {event_name}: {error}"));
            }
        }
        Err(rejection) => append_shutdown_log(&format!("app-closing not sent: {rejection}")),
    }

    append_shutdown_log("main window closing, stopping backend");
    let app_handle_cloned = app_handle.clone();
    tauri::async_runtime::spawn_blocking(move || {
        let state = app_handle_cloned.state::<DesktopState>();
        exit_cleanup::stop_backend_for_exit(
            &state.supervisor,
            ExitTrigger::WindowClosed,
            append_shutdown_log,
        );
    });
}

pub fn handle_exit_requested(
    app_handle: &AppHandle,
    code: Option<i32>,
    api: &tauri::ExitRequestApi,
) {
    let state = app_handle.state::<DesktopState>();
    match decide_exit_requested_flow(
        state.shutdown.take_exit_request_allowance(),
        code,
        STAY_RESIDENT_WITHOUT_WINDOWS,
    ) {
        ExitRequestedDecision::AllowImmediateExit => {
            append_shutdown_log("exit request allowed to pass through after backend cleanup");
            return;
        }
        ExitRequestedDecision::StayResident => {
            append_shutdown_log("last window closed, staying resident");
            api.prevent_exit();
            return;
        }
        ExitRequestedDecision::RunBackendCleanupFirst => {}
    }
    // Exit is re-issued once the backend tree is down.
    api.prevent_exit();
    state.shutdown.mark_quitting();
    if !exit_cleanup::try_begin_exit_cleanup(
        &state.shutdown,
        ExitTrigger::ExitRequested,
        append_shutdown_log,
    ) {
        return;
    }

    let exit_code = code.unwrap_or(0);
    append_shutdown_log(&format!(
        "exit requested (code {exit_code}), stopping backend asynchronously"
    ));
    let app_handle_cloned = app_handle.clone();
    tauri::async_runtime::spawn_blocking(move || {
        let state = app_handle_cloned.state::<DesktopState>();
        exit_cleanup::stop_backend_for_exit(
            &state.supervisor,
            ExitTrigger::ExitRequested,
            append_shutdown_log,
        );
        state.shutdown.allow_next_exit_request();
        app_handle_cloned.exit(exit_code);
    });
}

pub fn handle_exit_event(app_handle: &AppHandle) {
    let state = app_handle.state::<DesktopState>();
    if !exit_cleanup::try_begin_exit_cleanup(
        &state.shutdown,
        ExitTrigger::ExitFallback,
        append_shutdown_log,
    ) {
        return;
    }

    append_shutdown_log("exit event triggered fallback backend cleanup");
    exit_cleanup::stop_backend_for_exit(
        &state.supervisor,
        ExitTrigger::ExitFallback,
        append_shutdown_log,
    );
}
