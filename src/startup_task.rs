use agent_pro_desktop::AtomicFlagGuard;
use tauri::{AppHandle, Manager};

use crate::{append_startup_log, main_window, ui_dispatch, DesktopState};

/// Launch sequence: start the backend, wait for readiness, then open the
/// window. A failed launch shows a blocking error and exits with status 1;
/// no window is ever pointed at an address that is not serving.
pub fn spawn_launch_task(app_handle: AppHandle) {
    let launch_app_handle = app_handle.clone();
    tauri::async_runtime::spawn(async move {
        let worker_handle = launch_app_handle.clone();
        let launch_result = tauri::async_runtime::spawn_blocking(move || {
            let state = worker_handle.state::<DesktopState>();
            let Some(_launch_guard) = AtomicFlagGuard::try_set(&state.is_launching) else {
                append_startup_log("launch already in progress, skip");
                return Ok(false);
            };
            match state.supervisor.launch() {
                Ok(ready) => {
                    append_startup_log(&format!("backend ready for window: pid={}", ready.pid));
                    Ok(true)
                }
                Err(error) => {
                    // Blocking dialog; this is a pool thread, not the main thread.
                    ui_dispatch::show_startup_error(
                        &worker_handle,
                        &error.to_string(),
                        append_startup_log,
                    );
                    Err(error.to_string())
                }
            }
        })
        .await
        .map_err(|error| format!("Backend launch task failed: {error}"))
        .and_then(|result| result);

        match launch_result {
            Ok(true) => {
                let backend_url = launch_app_handle
                    .state::<DesktopState>()
                    .supervisor
                    .config()
                    .backend_url
                    .clone();
                if let Err(error) = ui_dispatch::run_on_main_thread_dispatch(
                    &launch_app_handle,
                    "create main window",
                    move |main_app| {
                        if let Err(create_error) = main_window::create_or_focus_main_window(
                            main_app,
                            &backend_url,
                            append_startup_log,
                        ) {
                            append_startup_log(&create_error);
                            main_app.exit(1);
                        }
                    },
                ) {
                    append_startup_log(&error);
                    launch_app_handle.exit(1);
                }
            }
            Ok(false) => {}
            Err(error) => append_startup_log(&format!("launch aborted: {error}")),
        }
    });
}
