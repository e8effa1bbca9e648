#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app_helpers;
mod desktop_bridge;
mod desktop_bridge_commands;
mod desktop_host;
mod exit_events;
mod main_window;
mod startup_task;
mod ui_dispatch;

use std::sync::{atomic::AtomicBool, Arc};

use agent_pro_desktop::{
    shutdown_state::ShutdownCoordinator, BackendSupervisor, LogSink, MessageRelay,
    SupervisorConfig, MAIN_WINDOW_LABEL,
};
use tauri::{Manager, RunEvent, WindowEvent};

pub(crate) use app_helpers::{
    append_desktop_log, append_restart_log, append_shutdown_log, append_startup_log,
};
use desktop_bridge_commands::{relay_invoke, relay_send};
use desktop_host::DesktopHost;

/// Everything the window side shares, managed as Tauri state.
pub(crate) struct DesktopState {
    pub(crate) supervisor: BackendSupervisor,
    pub(crate) relay: MessageRelay,
    pub(crate) shutdown: ShutdownCoordinator,
    pub(crate) is_launching: AtomicBool,
}

fn main() {
    let logs = app_helpers::desktop_logs();
    append_startup_log("desktop process starting");
    append_startup_log(&format!(
        "desktop log path: {}, backend log path: {}",
        logs.desktop_log_path().display(),
        logs.backend_log_path().display()
    ));

    let app = match tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_opener::init())
        .invoke_handler(tauri::generate_handler![relay_send, relay_invoke])
        .on_window_event(|window, event| {
            if window.label() != MAIN_WINDOW_LABEL {
                return;
            }
            if let WindowEvent::CloseRequested { .. } = event {
                exit_events::handle_main_window_close(window);
            }
        })
        .setup(move |app| {
            let app_handle = app.handle().clone();
            let config = SupervisorConfig::from_env(|message| append_startup_log(&message));
            append_startup_log(&format!(
                "backend url: {}, readiness: {:?}",
                config.backend_url, config.readiness
            ));

            let sink: Arc<dyn LogSink> = logs.clone();
            let host = Arc::new(DesktopHost::new(
                app_handle.clone(),
                config.backend_url.clone(),
            ));
            let plan_handle = app_handle.clone();
            let supervisor = BackendSupervisor::new(
                config,
                move || app_helpers::resolve_launch_plan(&plan_handle),
                Arc::clone(&sink),
                host.clone(),
            );
            app.manage(DesktopState {
                supervisor,
                relay: MessageRelay::new(host, Arc::clone(&sink)),
                shutdown: ShutdownCoordinator::new(sink),
                is_launching: AtomicBool::new(false),
            });

            startup_task::spawn_launch_task(app_handle);
            Ok(())
        })
        .build(tauri::generate_context!())
    {
        Ok(app) => app,
        Err(error) => {
            append_startup_log(&format!("failed to build tauri application: {error}"));
            eprintln!("failed to build tauri application: {error}");
            std::process::exit(1);
        }
    };

    app.run(|app_handle, event| match event {
        RunEvent::ExitRequested { code, api, .. } => {
            exit_events::handle_exit_requested(app_handle, code, &api);
        }
        RunEvent::Exit => exit_events::handle_exit_event(app_handle),
        #[cfg(target_os = "macos")]
        RunEvent::Reopen { .. } => {
            if app_handle.get_webview_window(MAIN_WINDOW_LABEL).is_none() {
                append_startup_log("app reopened without a window, relaunching");
                startup_task::spawn_launch_task(app_handle.clone());
            } else {
                main_window::show_main_window(app_handle, append_desktop_log);
            }
        }
        _ => {}
    });
}
