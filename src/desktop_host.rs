use agent_pro_desktop::{
    backend_process::ExitSummary,
    relay::{DialogOptions, NavigateAction},
    ExitObserver, RelayHost, SupervisorError, MAIN_WINDOW_LABEL,
};
use tauri::{AppHandle, Manager};
use tauri_plugin_opener::OpenerExt;
use url::Url;

use crate::{
    append_desktop_log, append_restart_log, main_window, ui_dispatch, DesktopState,
};

/// The window side of the relay and the crash notifier.
pub(crate) struct DesktopHost {
    app_handle: AppHandle,
    backend_url: Url,
}

impl DesktopHost {
    pub(crate) fn new(app_handle: AppHandle, backend_url: Url) -> Self {
        Self {
            app_handle,
            backend_url,
        }
    }
}

impl RelayHost for DesktopHost {
    fn restart_backend(&self) -> Result<(), SupervisorError> {
        let Some(state) = self.app_handle.try_state::<DesktopState>() else {
            return Err(SupervisorError::StoppedDuringStartup);
        };
        state.supervisor.restart().map(|ready| {
            append_restart_log(&format!(
                "restart-server request completed: pid={}",
                ready.pid
            ));
        })
    }

    fn show_dialog(&self, options: &DialogOptions) -> usize {
        ui_dispatch::show_message_dialog(&self.app_handle, options, append_desktop_log)
    }

    fn open_external(&self, url: &Url) -> Result<(), String> {
        self.app_handle
            .opener()
            .open_url(url.as_str(), None::<&str>)
            .map_err(|error| error.to_string())
    }

    fn navigate(&self, action: NavigateAction) {
        main_window::navigate_main_window(
            &self.app_handle,
            action,
            &self.backend_url,
            append_desktop_log,
        );
    }

    fn app_version(&self) -> String {
        self.app_handle.package_info().version.to_string()
    }
}

impl ExitObserver for DesktopHost {
    fn backend_exited_unexpectedly(&self, summary: ExitSummary) {
        let quitting = self
            .app_handle
            .try_state::<DesktopState>()
            .is_some_and(|state| state.shutdown.is_quitting());
        if quitting {
            return;
        }
        if self.app_handle.get_webview_window(MAIN_WINDOW_LABEL).is_none() {
            append_desktop_log(&format!(
                "backend exited with {summary} while no window is open"
            ));
            return;
        }
        ui_dispatch::show_backend_crash_dialog(&self.app_handle, summary);
    }
}
