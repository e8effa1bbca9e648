use agent_pro_desktop::{
    origin_policy::{self, NavigationDecision},
    APP_CLOSING_EVENT,
};
use tauri::AppHandle;
use tauri_plugin_opener::OpenerExt;
use url::Url;

use crate::append_desktop_log;

static DESKTOP_BRIDGE_BOOTSTRAP_TEMPLATE: &str = include_str!("bridge_bootstrap.js");

pub fn bootstrap_script() -> String {
    DESKTOP_BRIDGE_BOOTSTRAP_TEMPLATE.replace("{APP_CLOSING_EVENT}", APP_CLOSING_EVENT)
}

/// `on_navigation` hook: backend pages load in the window, other web links go
/// to the platform browser, everything else is dropped.
pub fn allow_navigation(app_handle: &AppHandle, backend_url: &Url, target: &Url) -> bool {
    match origin_policy::navigation_decision(backend_url, target) {
        NavigationDecision::StayInWindow => true,
        NavigationDecision::OpenExternally => {
            append_desktop_log(&format!("opening external link in browser: {target}"));
            if let Err(error) = app_handle.opener().open_url(target.as_str(), None::<&str>) {
                append_desktop_log(&format!("failed to open external link {target}: {error}"));
            }
            false
        }
        NavigationDecision::Deny => {
            append_desktop_log(&format!("blocked navigation to {target}"));
            false
        }
    }
}
