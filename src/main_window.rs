use agent_pro_desktop::{relay::NavigateAction, APP_TITLE, MAIN_WINDOW_LABEL};
use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindowBuilder};
use url::Url;

use crate::desktop_bridge;

const MAIN_WINDOW_WIDTH: f64 = 1200.0;
const MAIN_WINDOW_HEIGHT: f64 = 800.0;

/// Opens the single UI window on `backend_url`, or brings the existing one
/// to the front. Main thread only.
pub fn create_or_focus_main_window<F>(
    app_handle: &AppHandle,
    backend_url: &Url,
    log: F,
) -> Result<(), String>
where
    F: Fn(&str),
{
    if app_handle.get_webview_window(MAIN_WINDOW_LABEL).is_some() {
        log("main window already exists, focusing it");
        show_main_window(app_handle, log);
        return Ok(());
    }

    let navigation_app = app_handle.clone();
    let navigation_backend_url = backend_url.clone();
    WebviewWindowBuilder::new(
        app_handle,
        MAIN_WINDOW_LABEL,
        WebviewUrl::External(backend_url.clone()),
    )
    .title(APP_TITLE)
    .inner_size(MAIN_WINDOW_WIDTH, MAIN_WINDOW_HEIGHT)
    // Ctrl/Cmd with `=`, `-` and `0` zoom in, zoom out and reset.
    .zoom_hotkeys_enabled(true)
    .initialization_script(desktop_bridge::bootstrap_script())
    .on_navigation(move |target| {
        desktop_bridge::allow_navigation(&navigation_app, &navigation_backend_url, target)
    })
    .build()
    .map(|_| ())
    .map_err(|error| format!("Failed to create main window: {error}"))
}

pub fn show_main_window<F>(app_handle: &AppHandle, log: F)
where
    F: Fn(&str),
{
    let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) else {
        log("show_main_window skipped: main window not found");
        return;
    };

    if let Err(error) = window.unminimize() {
        log(&format!("failed to unminimize main window: {error}"));
    }
    if let Err(error) = window.show() {
        log(&format!("failed to show main window: {error}"));
    }
    if let Err(error) = window.set_focus() {
        log(&format!("failed to focus main window: {error}"));
    }
}

pub fn navigate_main_window<F>(
    app_handle: &AppHandle,
    action: NavigateAction,
    backend_url: &Url,
    log: F,
) where
    F: Fn(&str),
{
    let Some(window) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) else {
        log("navigation skipped: main window not found");
        return;
    };

    let result = match action {
        NavigateAction::Back => window.eval("window.history.back();"),
        NavigateAction::Forward => window.eval("window.history.forward();"),
        NavigateAction::Home => window.navigate(backend_url.clone()),
        NavigateAction::Refresh => window.reload(),
    };
    if let Err(error) = result {
        log(&format!("navigation {action:?} failed: {error}"));
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn window_capability_allows_zoom_hotkeys() {
        let capability: serde_json::Value =
            serde_json::from_str(include_str!("../capabilities/default.json"))
                .expect("parse capability file");
        let permissions = capability["permissions"]
            .as_array()
            .expect("permissions list");
        assert!(permissions
            .iter()
            .any(|permission| permission == "core:webview:allow-set-webview-zoom"));
        assert_eq!(capability["windows"][0], "main");
    }
}
