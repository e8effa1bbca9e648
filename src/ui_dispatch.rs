use agent_pro_desktop::{
    backend_process::ExitSummary,
    relay::{DialogKind, DialogOptions},
    APP_TITLE,
};
use tauri::AppHandle;
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};

pub fn run_on_main_thread_dispatch<F>(
    app_handle: &AppHandle,
    task_name: &str,
    mut task: F,
) -> Result<(), String>
where
    F: FnMut(&AppHandle) + Send + 'static,
{
    let app_handle_for_thread = app_handle.clone();
    app_handle
        .run_on_main_thread(move || {
            task(&app_handle_for_thread);
        })
        .map_err(|error| format!("Failed to dispatch '{task_name}' on main thread: {error}"))
}

/// Blocks until the user dismisses the error, then exits with status 1.
/// Must run off the main thread.
pub fn show_startup_error<F>(app_handle: &AppHandle, message: &str, log: F)
where
    F: Fn(&str),
{
    log(&format!("startup error: {message}"));
    eprintln!("{APP_TITLE} startup failed: {message}");
    app_handle
        .dialog()
        .message(format!("Failed to start the application.\n\n{message}"))
        .title(format!("{APP_TITLE} Error"))
        .kind(MessageDialogKind::Error)
        .blocking_show();
    app_handle.exit(1);
}

/// Non-blocking notice for a backend that died after the window was up.
pub fn show_backend_crash_dialog(app_handle: &AppHandle, summary: ExitSummary) {
    let message = match summary.code {
        Some(code) => format!("The backend server stopped unexpectedly with code {code}"),
        None => "The backend server stopped unexpectedly (terminated by a signal)".to_string(),
    };
    app_handle
        .dialog()
        .message(message)
        .title(format!("{APP_TITLE} Error"))
        .kind(MessageDialogKind::Error)
        .show(|_| {});
}

/// Modal dialog requested by the page. Returns the chosen button index.
/// Must run off the main thread.
pub fn show_message_dialog<F>(app_handle: &AppHandle, options: &DialogOptions, log: F) -> usize
where
    F: Fn(&str),
{
    let mut buttons = options.effective_buttons();
    if buttons.len() > 2 {
        log(&format!(
            "message dialog supports at most 2 buttons, got {}; extra buttons ignored",
            buttons.len()
        ));
        buttons.truncate(2);
    }

    let mut builder = app_handle
        .dialog()
        .message(match &options.detail {
            Some(detail) => format!("{}\n\n{detail}", options.message),
            None => options.message.clone(),
        })
        .title(options.title.clone().unwrap_or_else(|| APP_TITLE.to_string()))
        .kind(dialog_kind(options.kind));
    let two_buttons = buttons.len() == 2;
    let mut labels = buttons.into_iter();
    builder = match (labels.next(), labels.next()) {
        (Some(ok), Some(cancel)) => {
            builder.buttons(MessageDialogButtons::OkCancelCustom(ok, cancel))
        }
        (Some(ok), None) => builder.buttons(MessageDialogButtons::OkCustom(ok)),
        _ => builder,
    };

    let confirmed = builder.blocking_show();
    if confirmed || !two_buttons {
        0
    } else {
        1
    }
}

fn dialog_kind(kind: DialogKind) -> MessageDialogKind {
    match kind {
        DialogKind::Error => MessageDialogKind::Error,
        DialogKind::Warning => MessageDialogKind::Warning,
        DialogKind::None | DialogKind::Info | DialogKind::Question => MessageDialogKind::Info,
    }
}
