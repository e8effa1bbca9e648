use agent_pro_desktop::RelayOutcome;
use serde::Serialize;
use serde_json::Value;
use tauri::{AppHandle, Manager};

use crate::DesktopState;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BridgeResult {
    pub ok: bool,
    pub reason: Option<String>,
}

impl From<RelayOutcome> for BridgeResult {
    fn from(outcome: RelayOutcome) -> Self {
        match outcome {
            RelayOutcome::Delivered | RelayOutcome::Replied(_) => Self {
                ok: true,
                reason: None,
            },
            RelayOutcome::Rejected(rejection) => Self {
                ok: false,
                reason: Some(rejection.to_string()),
            },
        }
    }
}

#[tauri::command]
pub(crate) fn relay_send(
    app_handle: AppHandle,
    channel: String,
    payload: Option<Value>,
) -> BridgeResult {
    let state = app_handle.state::<DesktopState>();
    state
        .relay
        .send(&channel, payload.unwrap_or(Value::Null))
        .into()
}

/// Requests may block (restart, modal dialogs), so they run on the blocking
/// pool and never on the main thread.
#[tauri::command]
pub(crate) async fn relay_invoke(
    app_handle: AppHandle,
    channel: String,
    payload: Option<Value>,
) -> Value {
    let worker_handle = app_handle.clone();
    tauri::async_runtime::spawn_blocking(move || {
        let state = worker_handle.state::<DesktopState>();
        state
            .relay
            .invoke(&channel, payload.unwrap_or(Value::Null))
            .into_reply()
    })
    .await
    .unwrap_or(Value::Null)
}
