use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::{
    logging::{DesktopLogCategory, LogSink},
    origin_policy,
    session_store::{SessionSlot, SessionStore},
    supervisor::SupervisorError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    PageToHost,
    HostToPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Fire and forget.
    Notification,
    /// The sender waits for exactly one reply.
    Request,
}

/// Every message the page and the host may exchange. Anything else is
/// dropped at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayChannel {
    RestartServer,
    Log,
    LogMessage,
    ShowDialog,
    OpenExternal,
    Navigate,
    SetDocumentContent,
    GetDocumentContent,
    SetChatHistory,
    GetChatHistory,
    GetAppVersion,
    AppClosing,
}

impl RelayChannel {
    pub const ALL: [RelayChannel; 12] = [
        Self::RestartServer,
        Self::Log,
        Self::LogMessage,
        Self::ShowDialog,
        Self::OpenExternal,
        Self::Navigate,
        Self::SetDocumentContent,
        Self::GetDocumentContent,
        Self::SetChatHistory,
        Self::GetChatHistory,
        Self::GetAppVersion,
        Self::AppClosing,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::RestartServer => "restart-server",
            Self::Log => "log",
            Self::LogMessage => "log-message",
            Self::ShowDialog => "show-dialog",
            Self::OpenExternal => "open-external",
            Self::Navigate => "navigate",
            Self::SetDocumentContent => "set-document-content",
            Self::GetDocumentContent => "get-document-content",
            Self::SetChatHistory => "set-chat-history",
            Self::GetChatHistory => "get-chat-history",
            Self::GetAppVersion => "get-app-version",
            Self::AppClosing => "app-closing",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.wire_name() == name)
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::AppClosing => Direction::HostToPage,
            _ => Direction::PageToHost,
        }
    }

    pub fn kind(self) -> MessageKind {
        match self {
            Self::RestartServer
            | Self::ShowDialog
            | Self::GetDocumentContent
            | Self::GetChatHistory
            | Self::GetAppVersion => MessageKind::Request,
            Self::Log
            | Self::LogMessage
            | Self::OpenExternal
            | Self::Navigate
            | Self::SetDocumentContent
            | Self::SetChatHistory
            | Self::AppClosing => MessageKind::Notification,
        }
    }
}

impl fmt::Display for RelayChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigateAction {
    Back,
    Forward,
    Home,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    #[default]
    None,
    Info,
    Error,
    Question,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DialogOptions {
    #[serde(rename = "type", default)]
    pub kind: DialogKind,
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub buttons: Vec<String>,
}

impl DialogOptions {
    /// Buttons to render; a dialog always has at least one.
    pub fn effective_buttons(&self) -> Vec<String> {
        if self.buttons.is_empty() {
            vec!["OK".to_string()]
        } else {
            self.buttons.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RendererLog {
    #[serde(default)]
    level: Option<String>,
    message: String,
    #[serde(default, alias = "data")]
    context: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExternalTarget {
    Object { url: String },
    Bare(String),
}

/// What the window can do on behalf of the relay.
pub trait RelayHost: Send + Sync {
    fn restart_backend(&self) -> Result<(), SupervisorError>;

    /// Shows a modal dialog and returns the index of the chosen button.
    fn show_dialog(&self, options: &DialogOptions) -> usize;

    fn open_external(&self, url: &Url) -> Result<(), String>;

    fn navigate(&self, action: NavigateAction);

    fn app_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayRejection {
    UnknownChannel(String),
    WrongDirection(RelayChannel),
    WrongKind {
        channel: RelayChannel,
        expected: MessageKind,
    },
    MalformedPayload {
        channel: RelayChannel,
        reason: String,
    },
}

impl fmt::Display for RelayRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownChannel(name) => write!(f, "unknown channel '{name}'"),
            Self::WrongDirection(channel) => {
                write!(f, "channel '{channel}' cannot be sent by the page")
            }
            Self::WrongKind { channel, expected } => write!(
                f,
                "channel '{channel}' must be used as a {}",
                match expected {
                    MessageKind::Notification => "notification",
                    MessageKind::Request => "request",
                }
            ),
            Self::MalformedPayload { channel, reason } => {
                write!(f, "invalid payload for '{channel}': {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    Delivered,
    Replied(Value),
    Rejected(RelayRejection),
}

impl RelayOutcome {
    /// Value handed back to the page. Rejections resolve to `null` so the
    /// page never sees a host error.
    pub fn into_reply(self) -> Value {
        match self {
            Self::Replied(value) => value,
            Self::Delivered | Self::Rejected(_) => Value::Null,
        }
    }
}

/// Routes whitelisted page messages to the host and the session store.
pub struct MessageRelay {
    host: Arc<dyn RelayHost>,
    store: SessionStore,
    logs: Arc<dyn LogSink>,
}

impl MessageRelay {
    pub fn new(host: Arc<dyn RelayHost>, logs: Arc<dyn LogSink>) -> Self {
        Self {
            host,
            store: SessionStore::default(),
            logs,
        }
    }

    /// A page → host notification.
    pub fn send(&self, channel: &str, payload: Value) -> RelayOutcome {
        self.dispatch(channel, MessageKind::Notification, payload)
    }

    /// A page → host request. Blocks until the host has answered.
    pub fn invoke(&self, channel: &str, payload: Value) -> RelayOutcome {
        self.dispatch(channel, MessageKind::Request, payload)
    }

    /// Validates a host → page event before it is emitted.
    pub fn outbound(&self, channel: RelayChannel) -> Result<&'static str, RelayRejection> {
        if channel.direction() != Direction::HostToPage {
            return Err(RelayRejection::WrongDirection(channel));
        }
        Ok(channel.wire_name())
    }

    fn dispatch(&self, name: &str, kind: MessageKind, payload: Value) -> RelayOutcome {
        let channel = match self.accept(name, kind) {
            Ok(channel) => channel,
            Err(rejection) => return self.reject(rejection),
        };

        match self.handle(channel, payload) {
            Ok(outcome) => outcome,
            Err(reason) => self.reject(RelayRejection::MalformedPayload { channel, reason }),
        }
    }

    fn accept(&self, name: &str, kind: MessageKind) -> Result<RelayChannel, RelayRejection> {
        let channel = RelayChannel::from_wire(name)
            .ok_or_else(|| RelayRejection::UnknownChannel(name.to_string()))?;
        if channel.direction() != Direction::PageToHost {
            return Err(RelayRejection::WrongDirection(channel));
        }
        if channel.kind() != kind {
            return Err(RelayRejection::WrongKind {
                channel,
                expected: channel.kind(),
            });
        }
        Ok(channel)
    }

    fn reject(&self, rejection: RelayRejection) -> RelayOutcome {
        self.logs.desktop(
            DesktopLogCategory::Renderer,
            &format!("warn: rejected relay message: {rejection}"),
        );
        RelayOutcome::Rejected(rejection)
    }

    fn handle(&self, channel: RelayChannel, payload: Value) -> Result<RelayOutcome, String> {
        match channel {
            RelayChannel::RestartServer => Ok(RelayOutcome::Replied(self.restart_server())),
            RelayChannel::Log | RelayChannel::LogMessage => {
                let entry: RendererLog = parse_payload(payload)?;
                self.log_renderer_entry(entry);
                Ok(RelayOutcome::Delivered)
            }
            RelayChannel::ShowDialog => {
                let options: DialogOptions = parse_payload(payload)?;
                let response = self.host.show_dialog(&options);
                Ok(RelayOutcome::Replied(json!({
                    "response": response,
                    "checkboxChecked": false,
                })))
            }
            RelayChannel::OpenExternal => {
                let raw = match parse_payload::<ExternalTarget>(payload)? {
                    ExternalTarget::Object { url } | ExternalTarget::Bare(url) => url,
                };
                let url = origin_policy::parse_external_url(&raw)
                    .ok_or_else(|| format!("only http(s) links can be opened, got '{raw}'"))?;
                if let Err(error) = self.host.open_external(&url) {
                    self.logs
                        .runtime(&format!("failed to open external url {url}: {error}"));
                }
                Ok(RelayOutcome::Delivered)
            }
            RelayChannel::Navigate => {
                let action: NavigateAction = parse_payload(payload)?;
                self.host.navigate(action);
                Ok(RelayOutcome::Delivered)
            }
            RelayChannel::SetDocumentContent => {
                self.store_blob(SessionSlot::DocumentContent, payload)
            }
            RelayChannel::SetChatHistory => self.store_blob(SessionSlot::ChatHistory, payload),
            RelayChannel::GetDocumentContent => Ok(RelayOutcome::Replied(
                self.store.get(SessionSlot::DocumentContent),
            )),
            RelayChannel::GetChatHistory => {
                Ok(RelayOutcome::Replied(self.store.get(SessionSlot::ChatHistory)))
            }
            RelayChannel::GetAppVersion => Ok(RelayOutcome::Replied(Value::String(
                self.host.app_version(),
            ))),
            // Filtered out by `accept`.
            RelayChannel::AppClosing => Err("host-only channel".to_string()),
        }
    }

    fn restart_server(&self) -> Value {
        match self.host.restart_backend() {
            Ok(()) => json!({
                "success": true,
                "message": "Server restarted successfully",
            }),
            Err(error) => json!({
                "success": false,
                "error": error.to_string(),
            }),
        }
    }

    fn log_renderer_entry(&self, entry: RendererLog) {
        let level = match entry.level.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some(level @ ("debug" | "info" | "warn" | "error")) => level.to_string(),
            Some("warning") => "warn".to_string(),
            _ => "log".to_string(),
        };
        let mut line = format!("{level}: {}", entry.message);
        if let Some(context) = entry.context.filter(|value| !value.is_null()) {
            line.push(' ');
            line.push_str(&context.to_string());
        }
        self.logs.desktop(DesktopLogCategory::Renderer, &line);
    }

    fn store_blob(&self, slot: SessionSlot, payload: Value) -> Result<RelayOutcome, String> {
        self.store
            .set(slot, payload)
            .map(|()| RelayOutcome::Delivered)
            .map_err(|error| error.to_string())
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, String> {
    serde_json::from_value(payload).map_err(|error| error.to_string())
}
