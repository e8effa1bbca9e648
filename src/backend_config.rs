use std::{env, path::PathBuf, time::Duration};

use url::Url;

use crate::{
    readiness::{ReadinessConfig, ReadinessMode},
    BACKEND_READY_HTTP_PATH_ENV, BACKEND_READY_MODE_ENV, BACKEND_READY_POLL_INTERVAL_ENV,
    BACKEND_READY_POLL_INTERVAL_MAX_MS, BACKEND_READY_POLL_INTERVAL_MIN_MS,
    BACKEND_READY_PROBE_TIMEOUT_ENV, BACKEND_READY_PROBE_TIMEOUT_MAX_MS,
    BACKEND_READY_PROBE_TIMEOUT_MIN_MS, BACKEND_TIMEOUT_ENV, BACKEND_TIMEOUT_MAX_MS,
    BACKEND_TIMEOUT_MIN_MS, BACKEND_URL_ENV, DEFAULT_BACKEND_READY_HTTP_PATH,
    DEFAULT_BACKEND_READY_POLL_INTERVAL_MS, DEFAULT_BACKEND_READY_PROBE_TIMEOUT_MS,
    DEFAULT_BACKEND_TIMEOUT_MS, DEFAULT_BACKEND_URL, DEFAULT_GRACEFUL_STOP_TIMEOUT_MS,
    DESKTOP_ROOT_ENV, GRACEFUL_STOP_TIMEOUT_ENV, GRACEFUL_STOP_TIMEOUT_MAX_MS,
    GRACEFUL_STOP_TIMEOUT_MIN_MS,
};

/// Everything the supervisor needs besides the launch plan.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub backend_url: Url,
    pub readiness: ReadinessConfig,
    pub graceful_stop_timeout: Duration,
}

impl SupervisorConfig {
    pub fn from_env<F>(mut log: F) -> Self
    where
        F: FnMut(String),
    {
        let backend_url = resolve_backend_url(env::var(BACKEND_URL_ENV).ok().as_deref(), &mut log);
        let readiness = ReadinessConfig {
            mode: resolve_readiness_mode(
                env::var(BACKEND_READY_MODE_ENV).ok().as_deref(),
                &mut log,
            ),
            http_path: resolve_backend_ready_http_path(
                BACKEND_READY_HTTP_PATH_ENV,
                DEFAULT_BACKEND_READY_HTTP_PATH,
                &mut log,
            ),
            timeout: Duration::from_millis(clamped_env_ms(
                BACKEND_TIMEOUT_ENV,
                DEFAULT_BACKEND_TIMEOUT_MS,
                BACKEND_TIMEOUT_MIN_MS,
                BACKEND_TIMEOUT_MAX_MS,
                &mut log,
            )),
            poll_interval: Duration::from_millis(clamped_env_ms(
                BACKEND_READY_POLL_INTERVAL_ENV,
                DEFAULT_BACKEND_READY_POLL_INTERVAL_MS,
                BACKEND_READY_POLL_INTERVAL_MIN_MS,
                BACKEND_READY_POLL_INTERVAL_MAX_MS,
                &mut log,
            )),
            probe_timeout: Duration::from_millis(clamped_env_ms(
                BACKEND_READY_PROBE_TIMEOUT_ENV,
                DEFAULT_BACKEND_READY_PROBE_TIMEOUT_MS,
                BACKEND_READY_PROBE_TIMEOUT_MIN_MS,
                BACKEND_READY_PROBE_TIMEOUT_MAX_MS,
                &mut log,
            )),
        };
        let graceful_stop_timeout = Duration::from_millis(clamped_env_ms(
            GRACEFUL_STOP_TIMEOUT_ENV,
            DEFAULT_GRACEFUL_STOP_TIMEOUT_MS,
            GRACEFUL_STOP_TIMEOUT_MIN_MS,
            GRACEFUL_STOP_TIMEOUT_MAX_MS,
            &mut log,
        ));

        Self {
            backend_url,
            readiness,
            graceful_stop_timeout,
        }
    }
}

/// Root directory for desktop-owned files such as `logs/`.
pub fn resolve_data_root() -> Option<PathBuf> {
    if let Ok(root) = env::var(DESKTOP_ROOT_ENV) {
        let root = PathBuf::from(root.trim());
        if !root.as_os_str().is_empty() {
            return Some(root);
        }
    }
    home::home_dir().map(|home| home.join(".agent-pro"))
}

pub fn default_backend_url() -> Url {
    // The literal is a valid absolute URL.
    Url::parse(DEFAULT_BACKEND_URL).expect("default backend url parses")
}

pub fn resolve_backend_url<F>(raw: Option<&str>, mut log: F) -> Url
where
    F: FnMut(String),
{
    let Some(trimmed) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return default_backend_url();
    };

    match Url::parse(trimmed) {
        Ok(mut parsed) if matches!(parsed.scheme(), "http" | "https") => {
            if parsed.path().is_empty() {
                parsed.set_path("/");
            }
            parsed
        }
        Ok(parsed) => {
            log(format!(
                "{BACKEND_URL_ENV} has unsupported scheme '{}', fallback to {DEFAULT_BACKEND_URL}",
                parsed.scheme()
            ));
            default_backend_url()
        }
        Err(error) => {
            log(format!(
                "invalid {BACKEND_URL_ENV}='{trimmed}': {error}, fallback to {DEFAULT_BACKEND_URL}"
            ));
            default_backend_url()
        }
    }
}

pub fn resolve_readiness_mode<F>(raw: Option<&str>, mut log: F) -> ReadinessMode
where
    F: FnMut(String),
{
    match raw.map(str::trim) {
        None | Some("") => ReadinessMode::Http,
        Some(value) if value.eq_ignore_ascii_case("http") => ReadinessMode::Http,
        Some(value) if value.eq_ignore_ascii_case("tcp") => ReadinessMode::Tcp,
        Some(value) => {
            log(format!(
                "invalid {BACKEND_READY_MODE_ENV}='{value}', fallback to http"
            ));
            ReadinessMode::Http
        }
    }
}

pub fn resolve_backend_ready_http_path<F>(env_name: &str, default_path: &str, mut log: F) -> String
where
    F: FnMut(String),
{
    match env::var_os(env_name) {
        Some(raw) => match raw.to_str() {
            Some(raw_utf8) => normalize_ready_http_path(raw_utf8, env_name, default_path, &mut log),
            None => {
                log(format!(
                    "{env_name} contains non-UTF-8 value '{}', fallback to default '{default_path}'",
                    raw.to_string_lossy()
                ));
                default_path.to_string()
            }
        },
        None => default_path.to_string(),
    }
}

fn normalize_ready_http_path<F>(
    raw: &str,
    env_name: &str,
    default_path: &str,
    log: &mut F,
) -> String
where
    F: FnMut(String),
{
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        log(format!(
            "{env_name} is empty/whitespace, fallback to default '{default_path}'"
        ));
        default_path.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        let normalized = format!("/{trimmed}");
        log(format!(
            "{env_name} is missing leading '/': '{trimmed}', normalized to '{normalized}'"
        ));
        normalized
    }
}

fn clamped_env_ms<F>(env_name: &str, fallback_ms: u64, min_ms: u64, max_ms: u64, log: F) -> u64
where
    F: FnMut(String),
{
    match env::var(env_name) {
        Ok(raw) => parse_clamped_timeout_env(&raw, env_name, fallback_ms, min_ms, max_ms, log),
        Err(_) => fallback_ms,
    }
}

pub fn parse_clamped_timeout_env<F>(
    raw: &str,
    env_name: &str,
    fallback_ms: u64,
    min_ms: u64,
    max_ms: u64,
    mut log: F,
) -> u64
where
    F: FnMut(String),
{
    match raw.trim().parse::<u128>() {
        Ok(parsed) if parsed > 0 => {
            if parsed < min_ms as u128 {
                log(format!(
                    "{env_name}='{raw}' is below minimum {min_ms}ms, clamped to {min_ms}ms"
                ));
                min_ms
            } else if parsed > max_ms as u128 {
                log(format!(
                    "{env_name}='{raw}' is above maximum {max_ms}ms, clamped to {max_ms}ms"
                ));
                max_ms
            } else {
                parsed as u64
            }
        }
        _ => {
            log(format!(
                "invalid {env_name}='{raw}', fallback to {fallback_ms}ms"
            ));
            fallback_ms
        }
    }
}
