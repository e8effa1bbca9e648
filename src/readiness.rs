use std::time::{Duration, Instant};

use url::Url;

use crate::{
    backend_http,
    backend_process::{ExitSignal, ExitSummary},
    http_response,
    logging::LogSink,
    BACKEND_READY_TCP_PROBE_TIMEOUT_MAX_MS, DEFAULT_BACKEND_READY_HTTP_PATH,
    DEFAULT_BACKEND_READY_POLL_INTERVAL_MS, DEFAULT_BACKEND_READY_PROBE_TIMEOUT_MS,
    DEFAULT_BACKEND_TIMEOUT_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessMode {
    /// `GET <http_path>` must answer with a 2xx or 3xx status.
    Http,
    /// A successful TCP connect is enough.
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub mode: ReadinessMode,
    pub http_path: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            mode: ReadinessMode::Http,
            http_path: DEFAULT_BACKEND_READY_HTTP_PATH.to_string(),
            timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_BACKEND_READY_POLL_INTERVAL_MS),
            probe_timeout: Duration::from_millis(DEFAULT_BACKEND_READY_PROBE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadinessError {
    #[error("Timed out after {}ms waiting for backend startup.", .timeout.as_millis())]
    TimedOut { timeout: Duration, attempts: u32 },
    #[error("Backend process exited before becoming reachable with {0}.")]
    BackendExited(ExitSummary),
}

/// Polls one backend address until it serves, the deadline passes or the
/// process behind it exits. A prober covers exactly one startup cycle.
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    backend_url: Url,
    config: ReadinessConfig,
}

impl ReadinessProber {
    pub fn new(backend_url: Url, config: ReadinessConfig) -> Self {
        Self {
            backend_url,
            config,
        }
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Runs the probe loop on the calling thread.
    ///
    /// Waits between attempts happen on `exit_signal`, so a backend that dies
    /// ends the loop immediately instead of after the next poll.
    pub fn probe(
        &self,
        exit_signal: &ExitSignal,
        logs: &dyn LogSink,
    ) -> Result<ProbeReport, ReadinessError> {
        let start_time = Instant::now();
        let mut attempts = 0u32;
        let mut tcp_ready_logged = false;
        let mut ever_tcp_reachable = false;
        let mut last_http_status = None;

        loop {
            if let Some(summary) = exit_signal.get() {
                return Err(ReadinessError::BackendExited(summary));
            }

            attempts += 1;
            let deadline = start_time + self.config.timeout;
            let (ready, http_status, tcp_reachable) = self.attempt(deadline);
            if ready {
                let elapsed = start_time.elapsed();
                logs.startup(&format!(
                    "backend ready: url={}, attempts={attempts}, elapsed_ms={}",
                    self.backend_url,
                    elapsed.as_millis()
                ));
                return Ok(ProbeReport { attempts, elapsed });
            }
            if http_status.is_some() {
                last_http_status = http_status;
            }

            if tcp_reachable {
                ever_tcp_reachable = true;
                if !tcp_ready_logged {
                    logs.startup(
                        "backend TCP port is reachable but HTTP endpoint is not ready yet; waiting",
                    );
                    tcp_ready_logged = true;
                }
            }

            let elapsed = start_time.elapsed();
            if elapsed >= self.config.timeout {
                self.log_timeout(logs, last_http_status, ever_tcp_reachable);
                return Err(ReadinessError::TimedOut {
                    timeout: self.config.timeout,
                    attempts,
                });
            }

            let wait = self.config.poll_interval.min(self.config.timeout - elapsed);
            if let Some(summary) = exit_signal.wait_timeout(wait) {
                return Err(ReadinessError::BackendExited(summary));
            }
        }
    }

    /// Returns `(ready, http_status, tcp_reachable)` for one attempt. No
    /// socket timeout reaches past `deadline`.
    fn attempt(&self, deadline: Instant) -> (bool, Option<u16>, bool) {
        let tcp_cap = self
            .config
            .probe_timeout
            .min(Duration::from_millis(BACKEND_READY_TCP_PROBE_TIMEOUT_MAX_MS));
        match self.config.mode {
            ReadinessMode::Tcp => {
                let reachable =
                    backend_http::ping_backend(&self.backend_url, budget(tcp_cap, deadline));
                (reachable, None, reachable)
            }
            ReadinessMode::Http => {
                let http_status = backend_http::request_status_code(
                    &self.backend_url,
                    &self.config.http_path,
                    budget(self.config.probe_timeout, deadline),
                );
                if http_status.is_some_and(http_response::is_ready_status) {
                    return (true, http_status, true);
                }
                let tcp_reachable = http_status.is_some()
                    || backend_http::ping_backend(&self.backend_url, budget(tcp_cap, deadline));
                (false, http_status, tcp_reachable)
            }
        }
    }

    fn log_timeout(&self, logs: &dyn LogSink, last_http_status: Option<u16>, tcp_reachable: bool) {
        let last_http_status_text = last_http_status
            .map(|status| status.to_string())
            .unwrap_or_else(|| "none".to_string());
        logs.startup(&format!(
            "backend readiness check timed out after {}ms: backend_url={}, mode={:?}, path={}, probe_timeout_ms={}, tcp_reachable={}, last_http_status={}",
            self.config.timeout.as_millis(),
            self.backend_url,
            self.config.mode,
            self.config.http_path,
            self.config.probe_timeout.as_millis(),
            tcp_reachable,
            last_http_status_text
        ));
    }
}

// Zero is rejected by socket timeouts, so the floor is one millisecond.
fn budget(limit: Duration, deadline: Instant) -> Duration {
    limit
        .min(deadline.saturating_duration_since(Instant::now()))
        .max(Duration::from_millis(1))
}
