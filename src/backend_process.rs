#[cfg(unix)]
use std::os::unix::process::CommandExt;
#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::{
    env,
    ffi::OsString,
    fmt,
    io::{BufRead, BufReader, Read},
    process::{Command, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};

use crate::{
    launch_plan::LaunchPlan,
    logging::{LogSink, OutputStream},
    supervisor::SupervisorError,
    SERVER_STARTED_MARKER,
};
#[cfg(target_os = "windows")]
use crate::process_control::{WINDOWS_CREATE_NEW_PROCESS_GROUP, WINDOWS_CREATE_NO_WINDOW};

/// How a backend process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
}

impl ExitSummary {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "code {code}"),
            None => f.write_str("a signal"),
        }
    }
}

/// One-shot notification that the backend has exited.
///
/// The watcher thread publishes exactly once; every waiter wakes up with the
/// same summary.
#[derive(Debug, Default)]
pub struct ExitSignal {
    summary: Mutex<Option<ExitSummary>>,
    exited: Condvar,
}

impl ExitSignal {
    pub fn get(&self) -> Option<ExitSummary> {
        match self.summary.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// First notification wins; later ones are ignored.
    pub fn notify(&self, summary: ExitSummary) {
        let mut guard = match self.summary.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_none() {
            *guard = Some(summary);
        }
        self.exited.notify_all();
    }

    /// Blocks until the exit is published or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitSummary> {
        let deadline = Instant::now() + timeout;
        let mut guard = match self.summary.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if guard.is_some() {
                return *guard;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            guard = match self.exited.wait_timeout(guard, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

/// Handle to a live backend. The `Child` itself is owned by the watcher
/// thread; everything else talks to the process through this handle.
#[derive(Debug, Clone)]
pub struct BackendProcess {
    pid: u32,
    generation: u64,
    started_at: DateTime<Local>,
    exit_signal: Arc<ExitSignal>,
    expected_stop: Arc<AtomicBool>,
}

impl BackendProcess {
    /// Spawns the backend as the leader of a fresh process group, starts the
    /// output pumps and hands the child to a watcher thread. `on_exit` runs on
    /// the watcher thread after the exit signal has fired.
    pub fn spawn<E>(
        plan: &LaunchPlan,
        generation: u64,
        path_override: Option<OsString>,
        logs: Arc<dyn LogSink>,
        on_exit: E,
    ) -> Result<Self, SupervisorError>
    where
        E: FnOnce(ExitSummary) + Send + 'static,
    {
        let mut command = Command::new(&plan.cmd);
        command
            .args(&plan.args)
            .current_dir(&plan.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in backend_env_overrides() {
            command.env(key, value);
        }
        if let Some(path_override) = path_override {
            command.env("PATH", path_override);
        }
        #[cfg(unix)]
        {
            command.process_group(0);
        }
        #[cfg(target_os = "windows")]
        {
            command.creation_flags(WINDOWS_CREATE_NO_WINDOW | WINDOWS_CREATE_NEW_PROCESS_GROUP);
        }

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            command: plan.debug_command().join(" "),
            source,
        })?;
        let pid = child.id();
        logs.startup(&format!(
            "spawned backend: pid={pid}, generation={generation}, cmd={:?}, cwd={}",
            plan.debug_command(),
            plan.cwd.display()
        ));

        if let Some(stdout) = child.stdout.take() {
            spawn_output_pump(stdout, OutputStream::Stdout, pid, Arc::clone(&logs));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_pump(stderr, OutputStream::Stderr, pid, Arc::clone(&logs));
        }

        let exit_signal = Arc::new(ExitSignal::default());
        let watcher_signal = Arc::clone(&exit_signal);
        let watcher_logs = Arc::clone(&logs);
        let spawned = thread::Builder::new()
            .name(format!("backend-watcher-{pid}"))
            .spawn(move || {
                let summary = match child.wait() {
                    Ok(status) => ExitSummary::from_status(status),
                    Err(error) => {
                        watcher_logs.runtime(&format!(
                            "failed to wait for backend process: pid={pid}, error={error}"
                        ));
                        ExitSummary {
                            code: None,
                            success: false,
                        }
                    }
                };
                watcher_signal.notify(summary);
                on_exit(summary);
            });
        if let Err(error) = spawned {
            // Without a watcher the exit could never be observed.
            logs.startup(&format!(
                "failed to start backend watcher: pid={pid}, error={error}"
            ));
            return Err(SupervisorError::Spawn {
                command: plan.debug_command().join(" "),
                source: error,
            });
        }

        Ok(Self {
            pid,
            generation,
            started_at: Local::now(),
            exit_signal,
            expected_stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn exit_signal(&self) -> &Arc<ExitSignal> {
        &self.exit_signal
    }

    pub fn has_exited(&self) -> bool {
        self.exit_signal.get().is_some()
    }

    pub fn mark_expected_stop(&self) {
        self.expected_stop.store(true, Ordering::Release);
    }

    pub fn is_expected_stop(&self) -> bool {
        self.expected_stop.load(Ordering::Acquire)
    }
}

/// Environment every backend is started with. Encoding variables the user
/// already set are passed through untouched.
pub fn backend_env_overrides() -> Vec<(&'static str, String)> {
    vec![
        ("ELECTRON_APP", "1".to_string()),
        ("AGENT_PRO_DESKTOP_CLIENT", "1".to_string()),
        ("PYTHONUNBUFFERED", "1".to_string()),
        (
            "PYTHONIOENCODING",
            env::var("PYTHONIOENCODING").unwrap_or_else(|_| "utf-8".to_string()),
        ),
        (
            "PYTHONUTF8",
            env::var("PYTHONUTF8").unwrap_or_else(|_| "1".to_string()),
        ),
    ]
}

fn spawn_output_pump<R>(stream: R, kind: OutputStream, pid: u32, logs: Arc<dyn LogSink>)
where
    R: Read + Send + 'static,
{
    let result = thread::Builder::new()
        .name(format!("backend-{kind}-{pid}"))
        .spawn({
            let logs = Arc::clone(&logs);
            move || pump_lines(stream, kind, logs.as_ref())
        });
    if let Err(error) = result {
        logs.runtime(&format!(
            "failed to start backend {kind} reader: pid={pid}, error={error}"
        ));
    }
}

fn pump_lines<R: Read>(stream: R, kind: OutputStream, logs: &dyn LogSink) {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(['\r', '\n']);
                logs.backend_line(kind, line);
                if kind == OutputStream::Stdout && line.contains(SERVER_STARTED_MARKER) {
                    logs.startup(&format!("backend reported server started: {line}"));
                }
            }
            Err(error) => {
                logs.runtime(&format!("backend {kind} reader stopped: {error}"));
                break;
            }
        }
    }
}
