use std::{
    env, io,
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Local};

use crate::{
    backend_config::SupervisorConfig,
    backend_path,
    backend_process::{BackendProcess, ExitSummary},
    launch_plan::LaunchPlan,
    logging::LogSink,
    process_control,
    readiness::{ProbeReport, ReadinessError, ReadinessProber},
    supervisor_state::{SupervisorState, SupervisorStateMachine},
    AtomicFlagGuard,
};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Backend executable not found: {program}")]
    ExecutableNotFound { program: String },
    #[error("Backend script not found at {}", .0.display())]
    ScriptNotFound(PathBuf),
    #[error("{0}")]
    InvalidCommand(String),
    #[error("Failed to spawn backend process with command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Timed out after {}ms waiting for backend startup.", .timeout.as_millis())]
    ReadinessTimeout { timeout: Duration },
    #[error("Backend process exited before becoming reachable with {0}.")]
    ExitedBeforeReady(ExitSummary),
    #[error("Backend was stopped before it became ready.")]
    StoppedDuringStartup,
    #[error("Backend action already in progress.")]
    ActionInProgress,
    #[error("Backend supervisor lock poisoned.")]
    LockPoisoned,
}

/// Told about backend deaths nobody asked for. Never told about exits caused
/// by `stop()` or `restart()`.
pub trait ExitObserver: Send + Sync {
    fn backend_exited_unexpectedly(&self, summary: ExitSummary);
}

#[derive(Debug, Default)]
pub struct NoopExitObserver;

impl ExitObserver for NoopExitObserver {
    fn backend_exited_unexpectedly(&self, _summary: ExitSummary) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Terminated { pid: u32 },
    /// The tree was force-killed but the exit was never observed.
    Abandoned { pid: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSnapshot {
    pub state: SupervisorState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Local>>,
    pub last_exit: Option<ExitSummary>,
}

/// A backend that passed readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyBackend {
    pub pid: u32,
    pub generation: u64,
    /// `None` when `start()` attached to a backend that was already ready.
    pub report: Option<ProbeReport>,
}

type PlanResolver = dyn Fn() -> Result<LaunchPlan, SupervisorError> + Send + Sync;

#[derive(Debug, Default)]
struct Inner {
    machine: SupervisorStateMachine,
    process: Option<BackendProcess>,
    generation: u64,
    last_exit: Option<ExitSummary>,
}

struct Shared {
    config: SupervisorConfig,
    resolve_plan: Box<PlanResolver>,
    logs: Arc<dyn LogSink>,
    observer: Arc<dyn ExitObserver>,
    inner: Mutex<Inner>,
    // Serializes spawning and stopping; never held across a readiness wait.
    ops: Mutex<()>,
    is_restarting: AtomicBool,
}

impl Shared {
    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(error) => {
                self.logs
                    .runtime(&format!("backend supervisor state lock poisoned: {error}"));
                error.into_inner()
            }
        }
    }

    fn handle_exit(&self, generation: u64, summary: ExitSummary) {
        let (expected, was_ready, pid) = {
            let mut inner = self.lock_inner();
            let Some(process) = inner
                .process
                .as_ref()
                .filter(|process| process.generation() == generation)
                .cloned()
            else {
                return;
            };
            inner.last_exit = Some(summary);
            let expected = process.is_expected_stop();
            let was_ready = inner.machine.state() == SupervisorState::Ready;
            if !expected {
                inner.process = None;
                inner.machine.mark_stopped();
            }
            (expected, was_ready, process.pid())
        };

        if expected {
            self.logs.shutdown(&format!(
                "backend exited after stop request: pid={pid}, exit={summary}"
            ));
            return;
        }
        // Nothing will call stop() for this tree any more.
        process_control::kill_orphaned_process_tree(pid, |message| self.logs.runtime(message));
        if !was_ready {
            self.logs.startup(&format!(
                "backend exited during startup: pid={pid}, exit={summary}"
            ));
            return;
        }

        self.logs.runtime(&format!(
            "backend exited unexpectedly: pid={pid}, exit={summary}"
        ));
        if !summary.success {
            self.observer.backend_exited_unexpectedly(summary);
        }
    }
}

/// Owns the single backend process: spawning it, waiting for it to serve,
/// stopping its whole tree and noticing when it dies.
///
/// Clones share the same backend. All methods block and are meant for worker
/// threads, never the UI thread.
#[derive(Clone)]
pub struct BackendSupervisor {
    shared: Arc<Shared>,
}

impl BackendSupervisor {
    pub fn new<R>(
        config: SupervisorConfig,
        resolve_plan: R,
        logs: Arc<dyn LogSink>,
        observer: Arc<dyn ExitObserver>,
    ) -> Self
    where
        R: Fn() -> Result<LaunchPlan, SupervisorError> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                config,
                resolve_plan: Box::new(resolve_plan),
                logs,
                observer,
                inner: Mutex::new(Inner::default()),
                ops: Mutex::new(()),
                is_restarting: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    pub fn logs(&self) -> &Arc<dyn LogSink> {
        &self.shared.logs
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        let inner = self.shared.lock_inner();
        SupervisorSnapshot {
            state: inner.machine.state(),
            pid: inner.process.as_ref().map(BackendProcess::pid),
            started_at: inner.process.as_ref().map(BackendProcess::started_at),
            last_exit: inner.last_exit,
        }
    }

    /// Spawns the backend unless one is already alive. The returned handle
    /// decides readiness; dropping it without waiting leaves the backend in
    /// `Starting`.
    pub fn start(&self) -> Result<PendingReadiness, SupervisorError> {
        let _ops = self
            .shared
            .ops
            .lock()
            .map_err(|_| SupervisorError::LockPoisoned)?;
        let logs = &self.shared.logs;

        if let Some(pending) = self.attach_to_live_process() {
            return Ok(pending);
        }

        let plan = (self.shared.resolve_plan)()?;
        let path_override =
            backend_path::build_backend_path_override(|message| logs.startup(&message));
        let search_path = path_override.clone().or_else(|| env::var_os("PATH"));
        let Some(executable) =
            backend_path::resolve_executable(&plan.cmd, search_path.as_deref(), &plan.cwd)
        else {
            logs.startup(&format!(
                "backend executable not found: cmd={}, cwd={}",
                plan.cmd,
                plan.cwd.display()
            ));
            return Err(SupervisorError::ExecutableNotFound { program: plan.cmd });
        };
        let plan = LaunchPlan {
            cmd: executable.to_string_lossy().into_owned(),
            ..plan
        };

        let generation = {
            let mut inner = self.shared.lock_inner();
            inner.generation += 1;
            inner.generation
        };
        let weak = Arc::downgrade(&self.shared);
        let process = BackendProcess::spawn(
            &plan,
            generation,
            path_override,
            Arc::clone(logs),
            move |summary| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_exit(generation, summary);
                }
            },
        )?;

        {
            let mut inner = self.shared.lock_inner();
            inner.machine.mark_stopped();
            inner.machine.try_begin_start();
            inner.process = Some(process.clone());
        }

        Ok(self.pending_for(process, false))
    }

    /// The launch sequence: start and wait for readiness.
    pub fn launch(&self) -> Result<ReadyBackend, SupervisorError> {
        self.start()?.wait()
    }

    /// Stops the backend tree. Safe to call at any time and from any number
    /// of threads; only one of them does the work.
    pub fn stop(&self) -> StopOutcome {
        self.stop_generation(None)
    }

    /// Stop followed by a fresh launch. Overlapping restarts are rejected.
    pub fn restart(&self) -> Result<ReadyBackend, SupervisorError> {
        let _restart_guard = AtomicFlagGuard::try_set(&self.shared.is_restarting)
            .ok_or(SupervisorError::ActionInProgress)?;
        let logs = &self.shared.logs;
        logs.restart("backend restart requested");

        match self.stop() {
            StopOutcome::NotRunning => logs.restart("no backend running, starting a new one"),
            StopOutcome::Terminated { pid } => {
                logs.restart(&format!("previous backend stopped: pid={pid}"))
            }
            StopOutcome::Abandoned { pid } => logs.restart(&format!(
                "previous backend did not confirm exit, starting anyway: pid={pid}"
            )),
        }

        match self.launch() {
            Ok(ready) => {
                logs.restart(&format!("backend restarted: pid={}", ready.pid));
                Ok(ready)
            }
            Err(error) => {
                logs.restart(&format!("backend restart failed: {error}"));
                Err(error)
            }
        }
    }

    fn attach_to_live_process(&self) -> Option<PendingReadiness> {
        let (process, already_ready) = {
            let mut inner = self.shared.lock_inner();
            let process = inner.process.clone()?;
            if process.has_exited() {
                inner.process = None;
                inner.machine.mark_stopped();
                return None;
            }
            (process, inner.machine.state() == SupervisorState::Ready)
        };
        self.shared.logs.startup(&format!(
            "backend already running, skip re-spawn: pid={}",
            process.pid()
        ));
        Some(self.pending_for(process, already_ready))
    }

    fn pending_for(&self, process: BackendProcess, already_ready: bool) -> PendingReadiness {
        PendingReadiness {
            supervisor: self.clone(),
            prober: ReadinessProber::new(
                self.shared.config.backend_url.clone(),
                self.shared.config.readiness.clone(),
            ),
            process,
            already_ready,
        }
    }

    fn stop_generation(&self, only_generation: Option<u64>) -> StopOutcome {
        let logs = &self.shared.logs;
        let _ops = match self.shared.ops.lock() {
            Ok(guard) => guard,
            Err(error) => {
                logs.shutdown(&format!("backend supervisor ops lock poisoned: {error}"));
                error.into_inner()
            }
        };

        let process = {
            let mut inner = self.shared.lock_inner();
            let Some(process) = inner.process.clone() else {
                return StopOutcome::NotRunning;
            };
            if only_generation.is_some_and(|generation| generation != process.generation()) {
                return StopOutcome::NotRunning;
            }
            process.mark_expected_stop();
            inner.machine.try_begin_stop();
            process
        };

        let pid = process.pid();
        let grace = self.shared.config.graceful_stop_timeout;
        logs.shutdown(&format!(
            "stopping backend process tree: pid={pid}, graceful_timeout_ms={}",
            grace.as_millis()
        ));
        let confirmed = process_control::terminate_process_tree(
            pid,
            process.exit_signal(),
            grace,
            |message| logs.shutdown(message),
        );

        {
            let mut inner = self.shared.lock_inner();
            if inner
                .process
                .as_ref()
                .is_some_and(|current| current.generation() == process.generation())
            {
                inner.process = None;
            }
            if let Some(summary) = process.exit_signal().get() {
                inner.last_exit = Some(summary);
            }
            inner.machine.mark_stopped();
        }

        if confirmed {
            logs.shutdown(&format!("backend process tree stopped: pid={pid}"));
            StopOutcome::Terminated { pid }
        } else {
            logs.shutdown(&format!(
                "backend exit not observed after force kill, handle dropped: pid={pid}"
            ));
            StopOutcome::Abandoned { pid }
        }
    }
}

/// Readiness of one spawned backend, still to be decided.
pub struct PendingReadiness {
    supervisor: BackendSupervisor,
    prober: ReadinessProber,
    process: BackendProcess,
    already_ready: bool,
}

impl PendingReadiness {
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Blocks until the backend serves, times out or exits. A timed-out
    /// backend is terminated before this returns.
    pub fn wait(self) -> Result<ReadyBackend, SupervisorError> {
        let pid = self.process.pid();
        let generation = self.process.generation();
        if self.already_ready {
            return Ok(ReadyBackend {
                pid,
                generation,
                report: None,
            });
        }

        let shared = &self.supervisor.shared;
        match self
            .prober
            .probe(self.process.exit_signal(), shared.logs.as_ref())
        {
            Ok(report) => {
                let mut inner = shared.lock_inner();
                let current = inner
                    .process
                    .as_ref()
                    .is_some_and(|process| process.generation() == generation);
                if current
                    && (inner.machine.try_mark_ready()
                        || inner.machine.state() == SupervisorState::Ready)
                {
                    Ok(ReadyBackend {
                        pid,
                        generation,
                        report: Some(report),
                    })
                } else {
                    Err(SupervisorError::StoppedDuringStartup)
                }
            }
            Err(ReadinessError::TimedOut { timeout, .. }) => {
                shared.logs.startup(&format!(
                    "backend not ready in time, terminating: pid={pid}"
                ));
                self.supervisor.stop_generation(Some(generation));
                Err(SupervisorError::ReadinessTimeout { timeout })
            }
            Err(ReadinessError::BackendExited(summary)) => {
                if self.process.is_expected_stop() {
                    return Err(SupervisorError::StoppedDuringStartup);
                }
                // The watcher may have fired before the handle was installed.
                let cleared = {
                    let mut inner = shared.lock_inner();
                    let current = inner
                        .process
                        .as_ref()
                        .is_some_and(|process| process.generation() == generation);
                    if current {
                        inner.process = None;
                        inner.machine.mark_stopped();
                        inner.last_exit = Some(summary);
                    }
                    current
                };
                if cleared {
                    process_control::kill_orphaned_process_tree(pid, |message| {
                        shared.logs.startup(message)
                    });
                }
                Err(SupervisorError::ExitedBeforeReady(summary))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        logging::MemoryLogSink,
        readiness::tests::{fast_config, serve_status},
    };
    use std::{
        net::TcpListener,
        sync::atomic::Ordering,
        thread,
        time::Instant,
    };
    use url::Url;

    #[derive(Debug, Default)]
    struct RecordingObserver {
        exits: Mutex<Vec<ExitSummary>>,
    }

    impl RecordingObserver {
        fn exits(&self) -> Vec<ExitSummary> {
            self.exits.lock().expect("lock observer").clone()
        }
    }

    impl ExitObserver for RecordingObserver {
        fn backend_exited_unexpectedly(&self, summary: ExitSummary) {
            self.exits.lock().expect("lock observer").push(summary);
        }
    }

    fn closed_port_url() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let port = listener.local_addr().expect("listener addr").port();
        drop(listener);
        Url::parse(&format!("http://127.0.0.1:{port}/")).expect("parse url")
    }

    fn shell_supervisor(
        script: &str,
        backend_url: Url,
        timeout_ms: u64,
    ) -> (BackendSupervisor, Arc<MemoryLogSink>, Arc<RecordingObserver>) {
        let plan = LaunchPlan {
            cmd: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: env::temp_dir(),
        };
        supervisor_for(plan, backend_url, timeout_ms)
    }

    fn supervisor_for(
        plan: LaunchPlan,
        backend_url: Url,
        timeout_ms: u64,
    ) -> (BackendSupervisor, Arc<MemoryLogSink>, Arc<RecordingObserver>) {
        let logs = Arc::new(MemoryLogSink::default());
        let observer = Arc::new(RecordingObserver::default());
        let config = SupervisorConfig {
            backend_url,
            readiness: fast_config(timeout_ms),
            graceful_stop_timeout: Duration::from_millis(1_000),
        };
        let supervisor = BackendSupervisor::new(
            config,
            move || Ok(plan.clone()),
            logs.clone(),
            observer.clone(),
        );
        (supervisor, logs, observer)
    }

    fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        condition()
    }

    #[test]
    fn never_ready_backend_times_out_and_is_terminated() {
        let (supervisor, logs, _) = shell_supervisor("exec sleep 30", closed_port_url(), 500);
        let pending = supervisor.start().expect("spawn sleeper");
        let pid = pending.pid();

        let error = pending.wait().expect_err("nothing listens");
        assert!(matches!(error, SupervisorError::ReadinessTimeout { .. }));
        assert!(!process_control::is_process_alive(pid));

        let snapshot = supervisor.snapshot();
        assert_eq!(snapshot.state, SupervisorState::Stopped);
        assert_eq!(snapshot.pid, None);
        assert!(logs.contains("readiness check timed out"));
    }

    #[test]
    fn early_exit_fails_before_deadline() {
        let (supervisor, _, observer) = shell_supervisor("exit 3", closed_port_url(), 20_000);
        let started = Instant::now();

        let error = supervisor.launch().expect_err("backend exits immediately");
        assert!(started.elapsed() < Duration::from_secs(5));
        match error {
            SupervisorError::ExitedBeforeReady(summary) => assert_eq!(summary.code, Some(3)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(supervisor.snapshot().state, SupervisorState::Stopped);
        assert!(observer.exits().is_empty());
    }

    #[test]
    fn stop_without_backend_is_a_no_op() {
        let (supervisor, _, _) = shell_supervisor("exec sleep 30", closed_port_url(), 500);
        assert_eq!(supervisor.stop(), StopOutcome::NotRunning);
        assert_eq!(supervisor.stop(), StopOutcome::NotRunning);
        assert_eq!(supervisor.snapshot().state, SupervisorState::Stopped);
    }

    #[test]
    fn second_start_reuses_the_live_backend() {
        let (url, server_stop) = serve_status(200);
        let (supervisor, _, _) = shell_supervisor("exec sleep 30", url, 3_000);

        let first = supervisor.start().expect("first start");
        let second = supervisor.start().expect("second start");
        assert_eq!(first.pid(), second.pid());

        let ready = first.wait().expect("ready");
        let attached = second.wait().expect("still ready");
        assert_eq!(ready.pid, attached.pid);
        let third = supervisor.launch().expect("attach when ready");
        assert_eq!(third.report, None);
        assert_eq!(supervisor.snapshot().state, SupervisorState::Ready);

        assert_eq!(
            supervisor.stop(),
            StopOutcome::Terminated { pid: ready.pid }
        );
        assert!(!process_control::is_process_alive(ready.pid));
        server_stop.store(true, Ordering::Release);
    }

    #[test]
    fn restart_replaces_the_backend_without_reporting_a_crash() {
        let (url, server_stop) = serve_status(200);
        let (supervisor, logs, observer) = shell_supervisor("exec sleep 30", url, 3_000);

        let first = supervisor.launch().expect("first launch");
        let second = supervisor.restart().expect("restart");
        assert_ne!(first.pid, second.pid);
        assert!(!process_control::is_process_alive(first.pid));
        assert!(process_control::is_process_alive(second.pid));
        assert_eq!(supervisor.snapshot().pid, Some(second.pid));
        assert!(logs.contains("backend restarted"));

        supervisor.stop();
        thread::sleep(Duration::from_millis(100));
        assert!(observer.exits().is_empty());
        server_stop.store(true, Ordering::Release);
    }

    #[test]
    fn overlapping_restart_is_rejected() {
        let (supervisor, _, _) = shell_supervisor("exec sleep 30", closed_port_url(), 500);
        let _busy = AtomicFlagGuard::try_set(&supervisor.shared.is_restarting).expect("guard");
        let error = supervisor.restart().expect_err("restart already running");
        assert_eq!(error.to_string(), "Backend action already in progress.");
    }

    #[test]
    fn missing_executable_fails_without_probing() {
        let plan = LaunchPlan {
            cmd: "agent-pro-no-such-backend".to_string(),
            args: vec![],
            cwd: env::temp_dir(),
        };
        let (supervisor, logs, _) = supervisor_for(plan, closed_port_url(), 20_000);
        let started = Instant::now();

        let error = supervisor.launch().expect_err("executable is missing");
        assert!(matches!(error, SupervisorError::ExecutableNotFound { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!logs.contains("spawned backend"));
        assert_eq!(supervisor.snapshot().state, SupervisorState::Stopped);
    }

    #[test]
    fn crash_after_ready_reaches_the_observer_once() {
        let (url, server_stop) = serve_status(200);
        let (supervisor, _, observer) = shell_supervisor("sleep 1; exit 4", url, 3_000);

        supervisor.launch().expect("ready before crash");
        assert!(wait_until(|| !observer.exits().is_empty()));
        assert_eq!(observer.exits()[0].code, Some(4));
        assert_eq!(observer.exits().len(), 1);

        let snapshot = supervisor.snapshot();
        assert_eq!(snapshot.state, SupervisorState::Stopped);
        assert_eq!(snapshot.last_exit.and_then(|summary| summary.code), Some(4));
        server_stop.store(true, Ordering::Release);
    }

    #[test]
    fn crash_after_ready_takes_the_rest_of_the_tree_down() {
        let pid_file = env::temp_dir().join(format!(
            "agent-pro-crash-child-{}-{}.pid",
            std::process::id(),
            Local::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let script = format!(
            "sleep 300 & echo $! > '{}'; sleep 1; exit 4",
            pid_file.display()
        );
        let (url, server_stop) = serve_status(200);
        let (supervisor, logs, observer) = shell_supervisor(&script, url, 3_000);

        supervisor.launch().expect("ready before crash");
        assert!(wait_until(|| !observer.exits().is_empty()));
        let child: u32 = std::fs::read_to_string(&pid_file)
            .expect("read child pid")
            .trim()
            .parse()
            .expect("child pid");

        assert!(wait_until(|| !process_control::is_process_alive(child)));
        assert!(logs.contains("killed them"));
        assert_eq!(supervisor.stop(), StopOutcome::NotRunning);
        assert_eq!(supervisor.snapshot().state, SupervisorState::Stopped);
        let _ = std::fs::remove_file(&pid_file);
        server_stop.store(true, Ordering::Release);
    }

    #[test]
    fn early_exit_takes_the_rest_of_the_tree_down() {
        let pid_file = env::temp_dir().join(format!(
            "agent-pro-early-child-{}-{}.pid",
            std::process::id(),
            Local::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let script = format!("sleep 300 & echo $! > '{}'; exit 2", pid_file.display());
        let (supervisor, _, observer) = shell_supervisor(&script, closed_port_url(), 20_000);

        let error = supervisor.launch().expect_err("backend exits during startup");
        assert!(matches!(error, SupervisorError::ExitedBeforeReady(_)));
        let child: u32 = std::fs::read_to_string(&pid_file)
            .expect("read child pid")
            .trim()
            .parse()
            .expect("child pid");

        assert!(wait_until(|| !process_control::is_process_alive(child)));
        assert!(observer.exits().is_empty());
        let _ = std::fs::remove_file(&pid_file);
    }

    #[test]
    fn clean_exit_after_ready_is_not_reported() {
        let (url, server_stop) = serve_status(200);
        let (supervisor, logs, observer) = shell_supervisor("sleep 1; exit 0", url, 3_000);

        supervisor.launch().expect("ready");
        assert!(wait_until(|| logs.contains("backend exited unexpectedly")));
        assert!(observer.exits().is_empty());
        server_stop.store(true, Ordering::Release);
    }

    #[test]
    fn concurrent_stops_do_the_work_once() {
        let (url, server_stop) = serve_status(200);
        let (supervisor, _, _) = shell_supervisor("exec sleep 30", url, 3_000);
        supervisor.launch().expect("ready");

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let supervisor = supervisor.clone();
                thread::spawn(move || supervisor.stop())
            })
            .collect();
        let outcomes: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("stop thread"))
            .collect();
        assert_eq!(
            outcomes
                .iter()
                .filter(|outcome| matches!(outcome, StopOutcome::Terminated { .. }))
                .count(),
            1
        );
        assert!(outcomes.contains(&StopOutcome::NotRunning));
        server_stop.store(true, Ordering::Release);
    }
}
