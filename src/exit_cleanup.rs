use crate::{
    shutdown_state::ShutdownCoordinator,
    supervisor::{BackendSupervisor, StopOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    WindowClosed,
    ExitRequested,
    ExitFallback,
}

pub fn try_begin_exit_cleanup<F>(
    coordinator: &ShutdownCoordinator,
    trigger: ExitTrigger,
    log: F,
) -> bool
where
    F: Fn(&str),
{
    if coordinator.try_begin_cleanup() {
        return true;
    }

    let message = match trigger {
        ExitTrigger::WindowClosed => "window closed while backend cleanup is already running",
        ExitTrigger::ExitRequested => "exit requested while backend cleanup is already running",
        ExitTrigger::ExitFallback => {
            "exit fallback cleanup skipped: backend cleanup already running"
        }
    };
    log(message);
    false
}

/// Stops the backend tree on the way out. Never fails; outcomes are logged.
pub fn stop_backend_for_exit<F>(supervisor: &BackendSupervisor, trigger: ExitTrigger, log: F)
where
    F: Fn(&str),
{
    let label = match trigger {
        ExitTrigger::WindowClosed => "window close",
        ExitTrigger::ExitRequested => "ExitRequested",
        ExitTrigger::ExitFallback => "Exit fallback",
    };
    match supervisor.stop() {
        StopOutcome::NotRunning => log(&format!("no backend to stop on {label}")),
        StopOutcome::Terminated { pid } => {
            log(&format!("backend stopped on {label}: pid={pid}"))
        }
        StopOutcome::Abandoned { pid } => log(&format!(
            "backend stop on {label} could not confirm exit: pid={pid}"
        )),
    }

    if matches!(trigger, ExitTrigger::ExitRequested) {
        log("backend stop finished, exiting desktop process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend_config::SupervisorConfig,
        launch_plan::LaunchPlan,
        logging::MemoryLogSink,
        readiness::ReadinessConfig,
        supervisor::NoopExitObserver,
    };
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    fn idle_supervisor() -> BackendSupervisor {
        let config = SupervisorConfig {
            backend_url: crate::backend_config::default_backend_url(),
            readiness: ReadinessConfig::default(),
            graceful_stop_timeout: Duration::from_millis(500),
        };
        BackendSupervisor::new(
            config,
            || {
                Ok(LaunchPlan {
                    cmd: "sh".to_string(),
                    args: vec![],
                    cwd: std::env::temp_dir(),
                })
            },
            Arc::new(MemoryLogSink::default()),
            Arc::new(NoopExitObserver),
        )
    }

    #[test]
    fn second_exit_path_skips_cleanup_and_says_why() {
        let coordinator = ShutdownCoordinator::new(Arc::new(MemoryLogSink::default()));
        let logs = Mutex::new(Vec::new());
        let log = |message: &str| logs.lock().expect("lock logs").push(message.to_string());

        assert!(try_begin_exit_cleanup(&coordinator, ExitTrigger::ExitRequested, log));
        assert!(!try_begin_exit_cleanup(&coordinator, ExitTrigger::ExitFallback, log));
        assert_eq!(
            logs.lock().expect("lock logs").as_slice(),
            ["exit fallback cleanup skipped: backend cleanup already running"]
        );
    }

    #[test]
    fn stop_for_exit_without_backend_only_logs() {
        let supervisor = idle_supervisor();
        let logs = Mutex::new(Vec::new());
        stop_backend_for_exit(&supervisor, ExitTrigger::ExitRequested, |message| {
            logs.lock().expect("lock logs").push(message.to_string())
        });
        let logs = logs.lock().expect("lock logs");
        assert_eq!(logs[0], "no backend to stop on ExitRequested");
        assert_eq!(logs[1], "backend stop finished, exiting desktop process");
    }
}
