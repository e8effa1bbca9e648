use std::sync::{Arc, Mutex, MutexGuard};

use crate::logging::LogSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownLifecycleState {
    #[default]
    Running,
    QuittingRequested,
    CleanupInProgress,
    ReadyToExit,
    Exiting,
}

#[derive(Debug, Default)]
pub struct ShutdownStateMachine {
    state: ShutdownLifecycleState,
}

impl ShutdownStateMachine {
    pub fn state(&self) -> ShutdownLifecycleState {
        self.state
    }

    pub fn is_quitting(&self) -> bool {
        self.state != ShutdownLifecycleState::Running
    }

    pub fn mark_quitting(&mut self) {
        if self.state == ShutdownLifecycleState::Running {
            self.state = ShutdownLifecycleState::QuittingRequested;
        }
    }

    pub fn try_begin_cleanup(&mut self) -> bool {
        if matches!(
            self.state,
            ShutdownLifecycleState::Running | ShutdownLifecycleState::QuittingRequested
        ) {
            self.state = ShutdownLifecycleState::CleanupInProgress;
            return true;
        }
        false
    }

    pub fn allow_next_exit_request(&mut self) {
        self.state = ShutdownLifecycleState::ReadyToExit;
    }

    pub fn take_exit_request_allowance(&mut self) -> bool {
        if self.state == ShutdownLifecycleState::ReadyToExit {
            self.state = ShutdownLifecycleState::Exiting;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitRequestedDecision {
    AllowImmediateExit,
    RunBackendCleanupFirst,
    /// Last window went away on a platform where apps outlive their windows.
    StayResident,
}

/// `exit_code` is `None` when the runtime asks to exit because the last
/// window closed, `Some` for an explicit `exit(code)`.
pub fn decide_exit_requested_flow(
    has_exit_request_allowance: bool,
    exit_code: Option<i32>,
    stay_resident_without_windows: bool,
) -> ExitRequestedDecision {
    if has_exit_request_allowance {
        ExitRequestedDecision::AllowImmediateExit
    } else if exit_code.is_none() && stay_resident_without_windows {
        ExitRequestedDecision::StayResident
    } else {
        ExitRequestedDecision::RunBackendCleanupFirst
    }
}

/// Shared, lock-protected [`ShutdownStateMachine`]. Poisoned locks are
/// logged and recovered; shutdown must always be able to make progress.
pub struct ShutdownCoordinator {
    machine: Mutex<ShutdownStateMachine>,
    logs: Arc<dyn LogSink>,
}

impl ShutdownCoordinator {
    pub fn new(logs: Arc<dyn LogSink>) -> Self {
        Self {
            machine: Mutex::new(ShutdownStateMachine::default()),
            logs,
        }
    }

    fn lock(&self, action: &str) -> MutexGuard<'_, ShutdownStateMachine> {
        match self.machine.lock() {
            Ok(guard) => guard,
            Err(error) => {
                self.logs.shutdown(&format!(
                    "shutdown state lock poisoned when {action}: {error}"
                ));
                error.into_inner()
            }
        }
    }

    pub fn state(&self) -> ShutdownLifecycleState {
        self.lock("reading state").state()
    }

    pub fn mark_quitting(&self) {
        self.lock("marking quitting").mark_quitting();
    }

    pub fn is_quitting(&self) -> bool {
        self.lock("reading quitting state").is_quitting()
    }

    pub fn try_begin_cleanup(&self) -> bool {
        self.lock("beginning cleanup").try_begin_cleanup()
    }

    pub fn allow_next_exit_request(&self) {
        self.lock("allowing next exit request")
            .allow_next_exit_request();
    }

    pub fn take_exit_request_allowance(&self) -> bool {
        self.lock("taking exit request allowance")
            .take_exit_request_allowance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogSink;

    #[test]
    fn state_machine_flows_through_cleanup_to_exit() {
        let mut machine = ShutdownStateMachine::default();
        assert_eq!(machine.state(), ShutdownLifecycleState::Running);
        assert!(!machine.is_quitting());

        machine.mark_quitting();
        assert_eq!(machine.state(), ShutdownLifecycleState::QuittingRequested);
        assert!(machine.is_quitting());

        assert!(machine.try_begin_cleanup());
        assert_eq!(machine.state(), ShutdownLifecycleState::CleanupInProgress);

        machine.allow_next_exit_request();
        assert!(machine.take_exit_request_allowance());
        assert_eq!(machine.state(), ShutdownLifecycleState::Exiting);
        assert!(!machine.take_exit_request_allowance());
    }

    #[test]
    fn cleanup_runs_once_across_exit_paths() {
        let coordinator = ShutdownCoordinator::new(Arc::new(MemoryLogSink::default()));
        assert!(coordinator.try_begin_cleanup());
        assert!(!coordinator.try_begin_cleanup());
        coordinator.mark_quitting();
        assert_eq!(coordinator.state(), ShutdownLifecycleState::CleanupInProgress);
    }

    #[test]
    fn exit_request_decision_covers_resident_platforms() {
        assert_eq!(
            decide_exit_requested_flow(true, None, true),
            ExitRequestedDecision::AllowImmediateExit
        );
        assert_eq!(
            decide_exit_requested_flow(false, None, true),
            ExitRequestedDecision::StayResident
        );
        assert_eq!(
            decide_exit_requested_flow(false, Some(0), true),
            ExitRequestedDecision::RunBackendCleanupFirst
        );
        assert_eq!(
            decide_exit_requested_flow(false, None, false),
            ExitRequestedDecision::RunBackendCleanupFirst
        );
    }
}
