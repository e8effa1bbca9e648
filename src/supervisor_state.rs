use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorState {
    #[default]
    Stopped,
    Starting,
    Ready,
    Stopping,
}

impl SupervisorState {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Legal edges between supervisor states. A rejected transition leaves the
/// machine where it was.
#[derive(Debug, Default)]
pub struct SupervisorStateMachine {
    state: SupervisorState,
}

impl SupervisorStateMachine {
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn try_begin_start(&mut self) -> bool {
        self.transition(SupervisorState::Stopped, SupervisorState::Starting)
    }

    pub fn try_mark_ready(&mut self) -> bool {
        self.transition(SupervisorState::Starting, SupervisorState::Ready)
    }

    pub fn try_begin_stop(&mut self) -> bool {
        if matches!(
            self.state,
            SupervisorState::Starting | SupervisorState::Ready
        ) {
            self.state = SupervisorState::Stopping;
            return true;
        }
        false
    }

    /// Any state may fall back to `Stopped`: a finished stop, a failed
    /// startup or a process that died on its own.
    pub fn mark_stopped(&mut self) {
        self.state = SupervisorState::Stopped;
    }

    fn transition(&mut self, from: SupervisorState, to: SupervisorState) -> bool {
        if self.state == from {
            self.state = to;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_runs_full_lifecycle() {
        let mut machine = SupervisorStateMachine::default();
        assert_eq!(machine.state(), SupervisorState::Stopped);
        assert!(machine.try_begin_start());
        assert!(machine.try_mark_ready());
        assert_eq!(machine.state(), SupervisorState::Ready);
        assert!(machine.try_begin_stop());
        assert_eq!(machine.state(), SupervisorState::Stopping);
        machine.mark_stopped();
        assert_eq!(machine.state(), SupervisorState::Stopped);
    }

    #[test]
    fn state_machine_rejects_out_of_order_edges() {
        let mut machine = SupervisorStateMachine::default();
        assert!(!machine.try_mark_ready());
        assert!(!machine.try_begin_stop());

        assert!(machine.try_begin_start());
        assert!(!machine.try_begin_start());
        assert!(machine.try_begin_stop());
        assert!(!machine.try_mark_ready());
        assert_eq!(machine.state(), SupervisorState::Stopping);
    }

    #[test]
    fn failed_startup_returns_to_stopped() {
        let mut machine = SupervisorStateMachine::default();
        assert!(machine.try_begin_start());
        machine.mark_stopped();
        assert_eq!(machine.state().to_string(), "stopped");
        assert!(machine.try_begin_start());
    }
}
