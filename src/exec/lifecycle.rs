//! Command lifecycle state machine
//!
//! A command starts Running, moves to Terminating once SIGTERM is sent to
//! its process group and to Killing once SIGKILL follows. Collected is
//! reached from any of them when the exit status and output are in.

use state_machines::state_machine;

state_machine! {
    name: CommandMachine,
    dynamic: true,
    initial: Running,
    states: [Running, Terminating, Killing, Collected],
    events {
        terminate {
            transition: { from: Running, to: Terminating }
        }
        kill {
            transition: { from: Terminating, to: Killing }
        }
        collect {
            transition: { from: [Running, Terminating, Killing], to: Collected }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let machine = CommandMachine::new(()).into_dynamic();
        assert_eq!(machine.current_state(), "Running");
    }

    #[test]
    fn test_escalation_transitions() {
        let mut machine = CommandMachine::new(()).into_dynamic();
        assert!(machine.handle(CommandMachineEvent::Kill).is_err());

        machine.handle(CommandMachineEvent::Terminate).unwrap();
        assert_eq!(machine.current_state(), "Terminating");
        machine.handle(CommandMachineEvent::Kill).unwrap();
        assert_eq!(machine.current_state(), "Killing");
        machine.handle(CommandMachineEvent::Collect).unwrap();
        assert_eq!(machine.current_state(), "Collected");
    }

    #[test]
    fn test_normal_exit_collects() {
        let mut machine = CommandMachine::new(()).into_dynamic();
        machine.handle(CommandMachineEvent::Collect).unwrap();
        assert_eq!(machine.current_state(), "Collected");
        assert!(machine.handle(CommandMachineEvent::Terminate).is_err());
    }
}
