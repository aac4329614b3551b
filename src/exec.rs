//! External command execution
//!
//! Every command runs in its own process group with stdout and stderr
//! sharing one pipe. A command that outlives its timeout gets SIGTERM sent
//! to the whole group, then SIGKILL once the grace period is over. Killing
//! the group matters: `ifup` leaves helpers behind that keep the pipe open.

mod lifecycle;

use crate::config::Commands;
use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use lifecycle::{CommandMachine, CommandMachineEvent, DynamicCommandMachine};
use log::{debug, info, warn};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, pipe};
use std::fs::File;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exit code reported when a command could not be started
pub const SPAWN_FAILED: i32 = 127;

/// Exit code and combined stdout/stderr of a finished command
///
/// A command ended by a signal reports the negated signal number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn new(code: i32, output: impl Into<String>) -> Self {
        Self {
            code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Something that can run a command line to completion
pub trait CommandRunner {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput>;
}

/// Render command output for a log line
///
/// Single lines are quoted inline, multi-line output starts on a new line.
pub fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.contains('\n') {
        format!("\n{}", trimmed)
    } else {
        format!(" '{}'", trimmed)
    }
}

/// Runs commands on the host with timeout escalation
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
    term_wait: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration, term_wait: Duration) -> Self {
        Self { timeout, term_wait }
    }

    pub fn from_settings(commands: &Commands) -> Self {
        Self::new(commands.timeout(), commands.term_wait())
    }

    fn spawn(&self, argv: &[&str]) -> Result<(Child, File)> {
        let failed = |message: String| Error::CommandFailed {
            command: argv.join(" "),
            message,
        };

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| failed("Empty command".to_string()))?;

        let (reader, writer) =
            pipe().map_err(|e| failed(format!("Failed to create output pipe: {}", e)))?;
        let writer_err = writer
            .try_clone()
            .map_err(|e| failed(format!("Failed to duplicate output pipe: {}", e)))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(writer_err))
            .process_group(0);

        let spawned = command.spawn();
        // The parent's copies of the write end must close or the reader never sees EOF
        drop(command);

        let child = spawned.map_err(|e| failed(format!("Failed to spawn: {}", e)))?;
        Ok((child, File::from(reader)))
    }

    fn signal_group(&self, pgid: Pid, signal: Signal, argv: &[&str]) {
        if let Err(e) = killpg(pgid, signal) {
            debug!(
                "Sending {} to process group {} of '{}' failed: {}",
                signal,
                pgid,
                argv.join(" "),
                e
            );
        }
    }

    /// Move one step up the SIGTERM/SIGKILL ladder
    ///
    /// Returns the next deadline, or `None` once SIGKILL has been sent.
    fn escalate(
        &self,
        machine: &mut DynamicCommandMachine<()>,
        pid: u32,
        argv: &[&str],
    ) -> Option<Instant> {
        let pgid = Pid::from_raw(pid as i32);
        if machine.current_state() == "Running" {
            warn!(
                "Execution time exceeded for command '{}', sending SIGTERM to \
                 subprocess (pid={}, pgid={})",
                argv.join(" "),
                pid,
                pgid
            );
            self.signal_group(pgid, Signal::SIGTERM, argv);
            advance(machine, CommandMachineEvent::Terminate);
            return Some(Instant::now() + self.term_wait);
        }

        warn!(
            "Command '{}' has not terminated after {} seconds, sending SIGKILL \
             to subprocess (pid={}, pgid={})",
            argv.join(" "),
            self.term_wait.as_secs(),
            pid,
            pgid
        );
        self.signal_group(pgid, Signal::SIGKILL, argv);
        advance(machine, CommandMachineEvent::Kill);
        None
    }

    /// Wait for the direct child, escalating once `deadline` passes
    fn wait(
        &self,
        child: &mut Child,
        machine: &mut DynamicCommandMachine<()>,
        deadline: &mut Instant,
        argv: &[&str],
    ) -> Result<ExitStatus> {
        let failed = |e: std::io::Error| Error::CommandFailed {
            command: argv.join(" "),
            message: format!("Failed to wait on process: {}", e),
        };

        loop {
            if let Some(status) = child.try_wait().map_err(failed)? {
                return Ok(status);
            }
            if Instant::now() < *deadline {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            match self.escalate(machine, child.id(), argv) {
                Some(next) => *deadline = next,
                None => return child.wait().map_err(failed),
            }
        }
    }

    /// Collect the output under the same deadline
    ///
    /// Helpers left in the process group keep the pipe open after the
    /// direct child exits, so they are signalled like the child would be.
    fn collect(
        &self,
        output: &Receiver<Vec<u8>>,
        machine: &mut DynamicCommandMachine<()>,
        deadline: &mut Instant,
        pid: u32,
        argv: &[&str],
    ) -> Vec<u8> {
        loop {
            let wait = if machine.current_state() == "Killing" {
                self.term_wait
            } else {
                deadline.saturating_duration_since(Instant::now())
            };

            match output.recv_timeout(wait) {
                Ok(buffer) => return buffer,
                Err(RecvTimeoutError::Disconnected) => return Vec::new(),
                Err(RecvTimeoutError::Timeout) if machine.current_state() == "Killing" => {
                    warn!(
                        "Output of '{}' still open after SIGKILL, giving up on it",
                        argv.join(" ")
                    );
                    return Vec::new();
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(next) = self.escalate(machine, pid, argv) {
                        *deadline = next;
                    }
                }
            }
        }
    }
}

fn advance(machine: &mut DynamicCommandMachine<()>, event: CommandMachineEvent) {
    if let Err(e) = machine.handle(event) {
        debug!("Command lifecycle transition rejected: {:?}", e);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        debug!("Executing '{}'", argv.join(" "));
        let (mut child, mut reader) = self.spawn(argv)?;

        let (tx, rx) = channel::bounded(1);
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            let _ = tx.send(buffer);
        });

        let mut machine = CommandMachine::new(()).into_dynamic();
        let mut deadline = Instant::now() + self.timeout;

        let status = self.wait(&mut child, &mut machine, &mut deadline, argv)?;
        let buffer = self.collect(&rx, &mut machine, &mut deadline, child.id(), argv);
        let escalated = machine.current_state() != "Running";
        advance(&mut machine, CommandMachineEvent::Collect);

        let output = String::from_utf8_lossy(&buffer).into_owned();
        let code = exit_code(status);
        if escalated && code == 0 {
            info!("Command '{}' output:{}", argv.join(" "), format_output(&output));
        }
        Ok(CommandOutput::new(code, output))
    }
}
