//! Test doubles

use crate::error::{Error, Result};
use crate::exec::{CommandOutput, CommandRunner};
use std::cell::RefCell;

enum Response {
    Output(CommandOutput),
    SpawnFailure,
}

/// Records every command line and answers from canned responses
///
/// The first response whose prefix matches the command line wins;
/// unmatched commands succeed with no output.
#[derive(Default)]
pub struct FakeRunner {
    calls: RefCell<Vec<String>>,
    responses: Vec<(String, Response)>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, prefix: &str, code: i32, output: &str) -> Self {
        self.responses.push((
            prefix.to_string(),
            Response::Output(CommandOutput::new(code, output)),
        ));
        self
    }

    pub fn fail_spawn(mut self, prefix: &str) -> Self {
        self.responses
            .push((prefix.to_string(), Response::SpawnFailure));
        self
    }

    /// Command lines run so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Command lines starting with `prefix`
    pub fn commands_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        let line = argv.join(" ");
        self.calls.borrow_mut().push(line.clone());

        let response = self
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()));
        match response {
            Some((_, Response::Output(out))) => Ok(out.clone()),
            Some((_, Response::SpawnFailure)) => Err(Error::CommandFailed {
                command: line,
                message: "Failed to spawn: No such file or directory (os error 2)".to_string(),
            }),
            None => Ok(CommandOutput::new(0, "")),
        }
    }
}
