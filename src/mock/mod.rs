//! Scripted tool runner for tests
//!
//! In-process substitute for [`SystemRunner`](crate::exec::SystemRunner) with
//! canned responses, failure injection, and a recorded call log so tests can
//! assert exactly which external tools a pipeline stage invoked and in what
//! order.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::exec::{CommandOutput, ExecResult, ToolRunner};

/// One recorded tool invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl RecordedCall {
    /// `"program arg1 arg2"` form, convenient for substring assertions
    pub fn command_line(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }
}

/// A canned response rule. Rules are matched in insertion order; the first
/// rule whose program matches and whose `arg_contains` (if any) appears in
/// the argument list wins.
struct Rule {
    program: String,
    arg_contains: Option<String>,
    stdout: String,
    stderr: String,
    status: i32,
}

impl Rule {
    fn matches(&self, program: &str, args: &[&str]) -> bool {
        if self.program != program {
            return false;
        }
        match &self.arg_contains {
            Some(needle) => args.iter().any(|a| a.contains(needle.as_str())),
            None => true,
        }
    }
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    calls: Vec<RecordedCall>,
}

/// Scripted [`ToolRunner`] with failure injection
#[derive(Default)]
pub struct ScriptedRunner {
    state: Mutex<State>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with the given stdout whenever `program` runs
    pub fn respond(&self, program: &str, stdout: &str) {
        self.push_rule(program, None, stdout, "", 0);
    }

    /// Succeed with the given stdout when `program` runs with an argument
    /// containing `arg_contains`
    pub fn respond_matching(&self, program: &str, arg_contains: &str, stdout: &str) {
        self.push_rule(program, Some(arg_contains), stdout, "", 0);
    }

    /// Fail with status 1 and the given stderr whenever `program` runs
    pub fn fail(&self, program: &str, stderr: &str) {
        self.push_rule(program, None, "", stderr, 1);
    }

    /// Fail when `program` runs with an argument containing `arg_contains`
    pub fn fail_matching(&self, program: &str, arg_contains: &str, stderr: &str) {
        self.push_rule(program, Some(arg_contains), "", stderr, 1);
    }

    fn push_rule(
        &self,
        program: &str,
        arg_contains: Option<&str>,
        stdout: &str,
        stderr: &str,
        status: i32,
    ) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.rules.push(Rule {
            program: program.to_string(),
            arg_contains: arg_contains.map(str::to_string),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            status,
        });
    }

    /// All invocations recorded so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.clone()
    }

    /// Recorded command lines for `program`, in invocation order
    pub fn calls_to(&self, program: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .map(|c| c.command_line())
            .collect()
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> ExecResult<CommandOutput> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(RecordedCall {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: cwd.map(Path::to_path_buf),
        });

        // Unscripted commands succeed with empty output
        let (stdout, stderr, status) = state
            .rules
            .iter()
            .find(|r| r.matches(program, args))
            .map(|r| (r.stdout.clone(), r.stderr.clone(), r.status))
            .unwrap_or_default();

        Ok(CommandOutput {
            stdout,
            stderr,
            status,
        })
    }
}
