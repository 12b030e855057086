//! External tool execution
//!
//! Every component that shells out (package manager, gradle, xcodebuild,
//! security, scaffolding tool) does so through the [`ToolRunner`] trait so
//! tests can substitute a scripted implementation. The production
//! [`SystemRunner`] spawns blocking child processes and captures their
//! output; a non-zero exit is data for callers that inspect version output,
//! and an error for callers using [`ToolRunner::run_checked`].

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Errors from spawning or checking an external tool invocation
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("tool not found: {program}")]
    NotFound { program: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {detail}")]
    Failed {
        program: String,
        status: i32,
        detail: String,
    },
}

/// Result type for tool execution
pub type ExecResult<T> = Result<T, ExecError>;

/// Captured output of a completed tool invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status; -1 when the process was killed by a signal
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Stdout and stderr joined, for version extraction (some tools print
    /// their version banner on stderr, e.g. `java -version`)
    pub fn combined(&self) -> String {
        let mut s = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !s.is_empty() {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }
}

/// Seam for invoking external toolchains
pub trait ToolRunner: Send + Sync {
    /// Run a tool to completion, capturing output. A non-zero exit status is
    /// returned in the output, not as an error.
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> ExecResult<CommandOutput>;

    /// Run a tool and treat a non-zero exit status as an error.
    fn run_checked(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> ExecResult<CommandOutput> {
        let output = self.run(program, args, cwd)?;
        if output.success() {
            Ok(output)
        } else {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            Err(ExecError::Failed {
                program: program.to_string(),
                status: output.status,
                detail,
            })
        }
    }
}

/// Production runner backed by `std::process::Command`
pub struct SystemRunner;

impl SystemRunner {
    /// Resolve a program on PATH up front so a missing tool surfaces as a
    /// distinct error rather than a generic spawn failure. Relative paths
    /// (e.g. `./gradlew`) are resolved against the working directory.
    fn resolve(program: &str, cwd: Option<&Path>) -> ExecResult<PathBuf> {
        if program.contains('/') {
            let path = match cwd {
                Some(dir) if !Path::new(program).is_absolute() => dir.join(program),
                _ => PathBuf::from(program),
            };
            if path.exists() {
                return Ok(path);
            }
            return Err(ExecError::NotFound {
                program: program.to_string(),
            });
        }
        which::which(program).map_err(|_| ExecError::NotFound {
            program: program.to_string(),
        })
    }
}

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> ExecResult<CommandOutput> {
        let resolved = Self::resolve(program, cwd)?;

        let mut cmd = Command::new(&resolved);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        log::debug!("exec: {} {}", program, args.join(" "));

        let output = cmd.output().map_err(|e| ExecError::Spawn {
            program: program.to_string(),
            source: e,
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }
}
