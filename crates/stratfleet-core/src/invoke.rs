//! Typed invocation of the external backtest tool.
//!
//! The tool is a black box: it takes one argument holding the space-joined
//! strategy names, works inside a shared working directory, and either exits
//! zero after dropping result artifacts there or exits non-zero with
//! diagnostics on stderr. Failures are values, not exceptions, so the batch
//! scheduler can branch on them explicitly.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

/// Outcome of one tool invocation.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// The process ran to completion (successfully or not).
    Completed {
        /// Exit code, or `None` if the process was killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The process could not be spawned at all.
    SpawnFailed {
        /// The spawn error, rendered.
        message: String,
    },
}

impl ToolOutcome {
    /// True only for a clean zero exit.
    pub fn success(&self) -> bool {
        matches!(
            self,
            Self::Completed {
                exit_code: Some(0),
                ..
            }
        )
    }

    /// Diagnostic text suitable for recording against each strategy in the
    /// failed batch. Falls back to stdout, then to the bare exit status, when
    /// stderr is empty.
    pub fn error_text(&self) -> String {
        match self {
            Self::Completed {
                exit_code,
                stdout,
                stderr,
            } => {
                let diag = if !stderr.trim().is_empty() {
                    stderr.trim()
                } else {
                    stdout.trim()
                };
                if diag.is_empty() {
                    match exit_code {
                        Some(code) => format!("tool exited with code {code}"),
                        None => "tool terminated by signal".to_owned(),
                    }
                } else {
                    diag.to_owned()
                }
            }
            Self::SpawnFailed { message } => message.clone(),
        }
    }
}

/// The external backtest command and the directory it runs in.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    working_dir: PathBuf,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Directory the tool runs in (and drops its artifacts into).
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run the tool for one batch, capturing exit status and output.
    pub async fn run(&self, batch: &[String]) -> ToolOutcome {
        debug!(program = %self.program, batch = ?batch, "invoking backtest tool");

        let result = Command::new(&self.program)
            .arg(batch.join(" "))
            .current_dir(&self.working_dir)
            .output()
            .await;

        match result {
            Ok(output) => ToolOutcome::Completed {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => ToolOutcome::SpawnFailed {
                message: format!("failed to spawn {:?}: {e}", self.program),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[tokio::test]
    async fn clean_exit_is_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = write_script(dir.path(), "tool.sh", "exit 0");

        let tool = ToolCommand::new(script.to_string_lossy(), dir.path());
        let outcome = tool.run(&["A".to_owned(), "B".to_owned()]).await;

        assert!(outcome.success());
    }

    #[tokio::test]
    async fn batch_is_passed_as_one_space_joined_argument() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = write_script(dir.path(), "tool.sh", r#"printf '%s' "$1" > args.txt"#);

        let tool = ToolCommand::new(script.to_string_lossy(), dir.path());
        let outcome = tool.run(&["A".to_owned(), "B".to_owned()]).await;

        assert!(outcome.success());
        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert_eq!(args, "A B");
    }

    #[tokio::test]
    async fn nonzero_exit_captures_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = write_script(dir.path(), "tool.sh", "echo boom >&2; exit 3");

        let tool = ToolCommand::new(script.to_string_lossy(), dir.path());
        let outcome = tool.run(&["A".to_owned()]).await;

        assert!(!outcome.success());
        assert_eq!(outcome.error_text(), "boom");
        match outcome {
            ToolOutcome::Completed { exit_code, .. } => assert_eq!(exit_code, Some(3)),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = ToolCommand::new("./no_such_tool_stratfleet_test", dir.path());
        let outcome = tool.run(&["A".to_owned()]).await;

        assert!(!outcome.success());
        assert!(matches!(outcome, ToolOutcome::SpawnFailed { .. }));
        assert!(!outcome.error_text().is_empty());
    }
}
