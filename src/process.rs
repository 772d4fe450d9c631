//! Subprocess execution with captured output.

use crate::error::Result;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Exit status and combined stdout/stderr of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external programs. Backup engines and the script check go through it.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs programs with `tokio::process`.
///
/// Children are killed when the returned future is dropped, so a cancelled
/// or timed-out call does not leave the process behind.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!(program = %program, ?args, "Running command");

        let out = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        Ok(CommandOutput {
            exit_code: out.status.code(),
            output,
        })
    }
}

/// Heuristic for tool failures that may clear up on their own.
pub fn looks_transient(output: &str) -> bool {
    const MARKERS: [&str; 6] = [
        "lock",
        "timeout",
        "timed out",
        "connection refused",
        "temporarily unavailable",
        "too many requests",
    ];
    let lower = output.to_ascii_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}
