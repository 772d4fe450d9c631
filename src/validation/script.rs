//! Script check.

use crate::error::{DrError, Result};
use crate::process::CommandRunner;
use std::sync::Arc;
use tracing::debug;

/// Runs a script through `<shell> -c`.
pub struct ScriptCheck {
    shell: String,
    runner: Arc<dyn CommandRunner>,
}

impl ScriptCheck {
    pub fn new(shell: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            shell: shell.into(),
            runner,
        }
    }

    /// Pass on exit status 0. Anything else, including a shell that cannot
    /// be started, is a [`DrError::ScriptFailed`] carrying the combined output.
    pub async fn run(&self, script: &str) -> Result<()> {
        let args = ["-c".to_string(), script.to_string()];
        let out = match self.runner.run(&self.shell, &args).await {
            Ok(out) => out,
            Err(e) => {
                return Err(DrError::ScriptFailed {
                    exit_code: None,
                    output: format!("failed to start {}: {}", self.shell, e),
                })
            }
        };

        debug!(exit_code = ?out.exit_code, "Validation script finished");
        if out.success() {
            Ok(())
        } else {
            Err(DrError::ScriptFailed {
                exit_code: out.exit_code,
                output: out.output,
            })
        }
    }
}
