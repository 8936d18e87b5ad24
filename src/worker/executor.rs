use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::{DispatchError, Result};
use crate::scheduler::{Job, JobOutcome, Processor};

/// Result of running one shell command
#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub outcome: JobOutcome,
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Processor that runs each job's command with `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellProcessor {
    shell: String,
}

impl Default for ShellProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellProcessor {
    pub fn new() -> Self {
        Self::with_shell("sh")
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Run `command` and capture its output.
    pub async fn execute(&self, job_id: Uuid, command: &str) -> ExecutionResult {
        tracing::debug!(job_id = %job_id, command, shell = %self.shell, "Executing job");

        let result = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        Self::process_output(job_id, result)
    }

    fn process_output(
        job_id: Uuid,
        result: std::result::Result<std::process::Output, std::io::Error>,
    ) -> ExecutionResult {
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                return ExecutionResult {
                    job_id,
                    outcome: JobOutcome::Failed,
                    exit_code: None,
                    output: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        let (outcome, error) = if output.status.success() {
            (JobOutcome::Complete, None)
        } else if stderr.is_empty() {
            (JobOutcome::Failed, Some(format!("Exit code: {:?}", exit_code)))
        } else {
            (JobOutcome::Failed, Some(stderr))
        };

        ExecutionResult {
            job_id,
            outcome,
            exit_code,
            output: if stdout.is_empty() { None } else { Some(stdout) },
            error,
        }
    }
}

#[async_trait]
impl Processor for ShellProcessor {
    async fn run(&self, job: &Job) -> Result<()> {
        let result = self.execute(job.id, &job.command).await;

        if let Some(ref output) = result.output {
            tracing::info!(job_id = %job.id, output = %output.trim_end(), "Job output");
        }

        match result.outcome {
            JobOutcome::Complete => Ok(()),
            JobOutcome::Failed => Err(DispatchError::Execution(
                result
                    .error
                    .unwrap_or_else(|| "unknown failure".to_string())
                    .trim_end()
                    .to_string(),
            )),
        }
    }
}
