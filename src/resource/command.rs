//! Command execution resource.
//!
//! Commands have no observable state: `check` always reports drift, the
//! diff is a static announcement and rollback is a no-op. A command that
//! ran but exited outside the expected set maps to a typed
//! [`CommandExecutionError`].

use std::sync::Arc;
use std::time::Duration;

use agentkit::{AgentClient, AgentError, CommandRequest};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use converge::Resource;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Whether this command may run concurrently with other resources.
    pub concurrent: bool,
    /// Bound on the whole remote execution round-trip.
    pub timeout: Duration,
    /// Exit codes that count as success.
    pub expected_exit_codes: Vec<i64>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            concurrent: false,
            timeout: Duration::from_secs(30),
            expected_exit_codes: vec![0],
        }
    }
}

/// A command that executed but exited outside the expected set.
#[derive(Debug, Error)]
#[error("command {command:?} failed with exit code {exit_code} (expected {expected:?})")]
pub struct CommandExecutionError {
    pub command: String,
    pub exit_code: i64,
    pub expected: Vec<i64>,
    pub stdout: String,
    pub stderr: String,
}

pub struct Command {
    client: Arc<AgentClient>,
    command: String,
    options: CommandOptions,
}

impl Command {
    pub fn new(client: Arc<AgentClient>, command: impl Into<String>, options: CommandOptions) -> Self {
        Self {
            client,
            command: command.into(),
            options,
        }
    }
}

#[async_trait]
impl Resource for Command {
    fn name(&self) -> String {
        format!("command:{}", self.command)
    }

    fn is_concurrent(&self) -> bool {
        self.options.concurrent
    }

    fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            bail!("command cannot be empty");
        }
        if self.options.timeout.is_zero() {
            bail!("timeout must be positive");
        }
        if self.options.expected_exit_codes.is_empty() {
            bail!("at least one expected exit code must be specified");
        }
        Ok(())
    }

    /// Commands have no observable state to compare against.
    async fn check(&mut self, _cancel: &CancellationToken) -> Result<bool> {
        Ok(true)
    }

    async fn diff(&self, _cancel: &CancellationToken) -> Result<String> {
        Ok(format!(
            "diff -- command: {}\n+ will execute\n  timeout: {:?}\n  expected_exit_codes: {:?}\n",
            self.command, self.options.timeout, self.options.expected_exit_codes
        ))
    }

    async fn apply(&mut self, cancel: &CancellationToken) -> Result<()> {
        let request = CommandRequest {
            command: self.command.clone(),
            expected_exit_codes: self.options.expected_exit_codes.clone(),
        };

        let response = match self
            .client
            .execute_command(cancel, &request, self.options.timeout)
            .await
        {
            Ok(response) => response,
            Err(AgentError::Api { code: 408, .. }) => {
                bail!(
                    "command timed out after {:?}: {}",
                    self.options.timeout,
                    self.command
                );
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to execute command {:?}", self.command));
            }
        };

        if !response.success {
            return Err(CommandExecutionError {
                command: self.command.clone(),
                exit_code: response.exit_code,
                expected: self.options.expected_exit_codes.clone(),
                stdout: response.stdout,
                stderr: response.stderr,
            }
            .into());
        }

        Ok(())
    }

    /// Commands are assumed side-effect-free for the planner's purposes.
    async fn rollback(&mut self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}
