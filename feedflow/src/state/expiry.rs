//! Source staleness and the expire-action hook.

use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::to_chrono;

/// How stale a source may get before the fetcher reports it expired.
///
/// The action's debounce is per flow, not per source: one invocation round
/// covers every source expired at that moment, and a source going stale
/// within `delay` of that round waits for the next one.
#[derive(Debug, Clone)]
pub struct ExpirePolicy {
    /// Maximum allowed age of a source's checkpoint.
    pub expire_interval: Duration,
    /// Command to run when sources expire.
    pub action: Option<ExpireAction>,
}

impl ExpirePolicy {
    /// Creates a policy without an action.
    #[must_use]
    pub fn new(expire_interval: Duration) -> Self {
        Self {
            expire_interval,
            action: None,
        }
    }

    /// Attaches an expire action.
    #[must_use]
    pub fn with_action(mut self, action: ExpireAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// External command run for expired sources.
///
/// Invoked as `command <flow> <source> <checkpoint unix secs> <args...>`.
#[derive(Debug, Clone)]
pub struct ExpireAction {
    /// Program to execute.
    pub command: String,
    /// Extra arguments appended after the fixed ones.
    pub args: Vec<String>,
    /// Minimum time between two invocations.
    pub delay: Duration,
    /// Upper bound on a single invocation.
    pub timeout: Duration,
}

/// What happened when the expire action ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The process exited. The exit code is informational only.
    Exited {
        /// Exit code, `None` if killed by a signal.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The process could not be started.
    SpawnFailed(String),
    /// The process exceeded the timeout and was killed.
    TimedOut,
}

impl ExpireAction {
    /// Creates an action with a one-minute delay and a 30 second timeout.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            delay: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the extra arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the debounce delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns true if more than `delay` has passed since `last`.
    #[must_use]
    pub fn action_due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last.map_or(true, |last| now - last > to_chrono(self.delay))
    }

    /// Runs the command for one expired source.
    pub async fn invoke(
        &self,
        flow: &str,
        source: &str,
        checkpoint: DateTime<Utc>,
    ) -> ActionOutcome {
        let child = tokio::process::Command::new(&self.command)
            .arg(flow)
            .arg(source)
            .arg(checkpoint.timestamp().to_string())
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                warn!(flow, source, command = %self.command, error = %e, "expire action failed to spawn");
                return ActionOutcome::SpawnFailed(e.to_string());
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(flow, source, error = %e, "expire action process error");
                return ActionOutcome::SpawnFailed(e.to_string());
            }
            Err(_) => {
                warn!(
                    flow,
                    source,
                    timeout_secs = self.timeout.as_secs(),
                    "expire action timed out"
                );
                return ActionOutcome::TimedOut;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        info!(flow, source, code = ?output.status.code(), "expire action finished");
        if !stdout.is_empty() {
            debug!(flow, source, stdout = %stdout, "expire action stdout");
        }
        if !stderr.is_empty() {
            debug!(flow, source, stderr = %stderr, "expire action stderr");
        }

        ActionOutcome::Exited {
            code: output.status.code(),
            stdout,
            stderr,
        }
    }
}
