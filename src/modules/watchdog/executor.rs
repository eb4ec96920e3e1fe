use crate::modules::server::backup::BackupRunner;
use crate::remote::ssh::{SshClient, SshOutput};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("shutdown did not finish within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    RemoteFailure(String),
}

/// Powers the game host down. Called at most once per countdown.
///
/// `prepare` runs first and is bounded only by its own limits (a backup can
/// take an hour); `execute` is the shutdown itself and is what the
/// watchdog's shutdown timeout applies to.
#[async_trait]
pub trait ShutdownExecutor: Send + Sync {
    async fn prepare(&self) -> Result<String, ExecutorError> {
        Ok(String::new())
    }

    async fn execute(&self) -> Result<String, ExecutorError>;
}

pub const SHUTDOWN_COMMAND: &str = "sudo shutdown -h now";

/// ssh reports 255 when the host drops the connection, which is what a
/// successful `shutdown` looks like from our side.
pub fn shutdown_accepted(output: &SshOutput) -> bool {
    output.success()
        || (output.code == Some(255) && output.stderr.contains("closed by remote host"))
}

/// Shuts the host down over SSH, optionally taking a backup first.
#[derive(Debug, Clone)]
pub struct SshShutdown {
    ssh: SshClient,
    backup: Option<BackupRunner>,
    limit: Duration,
}

impl SshShutdown {
    pub fn new(ssh: SshClient, limit: Duration) -> Self {
        Self {
            ssh,
            backup: None,
            limit,
        }
    }

    pub fn with_backup(mut self, backup: BackupRunner) -> Self {
        self.backup = Some(backup);
        self
    }
}

#[async_trait]
impl ShutdownExecutor for SshShutdown {
    async fn prepare(&self) -> Result<String, ExecutorError> {
        let Some(backup) = &self.backup else {
            return Ok(String::new());
        };

        info!("Running backup before shutdown");
        backup
            .run()
            .await
            .map_err(|e| ExecutorError::RemoteFailure(format!("backup failed: {}", e)))
    }

    async fn execute(&self) -> Result<String, ExecutorError> {
        let output = self
            .ssh
            .run(SHUTDOWN_COMMAND, self.limit)
            .await
            .map_err(|e| ExecutorError::RemoteFailure(e.to_string()))?;

        if !shutdown_accepted(&output) {
            error!("Shutdown command rejected: {:?}", output);
            return Err(ExecutorError::RemoteFailure(format!(
                "`{}` exited with {:?}: {}",
                SHUTDOWN_COMMAND,
                output.code,
                output.stderr.trim()
            )));
        }

        Ok(output.combined())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: Option<i32>, stderr: &str) -> SshOutput {
        SshOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            code,
        }
    }

    #[test]
    fn dropped_connection_counts_as_shutdown() {
        assert!(shutdown_accepted(&output(Some(0), "")));
        assert!(shutdown_accepted(&output(
            Some(255),
            "Connection to 10.0.0.2 closed by remote host."
        )));
    }

    #[tokio::test]
    async fn without_backup_preparation_is_a_no_op() {
        let shutdown = SshShutdown::new(
            SshClient::new("minecraft", "localhost"),
            Duration::from_secs(1),
        );
        assert_eq!(shutdown.prepare().await, Ok(String::new()));
    }

    #[test]
    fn auth_and_sudo_failures_are_rejected() {
        assert!(!shutdown_accepted(&output(Some(255), "Permission denied (publickey).")));
        assert!(!shutdown_accepted(&output(Some(1), "sudo: a password is required")));
        assert!(!shutdown_accepted(&output(None, "")));
    }
}
