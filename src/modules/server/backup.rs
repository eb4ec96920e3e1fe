use crate::remote::ssh::{shell_quote, SshClient, SshError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

const BACKUP_LIMIT: Duration = Duration::from_secs(60 * 60);
const ACTION_LIMIT: Duration = Duration::from_secs(120);

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("a backup is already running, please wait")]
    Busy,
    #[error("backup script exited with {code:?}:\n{output}")]
    Failed { code: Option<i32>, output: String },
    #[error(transparent)]
    Ssh(#[from] SshError),
}

/// What happens to the host or its containers once the backup succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum BackupKind {
    #[name = "Server Restart"]
    ServerRestart,
    #[name = "Server Shutdown"]
    ServerShutdown,
    #[name = "Mc Hot"]
    McHot,
    #[name = "Mc Restart"]
    McRestart,
    #[name = "Mc Shutdown"]
    McShutdown,
}

impl BackupKind {
    /// Remote commands to run after the backup, in order.
    pub fn post_actions(&self, containers: &[String]) -> Vec<String> {
        match self {
            Self::McHot => Vec::new(),
            Self::ServerRestart => vec!["sudo reboot".to_string()],
            Self::ServerShutdown => vec!["sudo shutdown -h now".to_string()],
            Self::McRestart => containers
                .iter()
                .map(|c| format!("docker restart {}", shell_quote(c)))
                .collect(),
            Self::McShutdown => containers
                .iter()
                .map(|c| format!("docker stop {}", shell_quote(c)))
                .collect(),
        }
    }

    /// Needs the server-control role rather than the player role.
    pub fn is_privileged(&self) -> bool {
        !matches!(self, Self::McHot)
    }
}

/// Runs the backup script on the host. Only one backup runs at a time.
#[derive(Debug, Clone)]
pub struct BackupRunner {
    ssh: SshClient,
    script: String,
    containers: Vec<String>,
    lock: Arc<Mutex<()>>,
}

impl BackupRunner {
    pub fn new(ssh: SshClient, script: impl Into<String>, containers: Vec<String>) -> Self {
        Self {
            ssh,
            script: script.into(),
            containers,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn run(&self) -> Result<String, BackupError> {
        let _guard = self.lock.try_lock().map_err(|_| BackupError::Busy)?;

        info!("Starting backup script {}", self.script);
        let output = self.ssh.run(&shell_quote(&self.script), BACKUP_LIMIT).await?;

        if output.success() {
            info!("Backup script finished");
            Ok(output.combined())
        } else {
            error!("Backup script failed with {:?}", output.code);
            Err(BackupError::Failed {
                code: output.code,
                output: output.combined(),
            })
        }
    }

    /// Runs the follow-up commands for `kind`; failures are logged and the
    /// remaining commands still run.
    pub async fn post_action(&self, kind: BackupKind) {
        for remote in kind.post_actions(&self.containers) {
            match self.ssh.run(&remote, ACTION_LIMIT).await {
                Ok(output) if output.success() => info!("Post-backup `{}` done", remote),
                Ok(output) => error!("Post-backup `{}` exited with {:?}", remote, output.code),
                Err(e) => error!("Post-backup `{}` failed: {}", remote, e),
            }
        }
    }
}
