use std::{process::Stdio, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStdout, Command},
    time::timeout,
};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SshError {
    #[error("failed to spawn ssh: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("remote command exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("remote command did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct SshOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl SshOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, the way operators want to read it in chat.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        if !self.stderr.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Error:\n");
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

/// Runs commands on the game host through the system `ssh` binary with
/// key-based, non-interactive authentication.
#[derive(Debug, Clone)]
pub struct SshClient {
    user: String,
    host: String,
}

impl SshClient {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args([
            "-o",
            "BatchMode=yes",
            "-o",
            "ConnectTimeout=10",
            "-o",
            "StrictHostKeyChecking=accept-new",
            "-T",
        ])
        .arg(self.destination())
        .arg(remote)
        .stdin(Stdio::null())
        .kill_on_drop(true);
        cmd
    }

    /// Runs `remote` and collects its output, whatever the exit status.
    pub async fn run(&self, remote: &str, limit: Duration) -> Result<SshOutput, SshError> {
        debug!("ssh {} {}", self.destination(), remote);

        let mut cmd = self.command(remote);
        let output = match timeout(limit, cmd.output()).await {
            Ok(output) => output?,
            Err(_) => return Err(SshError::Timeout(limit)),
        };

        Ok(SshOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        })
    }

    /// Like [`run`](Self::run) but treats a non-zero exit as an error.
    pub async fn exec(&self, remote: &str, limit: Duration) -> Result<String, SshError> {
        let output = self.run(remote, limit).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(SshError::Failed {
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Follows a remote file from its current end, yielding new lines.
    pub fn tail(&self, path: &str) -> Result<LogStream, SshError> {
        let remote = format!("tail -n 0 -F {}", shell_quote(path));
        let mut child = self
            .command(&remote)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SshError::Spawn(std::io::Error::other("ssh stdout was not captured"))
        })?;

        Ok(LogStream {
            _child: child,
            lines: BufReader::new(stdout).lines(),
        })
    }
}

/// A live `tail -F` over SSH. Dropping it kills the ssh process.
pub struct LogStream {
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl LogStream {
    /// Next line, or `None` once the connection is gone.
    pub async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!("Log stream read failed: {}", e);
                None
            }
        }
    }
}

/// Single-quotes `arg` for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_paths_with_spaces_and_quotes() {
        assert_eq!(shell_quote("/srv/my world"), "'/srv/my world'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn combined_output_appends_stderr() {
        let out = SshOutput {
            stdout: "done\n".into(),
            stderr: "warn: disk\n".into(),
            code: Some(0),
        };
        assert_eq!(out.combined(), "done\nError:\nwarn: disk");

        let quiet = SshOutput {
            stdout: "ok".into(),
            stderr: "  ".into(),
            code: Some(1),
        };
        assert_eq!(quiet.combined(), "ok");
        assert!(!quiet.success());
    }
}
