use super::log::{parse_line, LogEvent};
use crate::remote::SshClient;
use crate::tasks::Task;
use async_trait::async_trait;
use poise::serenity_prelude::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Receives the parsed server log stream.
#[async_trait]
pub trait LogListener: Send + Sync {
    fn name(&self) -> &str;
    /// The stream is up; lines from now on will be delivered.
    async fn connected(&self) {}
    async fn on_event(&self, event: &LogEvent);
    /// The stream ended; events may have been missed.
    async fn disconnected(&self) {}
}

/// Follows the server log over SSH and fans parsed lines out to listeners.
/// Each execution is one tail session; the task manager reconnects after
/// [`RECONNECT_DELAY`].
#[derive(Clone)]
pub struct LogTailTask {
    ssh: SshClient,
    path: String,
    listeners: Vec<Arc<dyn LogListener>>,
}

impl LogTailTask {
    pub fn new(ssh: SshClient, path: impl Into<String>) -> Self {
        Self {
            ssh,
            path: path.into(),
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn LogListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    async fn dispatch(&self, event: &LogEvent) {
        for listener in &self.listeners {
            listener.on_event(event).await;
        }
    }

    async fn disconnect_all(&self) {
        for listener in &self.listeners {
            debug!("Notifying {} of log disconnect", listener.name());
            listener.disconnected().await;
        }
    }
}

#[async_trait]
impl Task for LogTailTask {
    fn name(&self) -> &str {
        "LogTail"
    }

    fn schedule(&self) -> Option<Duration> {
        Some(RECONNECT_DELAY)
    }

    async fn execute(&mut self, _ctx: &Context) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut stream = match self.ssh.tail(&self.path) {
            Ok(stream) => stream,
            Err(e) => {
                self.disconnect_all().await;
                return Err(e.into());
            }
        };

        info!("Following {} on {}", self.path, self.ssh.destination());
        for listener in &self.listeners {
            listener.connected().await;
        }

        while let Some(line) = stream.next_line().await {
            if let Some(event) = parse_line(&line) {
                debug!("Log event: {:?}", event);
                self.dispatch(&event).await;
            }
        }

        warn!("Log stream for {} ended, reconnecting", self.path);
        self.disconnect_all().await;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }
}
