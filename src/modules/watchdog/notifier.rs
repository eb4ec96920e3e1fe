use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, ChannelType, CreateMessage, GuildId, Http};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, warn};

const DISCORD_LIMIT: Duration = Duration::from_secs(5);

/// Awaits a Discord call for at most [`DISCORD_LIMIT`], logging any failure.
async fn within<T, E: Display>(what: &str, call: impl Future<Output = Result<T, E>>) -> Option<T> {
    match timeout(DISCORD_LIMIT, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("Failed to {}: {}", what, e);
            None
        }
        Err(_) => {
            warn!("Timeout trying to {}", what);
            None
        }
    }
}

/// Best-effort operator channel. Implementations log their own failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str);
}

/// Posts into the guild text channel with the configured name.
pub struct ChannelNotifier {
    http: Arc<Http>,
    guild_id: GuildId,
    channel_name: String,
    channel: Mutex<Option<ChannelId>>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, guild_id: GuildId, channel_name: impl Into<String>) -> Self {
        Self {
            http,
            guild_id,
            channel_name: channel_name.into(),
            channel: Mutex::new(None),
        }
    }

    async fn resolve(&self) -> Option<ChannelId> {
        let mut cached = self.channel.lock().await;
        if cached.is_none() {
            let what = format!("list channels of guild {}", self.guild_id);
            if let Some(channels) = within(&what, self.guild_id.channels(&*self.http)).await {
                *cached = channels
                    .values()
                    .find(|c| c.kind == ChannelType::Text && c.name == self.channel_name)
                    .map(|c| c.id);
                if cached.is_none() {
                    warn!("No text channel named #{} in guild {}", self.channel_name, self.guild_id);
                }
            }
        }
        *cached
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, message: &str) {
        let Some(channel) = self.resolve().await else {
            return;
        };

        let what = format!("notify #{}", self.channel_name);
        within(
            &what,
            channel.send_message(&*self.http, CreateMessage::new().content(message)),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn stalled_discord_call_is_abandoned() {
        let started = Instant::now();
        let result = within("list channels", std::future::pending::<Result<u8, String>>()).await;

        assert_eq!(result, None);
        assert!(started.elapsed() >= DISCORD_LIMIT);
    }

    #[tokio::test]
    async fn failed_discord_call_yields_nothing() {
        let result = within("send", async { Err::<u8, _>("missing access") }).await;
        assert_eq!(result, None);
        assert_eq!(within("send", async { Ok::<_, String>(3) }).await, Some(3));
    }
}
