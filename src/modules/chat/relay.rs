use super::log::LogEvent;
use super::task::LogListener;
use crate::events::EventHandler;
use crate::remote::RconClient;
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, Context, CreateMessage, FullEvent, Http, Message};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, warn};

/// Mirrors server log events into the Discord chat channel.
pub struct ChatRelay {
    http: Arc<Http>,
    channel: ChannelId,
}

impl ChatRelay {
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        Self { http, channel }
    }
}

#[async_trait]
impl LogListener for ChatRelay {
    fn name(&self) -> &str {
        "ChatRelay"
    }

    async fn on_event(&self, event: &LogEvent) {
        let content = event.to_discord();
        match timeout(
            Duration::from_secs(5),
            self.channel
                .send_message(&*self.http, CreateMessage::new().content(content)),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Failed to mirror log event: {}", e),
            Err(_) => warn!("Timeout mirroring log event"),
        }
    }
}

/// `tellraw` command showing a Discord message to every player.
pub fn tellraw_command(author: &str, content: &str) -> String {
    let text = format!("[Discord] {}: {}", author, content);
    format!(
        "tellraw @a {}",
        json!(["", { "text": text, "color": "white" }])
    )
}

/// Forwards messages from the chat channel into the game.
#[derive(Debug, Clone)]
pub struct DiscordBridge {
    rcon: RconClient,
    channel: ChannelId,
}

impl DiscordBridge {
    pub fn new(rcon: RconClient, channel: ChannelId) -> Self {
        Self { rcon, channel }
    }

    fn should_forward(&self, message: &Message) -> bool {
        message.channel_id == self.channel
            && !message.author.bot
            && !message.content.trim().is_empty()
    }
}

#[async_trait]
impl EventHandler for DiscordBridge {
    fn name(&self) -> &str {
        "DiscordBridge"
    }

    async fn handle(
        &self,
        ctx: &Context,
        event: &FullEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let FullEvent::Message { new_message } = event else {
            return Ok(());
        };
        if !self.should_forward(new_message) {
            return Ok(());
        }

        let cmd = tellraw_command(&new_message.author.name, &new_message.content);
        if let Err(e) = self.rcon.command(&cmd).await {
            warn!("Could not forward message to the server: {}", e);
            new_message
                .channel_id
                .say(&ctx.http, format!("⚠️ Minecraft error: `{}`", e))
                .await?;
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn EventHandler> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tellraw_escapes_quotes_and_backslashes() {
        let cmd = tellraw_command("Bob", r#"say "hi" \o/"#);
        assert_eq!(
            cmd,
            r#"tellraw @a ["",{"color":"white","text":"[Discord] Bob: say \"hi\" \\o/"}]"#
        );
    }

    #[test]
    fn discord_formatting_of_events() {
        assert_eq!(
            LogEvent::Chat {
                player: "Steve".into(),
                message: "hi".into()
            }
            .to_discord(),
            "**Steve**: hi"
        );
        assert!(LogEvent::Death("Alex drowned".into())
            .to_discord()
            .contains("Alex drowned"));
    }
}
