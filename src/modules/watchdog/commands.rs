use super::state::WatchdogState;
use crate::utils::format_hms;
use crate::{Context, Error};
use poise::{command, CreateReply};
use std::time::Duration;

/// Turn the empty-server auto-shutdown on
#[command(
    slash_command,
    guild_only,
    check = "crate::checks::server_channel",
    check = "crate::checks::server_control"
)]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().watchdog.enable().await;
    ctx.send(CreateReply::default().content("✅ Done.").ephemeral(true))
        .await?;
    Ok(())
}

/// Turn the empty-server auto-shutdown off and drop any running timer
#[command(
    slash_command,
    guild_only,
    check = "crate::checks::server_channel",
    check = "crate::checks::server_control"
)]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().watchdog.disable().await;
    ctx.send(CreateReply::default().content("✅ Done.").ephemeral(true))
        .await?;
    Ok(())
}

/// Set how long the server may stay empty before it is shut down
#[command(
    slash_command,
    guild_only,
    check = "crate::checks::server_channel",
    check = "crate::checks::server_control"
)]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Idle time in seconds"]
    #[min = 1]
    seconds: u64,
) -> Result<(), Error> {
    ctx.data().watchdog.set_idle_timeout(seconds).await;
    ctx.say(format!("⏳ Shutdown timer set to `{}`.", format_hms(seconds)))
        .await?;
    Ok(())
}

/// Unix timestamp of the planned shutdown, for Discord's `<t:..>` markup.
fn shutdown_at(remaining: Duration) -> i64 {
    let remaining = chrono::TimeDelta::from_std(remaining).unwrap_or_default();
    (chrono::Utc::now() + remaining).timestamp()
}

/// Show the auto-shutdown state
#[command(slash_command, guild_only, check = "crate::checks::player")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let status = ctx.data().watchdog.status().await;

    let msg = if !status.config.enabled {
        "🟥 Auto-shutdown is disabled.".to_string()
    } else {
        match (status.state, status.remaining) {
            (WatchdogState::CountingDown { .. }, Some(remaining)) => format!(
                "⌛ Timer running: `{}` until shutdown (<t:{}:t>).",
                format_hms(remaining.as_secs()),
                shutdown_at(remaining)
            ),
            (WatchdogState::ShuttingDown, _) => "⚙️ Shutdown in progress.".to_string(),
            (WatchdogState::PoweringOff, _) => "🔌 Shutdown sent, the server is powering off.".to_string(),
            (WatchdogState::Unreachable, _) => format!(
                "📴 Server not reachable. Timer: `{}`",
                format_hms(status.config.idle_timeout_secs)
            ),
            _ => format!(
                "⏹️ Active, no timer running. Timer: `{}`",
                format_hms(status.config.idle_timeout_secs)
            ),
        }
    };

    ctx.say(msg).await?;
    Ok(())
}

/// Show who is online
#[command(slash_command, guild_only, check = "crate::checks::player")]
pub async fn players(ctx: Context<'_>) -> Result<(), Error> {
    let status = ctx.data().watchdog.status().await;

    let msg = match status.snapshot {
        None => "❔ No player data yet.".to_string(),
        Some(snapshot) if snapshot.count == 0 => "👀 Nobody online.".to_string(),
        Some(snapshot) if snapshot.players.is_empty() => {
            format!("🎮 {} player(s) online.", snapshot.count)
        }
        Some(snapshot) => {
            let mut names = snapshot.players.clone();
            names.sort_unstable_by_key(|name| name.to_lowercase());
            format!(
                "🎮 Online players ({}):\n• {}",
                snapshot.count,
                names.join("\n• ")
            )
        }
    };

    ctx.say(msg).await?;
    Ok(())
}
