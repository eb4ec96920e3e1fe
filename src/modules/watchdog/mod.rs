pub mod commands;
pub mod database;
pub mod executor;
pub mod notifier;
pub mod presence;
pub mod state;
pub mod task;

use commands::*;
use poise::command;

/// 💤 Shut the server down when nobody is playing
#[command(
    slash_command,
    subcommands("enable", "disable", "set", "status", "players"),
    guild_only
)]
pub async fn autosd(_ctx: crate::Context<'_>) -> Result<(), crate::Error> {
    Ok(())
}
