use super::backup::{BackupError, BackupKind};
use crate::checks::author_has_role;
use crate::remote::{power, ssh::shell_quote, RconClient, RconError};
use crate::utils::truncate;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::{command, ChoiceParameter, CreateReply};
use std::time::Duration;
use tracing::error;

const SSH_LIMIT: Duration = Duration::from_secs(60);
const MCD_LIMIT: Duration = Duration::from_secs(20);
const MAX_OUTPUT: usize = 1900;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ServerAction {
    Shutdown,
    Restart,
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum DockerAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum WhitelistAction {
    Add,
    Remove,
}

fn code_block(output: &str) -> String {
    let output = if output.trim().is_empty() {
        "(no output)"
    } else {
        output.trim()
    };
    format!("```\n{}\n```", truncate(output, MAX_OUTPUT))
}

/// Power the Minecraft host on
#[command(slash_command, guild_only)]
pub async fn wake(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let config = &ctx.data().config;

    if power::is_reachable(&config.game_address(), Duration::from_secs(3)).await {
        ctx.say("🟢 The server is already running!").await?;
        return Ok(());
    }

    let Some(mac) = config.wake_mac.as_deref() else {
        ctx.say("⚠️ Wake-on-LAN is not configured (`WAKE_MAC`).").await?;
        return Ok(());
    };

    match power::wake_on_lan(mac, &config.wake_broadcast).await {
        Ok(()) => ctx.say("⚡ Wake signal sent, the server is starting.").await?,
        Err(e) => {
            error!("Wake-on-LAN failed: {}", e);
            ctx.say(format!("❌ Could not send wake signal: {}", e)).await?
        }
    };
    Ok(())
}

/// Shut down or restart the Minecraft host
#[command(
    slash_command,
    guild_only,
    check = "crate::checks::server_control"
)]
pub async fn server(
    ctx: Context<'_>,
    #[description = "What should happen?"] action: ServerAction,
) -> Result<(), Error> {
    ctx.defer().await?;

    let remote = match action {
        ServerAction::Shutdown => {
            ctx.say("🔻 Shutting the server down…").await?;
            "sudo shutdown -h now"
        }
        ServerAction::Restart => {
            ctx.say("🔄 Restarting the server…").await?;
            "sudo reboot"
        }
    };

    let result = match ctx.data().ssh.run(remote, SSH_LIMIT).await {
        Ok(output) => output.combined(),
        Err(e) => format!("Command failed: {} ❌", e),
    };

    ctx.say(format!("**Result:**\n{}", code_block(&result))).await?;
    Ok(())
}

async fn autocomplete_container<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> {
    let partial = partial.to_lowercase();
    ctx.data()
        .config
        .docker_containers
        .iter()
        .filter(|name| name.to_lowercase().contains(&partial))
        .map(|name| serenity::AutocompleteChoice::new(name.clone(), name.clone()))
        .collect::<Vec<_>>()
        .into_iter()
}

/// Start or stop a Docker container on the host
#[command(
    slash_command,
    guild_only,
    check = "crate::checks::server_control"
)]
pub async fn docker(
    ctx: Context<'_>,
    #[description = "What should happen?"] action: DockerAction,
    #[description = "Which container?"]
    #[autocomplete = "autocomplete_container"]
    container: String,
) -> Result<(), Error> {
    if !ctx.data().config.docker_containers.contains(&container) {
        ctx.send(
            CreateReply::default()
                .content(format!("❌ Unknown container `{}`.", container))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    ctx.defer().await?;

    let remote = match action {
        DockerAction::Start => {
            ctx.say(format!("⬆️ Starting container **{}**…", container)).await?;
            format!("docker start {}", shell_quote(&container))
        }
        DockerAction::Stop => {
            ctx.say(format!("⏹️ Stopping container **{}**…", container)).await?;
            format!("docker stop {}", shell_quote(&container))
        }
    };

    let result = match ctx.data().ssh.run(&remote, SSH_LIMIT).await {
        Ok(output) => output.combined(),
        Err(e) => format!("Command failed: {} ❌", e),
    };

    ctx.say(format!("**Result:**\n{}", code_block(&result))).await?;
    Ok(())
}

/// Run a Minecraft backup, then the chosen follow-up action
#[command(slash_command, guild_only)]
pub async fn backup(
    ctx: Context<'_>,
    #[description = "Which kind of backup?"] kind: BackupKind,
) -> Result<(), Error> {
    let config = &ctx.data().config;
    let required = if kind.is_privileged() {
        &config.role_server_control
    } else {
        &config.role_player
    };

    if !author_has_role(ctx, required).await {
        ctx.send(
            CreateReply::default()
                .content(format!("❌ You need the **{}** role for this backup.", required))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    ctx.defer().await?;
    ctx.say(format!("🔧 Backup started: **{}**\nPlease wait…", kind.name()))
        .await?;

    match ctx.data().backup.run().await {
        Ok(output) => {
            ctx.say(format!(
                "✅ Backup **{}** succeeded\n{}",
                kind.name(),
                code_block(&truncate(&output, 1000))
            ))
            .await?;
            ctx.data().backup.post_action(kind).await;
        }
        Err(BackupError::Busy) => {
            ctx.say("⏳ A backup is already running, please wait.").await?;
        }
        Err(e) => {
            ctx.say(format!(
                "❌ Backup **{}** failed\n{}",
                kind.name(),
                code_block(&truncate(&e.to_string(), 1000))
            ))
            .await?;
        }
    }

    Ok(())
}

/// Run a Minecraft command over RCON
#[command(
    slash_command,
    guild_only,
    ephemeral,
    check = "crate::checks::server_control"
)]
pub async fn mcd(
    ctx: Context<'_>,
    #[description = "The server command to run, e.g. 'say hello'"] cmd: String,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let reply = match mcd_client(&ctx.data().rcon).command(&cmd).await {
        Ok(output) => format!("**RCON output:**\n{}", code_block(&output)),
        Err(RconError::Timeout(_)) => "❌ RCON reply took too long (timeout).".to_string(),
        Err(e) => format!("❌ Failed to run the command: {}", e),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// Admin commands like `save-all` can outlast the default RCON bound.
fn mcd_client(rcon: &RconClient) -> RconClient {
    rcon.clone().with_timeout(MCD_LIMIT)
}

/// Interprets the server's reply to `whitelist add|remove`.
pub fn whitelist_reply(action: WhitelistAction, name: &str, reply: &str) -> String {
    let lower = reply.to_lowercase();

    if lower.contains("already whitelisted") {
        return format!("`{}` is already whitelisted ✅", name);
    }
    if lower.contains("not whitelisted") {
        return format!("`{}` is not on the whitelist ❌", name);
    }
    match action {
        WhitelistAction::Add if lower.contains("added") || lower.contains("whitelisted") => {
            format!("`{}` has been whitelisted! ✨", name)
        }
        WhitelistAction::Remove if lower.contains("removed") => {
            format!("`{}` has been removed from the whitelist 🗿", name)
        }
        _ if reply.trim().is_empty() => "Command executed. ✔️".to_string(),
        _ => reply.trim().to_string(),
    }
}

/// Add or remove a player from the whitelist
#[command(
    slash_command,
    guild_only,
    check = "crate::checks::server_channel"
)]
pub async fn whitelist(
    ctx: Context<'_>,
    #[description = "Add or remove"] action: WhitelistAction,
    #[description = "Minecraft player name"]
    #[max_length = 16]
    name: String,
) -> Result<(), Error> {
    let config = &ctx.data().config;
    let required = match action {
        WhitelistAction::Add => &config.role_player,
        WhitelistAction::Remove => &config.role_whitelist_remove,
    };

    if !author_has_role(ctx, required).await {
        ctx.send(
            CreateReply::default()
                .content(format!("❌ You need the **{}** role for this.", required))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        ctx.send(
            CreateReply::default()
                .content("❌ That is not a valid Minecraft name.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    ctx.defer().await?;

    let verb = match action {
        WhitelistAction::Add => "add",
        WhitelistAction::Remove => "remove",
    };

    let msg = match ctx.data().rcon.command(&format!("whitelist {} {}", verb, name)).await {
        Ok(reply) => whitelist_reply(action, &name, &reply),
        Err(e) => format!("Error: {} ❌", e),
    };

    ctx.say(msg).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcd_outlasts_the_default_rcon_bound() {
        let rcon = RconClient::new("localhost:25575", "pw");
        assert_eq!(mcd_client(&rcon).timeout(), MCD_LIMIT);
        assert!(mcd_client(&rcon).timeout() > rcon.timeout());
    }

    #[test]
    fn whitelist_replies_are_interpreted() {
        assert_eq!(
            whitelist_reply(WhitelistAction::Add, "Steve", "Player is already whitelisted"),
            "`Steve` is already whitelisted ✅"
        );
        assert_eq!(
            whitelist_reply(WhitelistAction::Add, "Steve", "Added Steve to the whitelist"),
            "`Steve` has been whitelisted! ✨"
        );
        assert_eq!(
            whitelist_reply(WhitelistAction::Remove, "Alex", "Player is not whitelisted"),
            "`Alex` is not on the whitelist ❌"
        );
        assert_eq!(
            whitelist_reply(WhitelistAction::Remove, "Alex", "Removed Alex from the whitelist"),
            "`Alex` has been removed from the whitelist 🗿"
        );
        assert_eq!(
            whitelist_reply(WhitelistAction::Add, "x", "That player does not exist"),
            "That player does not exist"
        );
    }

    #[test]
    fn empty_output_is_labelled() {
        assert_eq!(code_block("  "), "```\n(no output)\n```");
    }
}
