//! Command checks. Each check answers the invoking user itself when it
//! refuses, so commands only run when the check passes.

use crate::{Context, Error};
use poise::CreateReply;

async fn refuse(ctx: Context<'_>, message: String) -> Result<bool, Error> {
    ctx.send(CreateReply::default().content(message).ephemeral(true))
        .await?;
    Ok(false)
}

/// Whether the author holds a role called `role_name` in this guild.
pub async fn author_has_role(ctx: Context<'_>, role_name: &str) -> bool {
    let Some(member) = ctx.author_member().await else {
        return false;
    };

    let Some(guild) = ctx.guild() else {
        return false;
    };

    member
        .roles
        .iter()
        .filter_map(|id| guild.roles.get(id))
        .any(|role| role.name == role_name)
}

async fn require_role(ctx: Context<'_>, role_name: &str) -> Result<bool, Error> {
    if author_has_role(ctx, role_name).await {
        Ok(true)
    } else {
        refuse(ctx, format!("🔐 You need the **{}** role for this.", role_name)).await
    }
}

/// Restricts a command to the configured server channel.
pub async fn server_channel(ctx: Context<'_>) -> Result<bool, Error> {
    let expected = &ctx.data().config.channel_name;
    let in_channel = ctx
        .guild_channel()
        .await
        .is_some_and(|channel| &channel.name == expected);

    if in_channel {
        Ok(true)
    } else {
        refuse(ctx, format!("❌ This command can only be used in **#{}**.", expected)).await
    }
}

pub async fn server_control(ctx: Context<'_>) -> Result<bool, Error> {
    let role = ctx.data().config.role_server_control.clone();
    require_role(ctx, &role).await
}

pub async fn player(ctx: Context<'_>) -> Result<bool, Error> {
    let role = ctx.data().config.role_player.clone();
    require_role(ctx, &role).await
}
