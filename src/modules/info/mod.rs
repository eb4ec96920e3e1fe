use crate::{Context, Error};
use poise::serenity_prelude::{Colour, CreateEmbed, CreateEmbedFooter};
use poise::{command, CreateReply};

const FOOTER: &str = "Provided by the Copper Golem";

fn link_embed(title: &str, description: String) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .colour(Colour::DARK_GREEN)
        .footer(CreateEmbedFooter::new(FOOTER))
}

/// 🌐 Show the server address
#[command(slash_command)]
pub async fn ip(ctx: Context<'_>) -> Result<(), Error> {
    let address = &ctx.data().config.server_address;
    let embed = link_embed("🌐 Server IP 🌐", format!("**`{}`**", address));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// 🗺️ Open the web map
#[command(slash_command)]
pub async fn map(ctx: Context<'_>) -> Result<(), Error> {
    let url = &ctx.data().config.map_url;
    let embed = link_embed("🌍 Minecraft Map 🌍", format!("[🗺️ Open the map 🗺️]({})", url));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// 📦 Download the modpack
#[command(slash_command)]
pub async fn modrinth(ctx: Context<'_>) -> Result<(), Error> {
    let url = &ctx.data().config.modpack_url;
    let embed = link_embed(
        "📦 Modrinth Modpack 📦",
        format!("[📦 Modpack download 📦]({})", url),
    );
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("Available commands 📜")
        .colour(Colour::BLURPLE)
        .field("🖥️ Server", "`/wake`\n`/backup`\n`/autosd status`\n`/autosd players`", true)
        .field("👤 Whitelist", "`/whitelist add <name>`", true)
        .field("📊 Stats", "`/stats <player>`\n`/top <stat>`", true)
        .field("🔗 Links", "`/ip`\n`/modrinth`\n`/map`", false)
        .field("🎲 Fun", "`/coinflip`\n`/top_or_bottom`", false)
        .footer(CreateEmbedFooter::new(FOOTER))
}

/// 📜 List the available commands
#[command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.send(CreateReply::default().embed(help_embed())).await?;
    Ok(())
}
