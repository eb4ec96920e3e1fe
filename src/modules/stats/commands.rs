use super::model::{self, StatKind};
use crate::remote::ssh::shell_quote;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::{command, ChoiceParameter, CreateReply};
use std::time::Duration;
use tracing::warn;

const READ_LIMIT: Duration = Duration::from_secs(15);

fn stats_file(dir: &str, uuid: &str) -> String {
    format!("{}/{}.json", dir.trim_end_matches('/'), uuid)
}

/// One round trip that prints `uuid<TAB>json` for every stats file.
fn dump_command(dir: &str) -> String {
    format!(
        "for f in {}/*.json; do [ -f \"$f\" ] || continue; printf '%s\\t' \"$(basename \"$f\" .json)\"; tr -d '\\n' < \"$f\"; echo; done",
        shell_quote(dir.trim_end_matches('/'))
    )
}

async fn load_usercache(ctx: Context<'_>) -> Result<Vec<model::UserCacheEntry>, Error> {
    let path = &ctx.data().config.usercache_path;
    let raw = ctx
        .data()
        .ssh
        .exec(&format!("cat {}", shell_quote(path)), READ_LIMIT)
        .await?;
    Ok(model::parse_usercache(&raw)?)
}

async fn reply_error(ctx: Context<'_>, message: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(message).ephemeral(true))
        .await?;
    Ok(())
}

/// 📊 Show a player's Minecraft statistics
#[command(slash_command, guild_only)]
pub async fn stats(
    ctx: Context<'_>,
    #[description = "Minecraft player name"]
    #[max_length = 16]
    player: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let cache = match load_usercache(ctx).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!("Could not read usercache: {}", e);
            return reply_error(ctx, "❌ The server is not reachable right now.").await;
        }
    };

    let Some(uuid) = model::find_uuid(&cache, &player) else {
        return reply_error(ctx, format!("❌ No player named `{}` has joined yet.", player))
            .await;
    };

    let path = stats_file(&ctx.data().config.stats_path, uuid);
    let raw = match ctx
        .data()
        .ssh
        .exec(&format!("cat {}", shell_quote(&path)), READ_LIMIT)
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Could not read stats for {}: {}", player, e);
            return reply_error(ctx, format!("❌ No statistics for `{}` yet.", player)).await;
        }
    };
    let stats = model::PlayerStats::from_json(&raw)?;

    let mut embed = serenity::CreateEmbed::default()
        .title(format!("📊 Statistics for {}", player))
        .color(0x55AA55);
    for kind in StatKind::ALL {
        embed = embed.field(
            format!("{} {}", kind.emoji(), kind.name()),
            kind.format_value(stats.value(kind)),
            true,
        );
    }

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// 🏆 Leaderboard for one statistic
#[command(slash_command, guild_only)]
pub async fn top(
    ctx: Context<'_>,
    #[description = "Which statistic?"] stat: StatKind,
    #[description = "How many players?"]
    #[min = 1]
    #[max = 25]
    count: Option<u8>,
) -> Result<(), Error> {
    ctx.defer().await?;
    let count = count.unwrap_or(10) as usize;

    let dump = ctx
        .data()
        .ssh
        .exec(&dump_command(&ctx.data().config.stats_path), READ_LIMIT)
        .await;
    let (dump, cache) = match (dump, load_usercache(ctx).await) {
        (Ok(dump), Ok(cache)) => (dump, cache),
        (Err(e), _) => {
            warn!("Could not read stats directory: {}", e);
            return reply_error(ctx, "❌ The server is not reachable right now.").await;
        }
        (_, Err(e)) => {
            warn!("Could not read usercache: {}", e);
            return reply_error(ctx, "❌ The server is not reachable right now.").await;
        }
    };

    let players = model::parse_stats_dump(&dump);
    let board = model::leaderboard(&players, &cache, stat, count);
    if board.is_empty() {
        return reply_error(ctx, "No statistics recorded yet.").await;
    }

    let lines = board
        .iter()
        .enumerate()
        .map(|(i, (name, value))| {
            let medal = match i {
                0 => "🥇".to_string(),
                1 => "🥈".to_string(),
                2 => "🥉".to_string(),
                n => format!("**{}.**", n + 1),
            };
            format!("{} {} · {}", medal, name, stat.format_value(*value))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::default()
        .title(format!("{} Top {} · {}", stat.emoji(), board.len(), stat.name()))
        .description(lines)
        .color(0xFFAA00);

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_path_is_joined() {
        assert_eq!(
            stats_file("/srv/world/stats/", "abc"),
            "/srv/world/stats/abc.json"
        );
    }

    #[test]
    fn dump_command_quotes_directory() {
        let cmd = dump_command("/srv/my world/stats");
        assert!(cmd.starts_with("for f in '/srv/my world/stats'/*.json;"));
        assert!(cmd.contains("basename"));
    }
}
