use crate::config::RoleReactConfig;
use crate::events::EventHandler;
use async_trait::async_trait;
use poise::serenity_prelude::{Context, FullEvent, Reaction, RoleId};
use tracing::{debug, info};

const AUDIT_REASON: &str = "Reaction role";

/// Grants a role to whoever reacts with the configured emoji on the
/// configured message, and takes it away when the reaction is removed.
#[derive(Debug, Clone)]
pub struct ReactionRoleHandler {
    config: RoleReactConfig,
}

impl ReactionRoleHandler {
    pub fn new(config: RoleReactConfig) -> Self {
        Self { config }
    }

    fn targets(&self, reaction: &Reaction) -> bool {
        reaction.message_id.get() == self.config.message_id
    }

    fn emoji_matches(&self, reaction: &Reaction) -> bool {
        reaction.emoji.to_string() == self.config.emoji
    }

    fn is_bot(&self, ctx: &Context, reaction: &Reaction) -> bool {
        let from_bot_member = reaction.member.as_ref().is_some_and(|m| m.user.bot);
        from_bot_member || reaction.user_id == Some(ctx.cache.current_user().id)
    }

    async fn on_add(&self, ctx: &Context, reaction: &Reaction) -> Result<(), crate::Error> {
        if !self.targets(reaction) || self.is_bot(ctx, reaction) {
            return Ok(());
        }

        if !self.emoji_matches(reaction) {
            debug!("Removing foreign reaction {} from role message", reaction.emoji);
            reaction.delete(&ctx.http).await?;
            return Ok(());
        }

        let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
            return Ok(());
        };
        ctx.http
            .add_member_role(guild_id, user_id, RoleId::new(self.config.role_id), Some(AUDIT_REASON))
            .await?;
        info!("Granted role {} to {}", self.config.role_id, user_id);
        Ok(())
    }

    async fn on_remove(&self, ctx: &Context, reaction: &Reaction) -> Result<(), crate::Error> {
        if !self.targets(reaction) || !self.emoji_matches(reaction) || self.is_bot(ctx, reaction) {
            return Ok(());
        }

        let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
            return Ok(());
        };
        ctx.http
            .remove_member_role(guild_id, user_id, RoleId::new(self.config.role_id), Some(AUDIT_REASON))
            .await?;
        info!("Removed role {} from {}", self.config.role_id, user_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ReactionRoleHandler {
    fn name(&self) -> &str {
        "ReactionRole"
    }

    async fn handle(
        &self,
        ctx: &Context,
        event: &FullEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match event {
            FullEvent::ReactionAdd { add_reaction } => self.on_add(ctx, add_reaction).await,
            FullEvent::ReactionRemove { removed_reaction } => {
                self.on_remove(ctx, removed_reaction).await
            }
            _ => Ok(()),
        }
    }

    fn box_clone(&self) -> Box<dyn EventHandler> {
        Box::new(self.clone())
    }
}
