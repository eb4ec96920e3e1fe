use config::{Config, PresenceSource};
use databases::Databases;
use modules::{
    chat::{
        relay::{ChatRelay, DiscordBridge},
        task::{LogListener, LogTailTask},
    },
    fun::{coinflip, top_or_bottom},
    info::{help, ip, map, modrinth},
    roles::ReactionRoleHandler,
    server::{backup, backup::BackupRunner, docker, mcd, server, wake, whitelist},
    stats::{stats, top},
    system::events::ReadyHandler,
    watchdog::{
        autosd,
        database::WatchdogConfig,
        executor::SshShutdown,
        notifier::ChannelNotifier,
        presence::{LogPresence, PresenceTracker, RconPresence},
        task::{Watchdog, WatchdogTask},
    },
};
use poise::serenity_prelude::{self as serenity, ChannelId, CreateAllowedMentions, GuildId};
use remote::{RconClient, SshClient};
use std::sync::Arc;
use std::time::Duration;
use tasks::TaskManager;
use tracing::{error, info, trace, warn};
use tracing_subscriber::EnvFilter;

mod checks;
mod config;
mod database;
mod databases;
mod events;
mod modules;
mod remote;
mod tasks;
mod utils;

use crate::events::EventManager;

#[derive(Clone)]
pub struct Data {
    pub config: Arc<Config>,
    pub dbs: Arc<Databases>,
    pub rcon: RconClient,
    pub ssh: SshClient,
    pub backup: BackupRunner,
    pub watchdog: Arc<Watchdog>,
    pub task_manager: Arc<TaskManager>,
    pub event_manager: Arc<EventManager>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data").finish_non_exhaustive()
    }
}

impl Data {
    /// Wires the watchdog and the log tail into the task manager and starts
    /// every task.
    pub async fn init_tasks(&self, ctx: &serenity::Context, log_presence: Option<Arc<LogPresence>>) {
        self.task_manager
            .add_task(WatchdogTask::new(self.watchdog.clone()))
            .await;

        let mut log_task = LogTailTask::new(self.ssh.clone(), self.config.log_path.clone());
        let mut listeners = 0;

        if let Some(presence) = log_presence {
            log_task = log_task.with_listener(presence as Arc<dyn LogListener>);
            listeners += 1;
        }
        if let Some(channel_id) = self.config.chat_channel_id {
            let relay = ChatRelay::new(ctx.http.clone(), ChannelId::new(channel_id));
            log_task = log_task.with_listener(Arc::new(relay));
            listeners += 1;
        }
        if listeners > 0 {
            self.task_manager.add_task(log_task).await;
        }

        self.task_manager.start_tasks(ctx.clone()).await;
    }

    pub async fn init_handlers(&self) {
        let config = &self.config;
        self.event_manager
            .add_handler(ReadyHandler::new(&config.server_address))
            .await;

        if let Some(channel_id) = config.chat_channel_id {
            self.event_manager
                .add_handler(DiscordBridge::new(self.rcon.clone(), ChannelId::new(channel_id)))
                .await;
        }
        if let Some(role_react) = &config.role_react {
            self.event_manager
                .add_handler(ReactionRoleHandler::new(role_react.clone()))
                .await;
        }
    }
}

const POLL_TIMEOUT: Duration = Duration::from_secs(5);

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}

async fn build_data(
    ctx: &serenity::Context,
    config: Arc<Config>,
) -> Result<(Data, Option<Arc<LogPresence>>), Error> {
    let dbs = Arc::new(Databases::default().await?);
    let rcon = RconClient::new(config.rcon_address(), config.rcon_password.clone());
    let ssh = SshClient::new(config.ssh_user.clone(), config.server_ip.clone());
    let backup = BackupRunner::new(
        ssh.clone(),
        config.backup_script.clone(),
        config.docker_containers.clone(),
    );

    let poll_rcon = rcon.clone().with_timeout(POLL_TIMEOUT);
    let log_presence = match config.presence_source {
        PresenceSource::Log => Some(Arc::new(LogPresence::new(poll_rcon.clone()))),
        PresenceSource::Rcon => None,
    };
    let presence: Arc<dyn PresenceTracker> = match &log_presence {
        Some(presence) => presence.clone(),
        None => Arc::new(RconPresence::new(poll_rcon)),
    };

    let mut executor = SshShutdown::new(ssh.clone(), config.shutdown_timeout);
    if config.shutdown_with_backup {
        executor = executor.with_backup(backup.clone());
    }

    let notifier = ChannelNotifier::new(
        ctx.http.clone(),
        GuildId::new(config.guild_id),
        config.channel_name.clone(),
    );

    let defaults = WatchdogConfig {
        enabled: true,
        idle_timeout_secs: config.empty_timeout_secs,
        poll_interval_secs: config.check_interval_secs,
    };
    let watchdog_config = match dbs.watchdog.get_config().await {
        Some(saved) => {
            info!("Using saved watchdog settings: {:?}", saved);
            saved
        }
        None => defaults,
    };

    let watchdog = Watchdog::new(
        watchdog_config,
        presence,
        Arc::new(executor),
        Arc::new(notifier),
        config.shutdown_timeout,
    )
    .with_store(dbs.watchdog.clone());

    let data = Data {
        config,
        dbs,
        rcon,
        ssh,
        backup,
        watchdog: Arc::new(watchdog),
        task_manager: Arc::new(TaskManager::new()),
        event_manager: Arc::new(EventManager::new()),
    };
    Ok((data, log_presence))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("starting copper golem");

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let token = config.discord_token.clone();
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions::<Data, Error> {
            allowed_mentions: Some(CreateAllowedMentions::new().empty_roles().empty_users()),
            commands: vec![
                register(),
                autosd(),
                wake(),
                server(),
                docker(),
                backup(),
                mcd(),
                whitelist(),
                stats(),
                top(),
                ip(),
                map(),
                modrinth(),
                help(),
                coinflip(),
                top_or_bottom(),
            ],
            pre_command: |ctx| {
                Box::pin(async move {
                    trace!(
                        "Command {} used by {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command {} completed for {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!(
                                "Command {} failed for {} in {}: {:?}",
                                ctx.command().qualified_name,
                                ctx.author().tag(),
                                ctx.guild_id()
                                    .map_or_else(|| "DM".to_string(), |id| id.to_string()),
                                error
                            );
                            if let Err(e) = ctx.say(format!("❌ Error: {}", error)).await {
                                warn!("Could not report command error: {}", e);
                            }
                        }
                        err => error!("Other framework error: {:?}", err),
                    }
                })
            },
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    data.event_manager.handle_event(ctx, event).await;
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                let guild_id = GuildId::new(config.guild_id);
                info!("registering commands in guild {}", guild_id);
                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                    .await?;

                let (data, log_presence) = build_data(ctx, config).await?;
                data.init_handlers().await;
                data.init_tasks(ctx, log_presence).await;

                let task_manager = data.task_manager.clone();
                let shard_manager = framework.shard_manager().clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("shutting down");
                        task_manager.shutdown().await;
                        shard_manager.shutdown_all().await;
                    }
                });

                Ok(data)
            })
        })
        .build();

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await;

    match client {
        Ok(mut client) => {
            if let Err(e) = client.start().await {
                error!("Client error: {}", e);
            }
        }
        Err(e) => error!("Failed to create client: {}", e),
    }
}
