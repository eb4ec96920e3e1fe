use std::{env, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSource {
    Rcon,
    Log,
}

impl FromStr for PresenceSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rcon" => Ok(Self::Rcon),
            "log" => Ok(Self::Log),
            _ => Err(()),
        }
    }
}

/// Everything the bot reads from the environment, loaded once at startup and
/// handed to the rest of the bot through `Data`.
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub guild_id: u64,
    /// Name of the channel for server-control commands and watchdog notices.
    pub channel_name: String,
    pub chat_channel_id: Option<u64>,

    pub rcon_host: String,
    pub rcon_port: u16,
    pub rcon_password: String,

    pub server_ip: String,
    pub ssh_user: String,
    pub mc_port: u16,
    pub wake_mac: Option<String>,
    pub wake_broadcast: String,

    pub empty_timeout_secs: u64,
    pub check_interval_secs: u64,
    pub shutdown_timeout: Duration,
    pub presence_source: PresenceSource,
    pub shutdown_with_backup: bool,

    pub log_path: String,
    pub backup_script: String,
    pub stats_path: String,
    pub usercache_path: String,
    pub docker_containers: Vec<String>,

    pub role_server_control: String,
    pub role_player: String,
    pub role_whitelist_remove: String,

    pub server_address: String,
    pub map_url: String,
    pub modpack_url: String,

    pub role_react: Option<RoleReactConfig>,
}

#[derive(Debug, Clone)]
pub struct RoleReactConfig {
    pub message_id: u64,
    pub emoji: String,
    pub role_id: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_ip = var_or("SERVER_IP", "127.0.0.1");

        let role_react = match optional::<u64>("ROLE_REACT_MESSAGE_ID")? {
            Some(message_id) => Some(RoleReactConfig {
                message_id,
                emoji: var_or("ROLE_REACT_EMOJI", "⛏️"),
                role_id: required::<u64>("ROLE_REACT_ROLE_ID")?,
            }),
            None => None,
        };

        Ok(Self {
            discord_token: required::<String>("DISCORD_TOKEN")?,
            guild_id: required::<u64>("GUILD_ID")?,
            channel_name: var_or("CHANNEL_NAME", "general"),
            chat_channel_id: optional::<u64>("CHAT_CHANNEL_ID")?,

            rcon_host: var_or("RCON_HOST", &server_ip),
            rcon_port: parsed_or("RCON_PORT", 25575)?,
            rcon_password: var_or("RCON_PASSWORD", ""),

            ssh_user: var_or("MC_SERVER_USER", "minecraft"),
            mc_port: parsed_or("MC_PORT", 25565)?,
            wake_mac: optional::<String>("WAKE_MAC")?,
            wake_broadcast: var_or("WAKE_BROADCAST", "255.255.255.255:9"),

            empty_timeout_secs: parsed_or("EMPTY_TIMEOUT", 1800)?,
            check_interval_secs: parsed_or("CHECK_INTERVAL", 10)?,
            shutdown_timeout: Duration::from_secs(parsed_or("SHUTDOWN_TIMEOUT", 30)?),
            presence_source: parsed_or("PRESENCE_SOURCE", PresenceSource::Rcon)?,
            shutdown_with_backup: parsed_or("SHUTDOWN_WITH_BACKUP", false)?,

            log_path: var_or(
                "LOG_PATH",
                "/home/Minecraft/minecraft1/data/logs/latest.log",
            ),
            backup_script: var_or(
                "BACKUP_SCRIPT",
                "/home/Minecraft/minecraft1/backups/backup.sh",
            ),
            stats_path: var_or("MC_STATS_PATH", "/home/Minecraft/minecraft1/data/world/stats/"),
            usercache_path: var_or(
                "MC_USERCACHE_PATH",
                "/home/Minecraft/minecraft1/data/usercache.json",
            ),
            docker_containers: split_list(&var_or("DOCKER_CONTAINERS", "minecraft1")),

            role_server_control: var_or("ROLE_SERVER_CONTROL", "ServerAdmin"),
            role_player: var_or("ROLE_PLAYER", "mcPlayer"),
            role_whitelist_remove: var_or("ROLE_WHITELIST_REMOVE", "mcAdmin"),

            server_address: var_or("SERVER_ADDRESS", &server_ip),
            map_url: var_or("MAP_URL", ""),
            modpack_url: var_or("MODPACK_URL", "https://modrinth.com"),

            role_react,
            server_ip,
        })
    }

    pub fn rcon_address(&self) -> String {
        format!("{}:{}", self.rcon_host, self.rcon_port)
    }

    pub fn game_address(&self) -> String {
        format!("{}:{}", self.server_ip, self.mc_port)
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(None),
    }
}

fn required<T: FromStr>(key: &'static str) -> Result<T, ConfigError> {
    optional(key)?.ok_or(ConfigError::Missing(key))
}

fn parsed_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(optional(key)?.unwrap_or(default))
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
