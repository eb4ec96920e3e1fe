use crate::modules::chat::log::LogEvent;
use crate::modules::chat::task::LogListener;
use crate::remote::RconClient;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a poll produced no observation. Neither variant means "zero players".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("could not read player list: {0}")]
    ParseFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub count: usize,
    pub players: Vec<String>,
    pub observed_at: Instant,
}

impl PlayerSnapshot {
    pub fn new(players: Vec<String>, observed_at: Instant) -> Self {
        Self {
            count: players.len(),
            players,
            observed_at,
        }
    }
}

#[async_trait]
pub trait PresenceTracker: Send + Sync {
    fn name(&self) -> &str;
    async fn poll(&self) -> Result<PlayerSnapshot, PollError>;
}

static LIST_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"There are (\d+)(?: of a max of |/)\d+ players online:?(.*)").unwrap()
});

/// Parses the reply to `list`, e.g.
/// `There are 2 of a max of 20 players online: Steve, Alex`.
pub fn parse_player_list(reply: &str) -> Result<(usize, Vec<String>), PollError> {
    // Some servers prefix replies with colour codes.
    let cleaned: String = strip_formatting(reply);

    let caps = LIST_REPLY
        .captures(&cleaned)
        .ok_or_else(|| PollError::ParseFailure(reply.trim().to_string()))?;

    let count = caps[1]
        .parse::<usize>()
        .map_err(|_| PollError::ParseFailure(reply.trim().to_string()))?;

    let players = caps
        .get(2)
        .map(|m| {
            m.as_str()
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok((count, players))
}

fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

/// Polls `list` over RCON on every call.
#[derive(Debug, Clone)]
pub struct RconPresence {
    rcon: RconClient,
}

impl RconPresence {
    pub fn new(rcon: RconClient) -> Self {
        Self { rcon }
    }
}

pub async fn query_roster(rcon: &RconClient) -> Result<(usize, Vec<String>), PollError> {
    let reply = rcon
        .command("list")
        .await
        .map_err(|e| PollError::Unreachable(e.to_string()))?;
    parse_player_list(&reply)
}

#[async_trait]
impl PresenceTracker for RconPresence {
    fn name(&self) -> &str {
        "rcon"
    }

    async fn poll(&self) -> Result<PlayerSnapshot, PollError> {
        let (count, players) = query_roster(&self.rcon).await?;
        Ok(PlayerSnapshot {
            count,
            players,
            observed_at: Instant::now(),
        })
    }
}

#[derive(Debug, Default)]
struct Roster {
    players: BTreeSet<String>,
    live: bool,
}

/// Tracks the roster from join/leave lines of the server log. The roster is
/// seeded from `list` whenever the log stream (re)connects so players who
/// were already online are not missed.
#[derive(Debug)]
pub struct LogPresence {
    rcon: RconClient,
    roster: Mutex<Roster>,
}

impl LogPresence {
    pub fn new(rcon: RconClient) -> Self {
        Self {
            rcon,
            roster: Mutex::new(Roster::default()),
        }
    }

    pub async fn seed(&self, players: impl IntoIterator<Item = String>) {
        let mut roster = self.roster.lock().await;
        roster.players = players.into_iter().collect();
        roster.live = true;
        info!("Seeded roster with {} player(s)", roster.players.len());
    }

    pub async fn apply(&self, event: &LogEvent) {
        let mut roster = self.roster.lock().await;
        match event {
            LogEvent::Join(player) => {
                if roster.players.insert(player.clone()) {
                    debug!("Player joined: {}", player);
                }
            }
            LogEvent::Leave(player) => {
                if roster.players.remove(player) {
                    debug!("Player left: {}", player);
                }
            }
            _ => {}
        }
    }

    pub async fn mark_disconnected(&self) {
        self.roster.lock().await.live = false;
    }
}

#[async_trait]
impl PresenceTracker for LogPresence {
    fn name(&self) -> &str {
        "log"
    }

    async fn poll(&self) -> Result<PlayerSnapshot, PollError> {
        let roster = self.roster.lock().await;
        if !roster.live {
            return Err(PollError::Unreachable("log stream not connected".into()));
        }
        Ok(PlayerSnapshot::new(
            roster.players.iter().cloned().collect(),
            Instant::now(),
        ))
    }
}

#[async_trait]
impl LogListener for LogPresence {
    fn name(&self) -> &str {
        "LogPresence"
    }

    async fn connected(&self) {
        match query_roster(&self.rcon).await {
            Ok((_, players)) => self.seed(players).await,
            Err(e) => {
                warn!("Could not seed roster, waiting for next reconnect: {}", e);
                self.mark_disconnected().await;
            }
        }
    }

    async fn on_event(&self, event: &LogEvent) {
        self.apply(event).await;
    }

    async fn disconnected(&self) {
        self.mark_disconnected().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_list_reply() {
        let (count, players) =
            parse_player_list("There are 2 of a max of 20 players online: Steve, Alex").unwrap();
        assert_eq!(count, 2);
        assert_eq!(players, vec!["Steve", "Alex"]);
    }

    #[test]
    fn parses_empty_and_legacy_replies() {
        assert_eq!(
            parse_player_list("There are 0 of a max of 20 players online: ").unwrap(),
            (0, vec![])
        );
        assert_eq!(
            parse_player_list("There are 1/10 players online:\nNotch").unwrap().0,
            1
        );
        assert_eq!(
            parse_player_list("§6There are §c0§6 of a max of §c20§6 players online:").unwrap(),
            (0, vec![])
        );
    }

    #[test]
    fn garbage_is_a_parse_failure_not_zero() {
        assert!(matches!(
            parse_player_list("Unknown command"),
            Err(PollError::ParseFailure(_))
        ));
        assert!(matches!(parse_player_list(""), Err(PollError::ParseFailure(_))));
    }

    #[tokio::test]
    async fn log_presence_is_unreachable_until_seeded() {
        let presence = LogPresence::new(RconClient::new("127.0.0.1:1", ""));
        assert!(matches!(
            presence.poll().await,
            Err(PollError::Unreachable(_))
        ));

        presence.seed(vec!["Steve".to_string()]).await;
        assert_eq!(presence.poll().await.unwrap().count, 1);

        presence.mark_disconnected().await;
        assert!(presence.poll().await.is_err());
    }

    #[tokio::test]
    async fn log_presence_applies_join_and_leave_idempotently() {
        let presence = LogPresence::new(RconClient::new("127.0.0.1:1", ""));
        presence.seed(vec!["Steve".to_string()]).await;

        presence.apply(&LogEvent::Join("Alex".into())).await;
        presence.apply(&LogEvent::Join("Alex".into())).await;
        assert_eq!(presence.poll().await.unwrap().players, vec!["Alex", "Steve"]);

        presence.apply(&LogEvent::Leave("Steve".into())).await;
        presence.apply(&LogEvent::Leave("Steve".into())).await;
        presence.apply(&LogEvent::Leave("Alex".into())).await;
        let snapshot = presence.poll().await.unwrap();
        assert_eq!(snapshot.count, 0);
        assert!(snapshot.players.is_empty());
    }
}
