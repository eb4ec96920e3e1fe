use regex::Regex;
use std::sync::LazyLock;

static CHAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[.*\]: <([^>]+)> (.*)$").unwrap());
static JOIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r": ([A-Za-z0-9_]+) joined the game").unwrap());
static LEAVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r": ([A-Za-z0-9_]+) left the game").unwrap());
static ADVANCEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r": ([A-Za-z0-9_]+ has (?:made the advancement|completed the challenge|reached the goal) \[.+\])")
        .unwrap()
});
static DEATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"INFO\]: ([A-Za-z0-9_]+ (?:",
        r"was slain by|was shot by|was killed|was blown up|was burned to a crisp|",
        r"was squashed|was pricked|was impaled|was fireballed|was stung|",
        r"fell from|fell off|fell out of the world|hit the ground too hard|",
        r"tried to swim in lava|burned to death|went up in flames|walked into fire|",
        r"drowned|suffocated|starved to death|froze to death|blew up|",
        r"experienced kinetic energy|withered away|died).*)$"
    ))
    .unwrap()
});

/// A server log line the bot cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Chat { player: String, message: String },
    Join(String),
    Leave(String),
    Death(String),
    Advancement(String),
}

impl LogEvent {
    /// How the event is shown in the Discord chat channel.
    pub fn to_discord(&self) -> String {
        match self {
            Self::Chat { player, message } => format!("**{}**: {}", player, message),
            Self::Join(player) => format!("🟩 **Join:** `{}` joined the server.", player),
            Self::Leave(player) => format!("🟥 **Leave:** `{}` left the server.", player),
            Self::Death(text) => format!("☠️ **Death:** {}", text),
            Self::Advancement(text) => format!("🏅 **Advancement:** {}", text),
        }
    }
}

pub fn parse_line(line: &str) -> Option<LogEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(caps) = CHAT.captures(line) {
        return Some(LogEvent::Chat {
            player: caps[1].to_string(),
            message: caps[2].to_string(),
        });
    }
    if let Some(caps) = JOIN.captures(line) {
        return Some(LogEvent::Join(caps[1].to_string()));
    }
    if let Some(caps) = LEAVE.captures(line) {
        return Some(LogEvent::Leave(caps[1].to_string()));
    }
    if let Some(caps) = ADVANCEMENT.captures(line) {
        return Some(LogEvent::Advancement(caps[1].to_string()));
    }
    DEATH
        .captures(line)
        .map(|caps| LogEvent::Death(caps[1].to_string()))
}
