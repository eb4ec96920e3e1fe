use serde::Deserialize;
use std::collections::HashMap;

const DISTANCE_KEYS: &[&str] = &[
    "walk_one_cm",
    "walk_under_water_one_cm",
    "walk_on_water_one_cm",
    "swim_one_cm",
    "fly_one_cm",
    "aviate_one_cm",
    "climb_one_cm",
    "crouch_one_cm",
    "sprint_one_cm",
    "fall_one_cm",
    "horse_one_cm",
    "pig_one_cm",
    "boat_one_cm",
    "minecart_one_cm",
    "strider_one_cm",
    "happy_ghast_one_cm",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum StatKind {
    #[name = "Distance Traveled"]
    DistanceTraveled,
    #[name = "Blocks Broken"]
    BlocksBroken,
    #[name = "Blocks Placed"]
    BlocksPlaced,
    #[name = "Damage Done"]
    DamageDone,
    #[name = "Damage Taken"]
    DamageTaken,
    #[name = "Deaths"]
    Deaths,
    #[name = "Player Kills"]
    PlayerKills,
    #[name = "Entity Kills"]
    EntityKills,
    #[name = "Playtime"]
    Playtime,
}

impl StatKind {
    pub const ALL: [StatKind; 9] = [
        Self::DistanceTraveled,
        Self::BlocksBroken,
        Self::BlocksPlaced,
        Self::DamageDone,
        Self::DamageTaken,
        Self::Deaths,
        Self::PlayerKills,
        Self::EntityKills,
        Self::Playtime,
    ];

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::DistanceTraveled => "✈️",
            Self::BlocksBroken => "⛏️",
            Self::BlocksPlaced => "🦺",
            Self::DamageDone => "🗡️",
            Self::DamageTaken => "💔",
            Self::Deaths => "🪦",
            Self::PlayerKills => "⚔️",
            Self::EntityKills => "👾",
            Self::Playtime => "⌛",
        }
    }

    pub fn format_value(&self, value: f64) -> String {
        match self {
            Self::DistanceTraveled => format!("{:.2} km", value),
            Self::Playtime => format!("{:.2} h", value),
            Self::DamageDone | Self::DamageTaken => format!("{:.1}", value),
            _ => group_thousands(value as u64),
        }
    }
}

pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn round_half(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

/// A player's `stats/<uuid>.json` file.
#[derive(Debug, Default, Deserialize)]
pub struct PlayerStats {
    #[serde(default)]
    stats: HashMap<String, HashMap<String, f64>>,
}

impl PlayerStats {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    fn category(&self, name: &str) -> Option<&HashMap<String, f64>> {
        self.stats.get(&format!("minecraft:{}", name))
    }

    fn custom(&self, key: &str) -> f64 {
        self.category("custom")
            .and_then(|c| c.get(&format!("minecraft:{}", key)))
            .copied()
            .unwrap_or(0.0)
    }

    fn total(&self, category: &str) -> f64 {
        self.category(category)
            .map(|c| c.values().sum())
            .unwrap_or(0.0)
    }

    pub fn value(&self, kind: StatKind) -> f64 {
        match kind {
            StatKind::DistanceTraveled => {
                let cm: f64 = DISTANCE_KEYS.iter().map(|k| self.custom(k)).sum();
                (cm / 100_000.0 * 100.0).round() / 100.0
            }
            StatKind::BlocksBroken => self.total("mined"),
            StatKind::BlocksPlaced => self.total("used"),
            StatKind::DamageDone => round_half(self.custom("damage_dealt") / 20.0),
            StatKind::DamageTaken => round_half(self.custom("damage_taken") / 20.0),
            StatKind::Deaths => self.custom("deaths"),
            StatKind::PlayerKills => self.custom("player_kills"),
            StatKind::EntityKills => self
                .category("killed")
                .map(|killed| {
                    killed
                        .iter()
                        .filter(|(entity, _)| entity.as_str() != "minecraft:player")
                        .map(|(_, n)| n)
                        .sum()
                })
                .unwrap_or(0.0),
            StatKind::Playtime => {
                let hours = self.custom("play_time") / 20.0 / 3600.0;
                (hours * 100.0).round() / 100.0
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserCacheEntry {
    pub name: String,
    pub uuid: String,
}

pub fn parse_usercache(raw: &str) -> Result<Vec<UserCacheEntry>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn find_uuid<'a>(cache: &'a [UserCacheEntry], player: &str) -> Option<&'a str> {
    cache
        .iter()
        .find(|u| u.name.eq_ignore_ascii_case(player))
        .map(|u| u.uuid.as_str())
}

/// Parses the `uuid<TAB>json` lines produced by the bulk stats dump.
pub fn parse_stats_dump(raw: &str) -> Vec<(String, PlayerStats)> {
    raw.lines()
        .filter_map(|line| line.split_once('\t'))
        .filter_map(|(uuid, json)| {
            PlayerStats::from_json(json)
                .ok()
                .filter(|stats| !stats.is_empty())
                .map(|stats| (uuid.trim().to_string(), stats))
        })
        .collect()
}

/// Highest `count` players for `kind`, best first. Names fall back to UUIDs.
pub fn leaderboard(
    players: &[(String, PlayerStats)],
    cache: &[UserCacheEntry],
    kind: StatKind,
    count: usize,
) -> Vec<(String, f64)> {
    let names: HashMap<&str, &str> = cache
        .iter()
        .map(|u| (u.uuid.as_str(), u.name.as_str()))
        .collect();

    let mut board: Vec<(String, f64)> = players
        .iter()
        .map(|(uuid, stats)| {
            let name = names.get(uuid.as_str()).copied().unwrap_or(uuid.as_str());
            (name.to_string(), stats.value(kind))
        })
        .collect();

    board.sort_by(|a, b| b.1.total_cmp(&a.1));
    board.truncate(count);
    board
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEVE: &str = r#"{
        "stats": {
            "minecraft:custom": {
                "minecraft:walk_one_cm": 150000,
                "minecraft:sprint_one_cm": 50000,
                "minecraft:damage_dealt": 215,
                "minecraft:damage_taken": 40,
                "minecraft:deaths": 3,
                "minecraft:player_kills": 1,
                "minecraft:play_time": 144000
            },
            "minecraft:mined": { "minecraft:stone": 1000, "minecraft:dirt": 234 },
            "minecraft:used": { "minecraft:torch": 12 },
            "minecraft:killed": { "minecraft:zombie": 7, "minecraft:player": 1 }
        },
        "DataVersion": 3953
    }"#;

    #[test]
    fn computes_every_stat() {
        let stats = PlayerStats::from_json(STEVE).unwrap();
        assert_eq!(stats.value(StatKind::DistanceTraveled), 2.0);
        assert_eq!(stats.value(StatKind::BlocksBroken), 1234.0);
        assert_eq!(stats.value(StatKind::BlocksPlaced), 12.0);
        assert_eq!(stats.value(StatKind::DamageDone), 11.0);
        assert_eq!(stats.value(StatKind::DamageTaken), 2.0);
        assert_eq!(stats.value(StatKind::Deaths), 3.0);
        assert_eq!(stats.value(StatKind::PlayerKills), 1.0);
        assert_eq!(stats.value(StatKind::EntityKills), 7.0);
        assert_eq!(stats.value(StatKind::Playtime), 2.0);
    }

    #[test]
    fn missing_categories_are_zero() {
        let stats = PlayerStats::from_json(r#"{"stats": {}}"#).unwrap();
        assert!(stats.is_empty());
        assert_eq!(stats.value(StatKind::EntityKills), 0.0);
        assert_eq!(stats.value(StatKind::DistanceTraveled), 0.0);
    }

    #[test]
    fn formats_values() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1234567), "1,234,567");
        assert_eq!(StatKind::DistanceTraveled.format_value(2.5), "2.50 km");
        assert_eq!(StatKind::BlocksBroken.format_value(1234.0), "1,234");
    }

    #[test]
    fn resolves_names_case_insensitively() {
        let cache = parse_usercache(
            r#"[{"name":"Steve","uuid":"u-1","expiresOn":"2030-01-01 00:00:00 +0000"}]"#,
        )
        .unwrap();
        assert_eq!(find_uuid(&cache, "steve"), Some("u-1"));
        assert_eq!(find_uuid(&cache, "alex"), None);
    }

    #[test]
    fn leaderboard_orders_and_names_players() {
        let dump = format!(
            "u-1\t{}\nu-2\t{}\nbroken line\nu-3\tnot json\n",
            STEVE.replace('\n', ""),
            r#"{"stats":{"minecraft:custom":{"minecraft:deaths":9}}}"#
        );
        let players = parse_stats_dump(&dump);
        assert_eq!(players.len(), 2);

        let cache = vec![UserCacheEntry {
            name: "Steve".into(),
            uuid: "u-1".into(),
        }];
        let board = leaderboard(&players, &cache, StatKind::Deaths, 5);
        assert_eq!(board, vec![("u-2".to_string(), 9.0), ("Steve".to_string(), 3.0)]);

        let top1 = leaderboard(&players, &cache, StatKind::Deaths, 1);
        assert_eq!(top1.len(), 1);
    }
}
