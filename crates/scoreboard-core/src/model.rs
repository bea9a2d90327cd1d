// Canonical scoreboard model consumed by the presentation layer.

use serde::{Deserialize, Serialize};

/// Team token used when the source record carries none.
pub const DEFAULT_TEAM: &str = "A";

/// Player name used when the source record carries none.
pub const DEFAULT_NAME: &str = "Unknown";

/// One player row as the presentation layer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPlayer {
    pub name: String,
    pub champion: String,
    /// Side token as reported by the game client (`ORDER` / `CHAOS`), or
    /// [`DEFAULT_TEAM`] when missing.
    pub team: String,
    pub level: Option<i64>,
    pub stats: StatBlock,
    /// Source order, never sorted.
    pub items: Vec<Item>,
}

/// Champion stats. Each field is `None` when absent or non-numeric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatBlock {
    pub max_health: Option<i64>,
    pub attack_damage: Option<i64>,
    pub ability_power: Option<i64>,
    pub armor: Option<i64>,
    pub magic_resist: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub name: String,
    pub raw_display: String,
    pub item_id: i64,
    /// Always >= 1.
    pub count: i64,
}

/// A full snapshot. Rebuilt on every successful acquisition; only the most
/// recent one is retained, and only for change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoreboard {
    pub players: Vec<CanonicalPlayer>,
}

impl Scoreboard {
    pub fn new(players: Vec<CanonicalPlayer>) -> Self {
        Self { players }
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
