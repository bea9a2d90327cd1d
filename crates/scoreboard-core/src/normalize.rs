// Stat normalization: loose live-client player records into canonical players.
//
// The live client, the overlay host's info updates, and our own serialized
// output all spell the same fields differently. Each canonical field resolves
// through an ordered key chain; the first present, usable value wins.
// Normalization never fails: missing or malformed fields become defaults.

use serde_json::Value;
use thiserror::Error;

use crate::model::{CanonicalPlayer, Item, Scoreboard, StatBlock, DEFAULT_NAME, DEFAULT_TEAM};

// ---------------------------------------------------------------------------
// Key chains
// ---------------------------------------------------------------------------

const NAME_KEYS: &[&str] = &["summonerName", "riotIdGameName", "riotId", "name"];
const CHAMPION_KEYS: &[&str] = &["championName", "rawChampionName", "champion"];
const TEAM_KEYS: &[&str] = &["team"];
const LEVEL_KEYS: &[&str] = &["level"];

/// Objects that may hold champion stats, in lookup order.
const STAT_CONTAINERS: &[&str] = &["championStats", "stats"];

const HEALTH_KEYS: &[&str] = &["maxHealth", "health", "hp", "currentHealth"];
const ATTACK_KEYS: &[&str] = &["attackDamage", "ad", "attack"];
const ABILITY_POWER_KEYS: &[&str] = &["abilityPower", "ap"];
const ARMOR_KEYS: &[&str] = &["armor"];
const MAGIC_RESIST_KEYS: &[&str] = &["magicResist", "mr", "spellBlock"];

const ITEM_NAME_KEYS: &[&str] = &["displayName", "name"];
const ITEM_RAW_KEYS: &[&str] = &["rawDisplayName", "rawDisplay"];
const ITEM_ID_KEYS: &[&str] = &["itemID", "itemId", "id"];
const ITEM_COUNT_KEYS: &[&str] = &["count"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The response body was valid JSON but not a list of player records.
#[derive(Debug, Error, PartialEq)]
#[error("expected a JSON array of players, got {found}")]
pub struct ShapeError {
    pub found: &'static str,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Normalize one raw player record.
pub fn normalize_player(raw: &Value) -> CanonicalPlayer {
    let level = first_number(raw, LEVEL_KEYS).or_else(|| stat(raw, LEVEL_KEYS));

    CanonicalPlayer {
        name: first_string(raw, NAME_KEYS).unwrap_or_else(|| DEFAULT_NAME.to_string()),
        champion: first_string(raw, CHAMPION_KEYS).unwrap_or_default(),
        team: first_string(raw, TEAM_KEYS).unwrap_or_else(|| DEFAULT_TEAM.to_string()),
        level,
        stats: StatBlock {
            max_health: stat(raw, HEALTH_KEYS),
            attack_damage: stat(raw, ATTACK_KEYS),
            ability_power: stat(raw, ABILITY_POWER_KEYS),
            armor: stat(raw, ARMOR_KEYS),
            magic_resist: stat(raw, MAGIC_RESIST_KEYS),
        },
        items: raw
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|entry| is_truthy(entry))
                    .map(normalize_item)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Normalize a whole player list. The body must be a JSON array.
pub fn normalize_scoreboard(body: &Value) -> Result<Scoreboard, ShapeError> {
    let players = body.as_array().ok_or(ShapeError {
        found: json_kind(body),
    })?;
    Ok(Scoreboard::new(players.iter().map(normalize_player).collect()))
}

/// Coerce a loose JSON value into a rounded integer.
///
/// Accepts numbers and numeric strings. Anything that does not yield a
/// finite number is `None`. Rounding is half away from zero.
pub fn coerce_number(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };

    if !n.is_finite() {
        return None;
    }
    Some(n.round() as i64)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn normalize_item(entry: &Value) -> Item {
    let name = first_string(entry, ITEM_NAME_KEYS).unwrap_or_default();
    let raw_display = first_string(entry, ITEM_RAW_KEYS).unwrap_or_else(|| name.clone());

    Item {
        name,
        raw_display,
        item_id: first_number(entry, ITEM_ID_KEYS).unwrap_or(0),
        count: first_number(entry, ITEM_COUNT_KEYS)
            .map(|c| c.max(1))
            .unwrap_or(1),
    }
}

/// First key in `keys` holding a non-empty string.
fn first_string(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(key)?.as_str())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// First key in `keys` holding a numeric-coercible value.
fn first_number(record: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .find_map(|key| record.get(key).and_then(coerce_number))
}

/// Look a stat up in each stat container in turn.
fn stat(record: &Value, keys: &[&str]) -> Option<i64> {
    STAT_CONTAINERS
        .iter()
        .filter_map(|container| record.get(container))
        .find_map(|block| first_number(block, keys))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
