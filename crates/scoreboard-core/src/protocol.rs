// Wire protocol between the bridge and the overlay shim running inside the
// host runtime.
//
// Inbound: host lifecycle/telemetry events plus replies to feature requests.
// Outbound: host commands and the canonical output events consumed by the
// presentation layer. Every message is a JSON object tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::Scoreboard;

// ---------------------------------------------------------------------------
// Inbound: host -> bridge
// ---------------------------------------------------------------------------

/// Events the host runtime pushes for a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostEvent {
    #[serde(rename_all = "camelCase")]
    GameDetected {
        game_id: u32,
        #[serde(default)]
        name: String,
        #[serde(default)]
        info: Value,
    },
    #[serde(rename_all = "camelCase")]
    GameExit {
        game_id: u32,
        #[serde(default)]
        process_name: String,
        #[serde(default)]
        pid: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    ElevatedPrivilegesRequired {
        game_id: u32,
        #[serde(default)]
        details: Value,
    },
    #[serde(rename_all = "camelCase")]
    NewInfoUpdate {
        game_id: u32,
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    NewGameEvent {
        game_id: u32,
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        game_id: u32,
        #[serde(default)]
        error: Value,
    },
}

impl HostEvent {
    pub fn game_id(&self) -> u32 {
        match self {
            HostEvent::GameDetected { game_id, .. }
            | HostEvent::GameExit { game_id, .. }
            | HostEvent::ElevatedPrivilegesRequired { game_id, .. }
            | HostEvent::NewInfoUpdate { game_id, .. }
            | HostEvent::NewGameEvent { game_id, .. }
            | HostEvent::Error { game_id, .. } => *game_id,
        }
    }
}

/// Outcome of a `set-required-features` command, reported by the shim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureReply {
    pub request_id: u64,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Anything the shim may send.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    Event(HostEvent),
    FeaturesResult(FeatureReply),
}

const FEATURES_RESULT_TAG: &str = "features-result";

/// Parse one inbound text frame.
pub fn parse_host_message(text: &str) -> Result<HostMessage, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("type").and_then(Value::as_str) == Some(FEATURES_RESULT_TAG) {
        return serde_json::from_value(value).map(HostMessage::FeaturesResult);
    }
    serde_json::from_value(value).map(HostMessage::Event)
}

// ---------------------------------------------------------------------------
// Outbound: bridge -> host / presentation
// ---------------------------------------------------------------------------

/// Commands issued to the host runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostCommand {
    #[serde(rename_all = "camelCase")]
    EnableCapture { game_id: u32 },
    #[serde(rename_all = "camelCase")]
    SetRequiredFeatures {
        request_id: u64,
        game_id: u32,
        features: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Named output topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ScoreboardUpdate,
    ScoreboardError,
    Log,
    Ready,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::ScoreboardUpdate,
        Topic::ScoreboardError,
        Topic::Log,
        Topic::Ready,
    ];
}

/// Canonical events for the presentation layer.
///
/// Consumers must tolerate duplicates and reordering: push and poll paths
/// race and neither is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutputEvent {
    ScoreboardUpdate {
        scoreboard: Scoreboard,
    },
    #[serde(rename_all = "camelCase")]
    ScoreboardError {
        game_id: u32,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    Log {
        level: LogLevel,
        message: String,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Ready {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        catalog_version: Option<String>,
    },
}

impl OutputEvent {
    pub fn topic(&self) -> Topic {
        match self {
            OutputEvent::ScoreboardUpdate { .. } => Topic::ScoreboardUpdate,
            OutputEvent::ScoreboardError { .. } => Topic::ScoreboardError,
            OutputEvent::Log { .. } => Topic::Log,
            OutputEvent::Ready { .. } => Topic::Ready,
        }
    }

    /// A log event stamped with the current time.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        OutputEvent::Log {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Everything written to the shim's socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BridgeMessage {
    Command(HostCommand),
    Output(OutputEvent),
}

// ---------------------------------------------------------------------------
// Telemetry payloads
// ---------------------------------------------------------------------------

/// The player list inside `live_client_data`. The host delivers it either as
/// a JSON array or as a JSON-encoded string of one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PlayerList {
    Array(Vec<Value>),
    Encoded(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiveClientData {
    #[serde(default)]
    pub all_players: Option<PlayerList>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InfoBlock {
    pub live_client_data: LiveClientData,
}

/// The two known nestings of a telemetry update.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InfoPayload {
    /// `{ "info": { "live_client_data": { .. } } }`
    Wrapped { info: InfoBlock },
    /// `{ "live_client_data": { .. } }`
    Direct { live_client_data: LiveClientData },
}

impl InfoPayload {
    pub fn live_client_data(&self) -> &LiveClientData {
        match self {
            InfoPayload::Wrapped { info } => &info.live_client_data,
            InfoPayload::Direct { live_client_data } => live_client_data,
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unrecognized info update shape")]
    Unrecognized,

    #[error("live client data carries no player list")]
    MissingPlayers,

    #[error("player list is not valid JSON: {0}")]
    Encoded(#[from] serde_json::Error),
}

/// Pull the raw player list out of a `new-info-update` payload.
///
/// Returns the list as a JSON value; callers validate that it is an array.
pub fn extract_player_list(payload: &Value) -> Result<Value, PayloadError> {
    let parsed = InfoPayload::deserialize(payload).map_err(|_| PayloadError::Unrecognized)?;

    match &parsed.live_client_data().all_players {
        Some(PlayerList::Array(players)) => Ok(Value::Array(players.clone())),
        Some(PlayerList::Encoded(text)) => Ok(serde_json::from_str(text)?),
        None => Err(PayloadError::MissingPlayers),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
