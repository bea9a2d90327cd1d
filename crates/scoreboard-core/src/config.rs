// Configuration loading and validation (config/bridge.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "bridge.toml";

/// League of Legends in-game id as reported by the host runtime.
pub const LEAGUE_GAME_ID: u32 = 5426;

pub const DEFAULT_LIVE_CLIENT_URL: &str = "https://127.0.0.1:2999/liveclientdata/playerlist";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_ERROR_THROTTLE_MS: u64 = 5000;
pub const DEFAULT_WS_PORT: u16 = 61337;
pub const DEFAULT_VERSIONS_URL: &str = "https://ddragon.leagueoflegends.com/api/versions.json";
pub const DEFAULT_CATALOG_VERSION: &str = "14.20.1";

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub live_client: LiveClientConfig,
    pub games: GamesConfig,
    pub ws_port: u16,
    pub catalog: CatalogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            live_client: LiveClientConfig::default(),
            games: GamesConfig::default(),
            ws_port: DEFAULT_WS_PORT,
            catalog: CatalogConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// bridge.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the whole bridge.toml file.
#[derive(Debug, Clone, Deserialize)]
struct BridgeFile {
    #[serde(default)]
    live_client: LiveClientConfig,
    games: GamesConfig,
    websocket: WebsocketSection,
    #[serde(default)]
    catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct WebsocketSection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveClientConfig {
    #[serde(default = "default_live_client_url")]
    pub url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_error_throttle_ms")]
    pub error_throttle_ms: u64,
}

impl LiveClientConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_throttle(&self) -> Duration {
        Duration::from_millis(self.error_throttle_ms)
    }
}

impl Default for LiveClientConfig {
    fn default() -> Self {
        LiveClientConfig {
            url: default_live_client_url(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            error_throttle_ms: DEFAULT_ERROR_THROTTLE_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GamesConfig {
    pub tracked: Vec<u32>,
    pub polling_target: u32,
    /// Requested for the polling target only; every other tracked game
    /// keeps the host's default feature set.
    pub required_features: Vec<String>,
}

impl GamesConfig {
    /// Features to request for `game_id`. Empty for anything but the target.
    pub fn features_for(&self, game_id: u32) -> &[String] {
        if game_id == self.polling_target {
            &self.required_features
        } else {
            &[]
        }
    }
}

impl Default for GamesConfig {
    fn default() -> Self {
        GamesConfig {
            tracked: vec![LEAGUE_GAME_ID],
            polling_target: LEAGUE_GAME_ID,
            required_features: vec![
                "live_client_data".to_string(),
                "matchState".to_string(),
                "match_info".to_string(),
                "game_info".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_versions_url")]
    pub versions_url: String,
    #[serde(default = "default_catalog_version")]
    pub fallback_version: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            versions_url: default_versions_url(),
            fallback_version: default_catalog_version(),
        }
    }
}

fn default_live_client_url() -> String {
    DEFAULT_LIVE_CLIENT_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_error_throttle_ms() -> u64 {
    DEFAULT_ERROR_THROTTLE_MS
}

fn default_versions_url() -> String {
    DEFAULT_VERSIONS_URL.to_string()
}

fn default_catalog_version() -> String {
    DEFAULT_CATALOG_VERSION.to_string()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/bridge.toml` relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: BridgeFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        live_client: file.live_client,
        games: file.games,
        ws_port: file.websocket.port,
        catalog: file.catalog,
    };

    validate(&config)?;

    Ok(config)
}

/// Seed `config/bridge.toml` from `defaults/` on first run.
///
/// Returns the path written, or `None` when a config already exists. An
/// existing config is never overwritten.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let source = base_dir.join("defaults").join(CONFIG_FILE);
    let config_dir = base_dir.join("config");
    let target = config_dir.join(CONFIG_FILE);

    if target.exists() {
        return Ok(None);
    }
    if !source.is_file() {
        return Err(seed_error(format!(
            "no {CONFIG_FILE} in {} or {}; start the bridge from its install directory",
            config_dir.display(),
            base_dir.join("defaults").display()
        )));
    }

    let defaults = std::fs::read(&source)
        .map_err(|e| seed_error(format!("cannot read {}: {e}", source.display())))?;
    std::fs::create_dir_all(&config_dir)
        .map_err(|e| seed_error(format!("cannot create {}: {e}", config_dir.display())))?;

    // create_new: a config that appeared since the check above wins.
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(seed_error(format!("cannot create {}: {e}", target.display()))),
    };
    std::io::Write::write_all(&mut dest, &defaults)
        .map_err(|e| seed_error(format!("cannot write {}: {e}", target.display())))?;

    Ok(Some(target))
}

fn seed_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if let Some(path) = ensure_config_file(&cwd)? {
        tracing::info!("Created {} from defaults", path.display());
    }
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.live_client.url.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "live_client.url".into(),
            message: "must not be empty".into(),
        });
    }

    let intervals: &[(&str, u64)] = &[
        ("live_client.poll_interval_ms", config.live_client.poll_interval_ms),
        ("live_client.error_throttle_ms", config.live_client.error_throttle_ms),
    ];
    for (name, val) in intervals {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    let games = &config.games;
    if !games.tracked.contains(&games.polling_target) {
        return Err(ConfigError::ValidationError {
            field: "games.polling_target".into(),
            message: format!(
                "{} is not listed in games.tracked {:?}",
                games.polling_target, games.tracked
            ),
        });
    }

    if games.required_features.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "games.required_features".into(),
            message: "must list at least one feature".into(),
        });
    }

    if config.ws_port == 0 {
        return Err(ConfigError::ValidationError {
            field: "websocket.port".into(),
            message: "must be > 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
