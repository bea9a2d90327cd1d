// Event reconciler: bridges host-pushed events and poll results into one
// canonical output stream.
//
// Sole owner of the session state. Every transition runs to completion on
// the app loop before the next event is looked at; host calls that wait on a
// reply are spawned so the loop never blocks on them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use scoreboard_core::config::{Config, GamesConfig};
use scoreboard_core::diff::has_changed;
use scoreboard_core::model::Scoreboard;
use scoreboard_core::normalize::normalize_scoreboard;
use scoreboard_core::protocol::{
    extract_player_list, HostEvent, LogLevel, OutputEvent, PayloadError,
};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::EventBus;
use crate::host::GameHost;
use crate::live_client::{LiveClientSource, PollError};
use crate::poller::{PollOutcome, Poller};

/// Active game id meaning "no game".
pub const NO_ACTIVE_GAME: u32 = 0;

/// Error text used when the host reports an error with no usable message.
pub const UNKNOWN_ERROR: &str = "unknown-error";

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Where the session for the polling target stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session.
    Inactive,
    /// Host events are believed live.
    ActivePush,
    /// Polling forced after a host failure.
    ActivePollFallback,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub active_game_id: u32,
    pub tracked_game_ids: HashSet<u32>,
    /// Most recent snapshot, kept only for change detection.
    pub last_scoreboard: Option<Scoreboard>,
    /// When the last throttled error event went out.
    pub last_error_at: Option<Instant>,
    pub phase: SessionPhase,
}

impl SessionState {
    pub fn new(tracked: impl IntoIterator<Item = u32>) -> Self {
        Self {
            active_game_id: NO_ACTIVE_GAME,
            tracked_game_ids: tracked.into_iter().collect(),
            last_scoreboard: None,
            last_error_at: None,
            phase: SessionPhase::Inactive,
        }
    }

    pub fn is_tracked(&self, game_id: u32) -> bool {
        self.tracked_game_ids.contains(&game_id)
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    session: SessionState,
    games: GamesConfig,
    error_throttle: Duration,
    catalog_version: Option<String>,
    poller: Poller,
    host: Arc<dyn GameHost>,
    bus: EventBus,
    active_game_tx: watch::Sender<u32>,
}

impl Reconciler {
    pub fn new(
        config: &Config,
        host: Arc<dyn GameHost>,
        bus: EventBus,
        source: Arc<dyn LiveClientSource>,
        outcomes: mpsc::Sender<PollOutcome>,
    ) -> Self {
        let (active_game_tx, active_game_rx) = watch::channel(NO_ACTIVE_GAME);
        let poller = Poller::new(
            source,
            config.games.polling_target,
            config.live_client.poll_interval(),
            active_game_rx,
            outcomes,
        );

        Self {
            session: SessionState::new(config.games.tracked.iter().copied()),
            games: config.games.clone(),
            error_throttle: config.live_client.error_throttle(),
            catalog_version: None,
            poller,
            host,
            bus,
            active_game_tx,
        }
    }

    /// Catalog version announced in the `ready` event.
    pub fn with_catalog_version(mut self, version: impl Into<String>) -> Self {
        self.catalog_version = Some(version.into());
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_polling()
    }

    /// Request feature sets for every tracked game, then announce readiness.
    pub fn startup(&mut self) {
        let mut tracked: Vec<u32> = self.session.tracked_game_ids.iter().copied().collect();
        tracked.sort_unstable();

        for game_id in tracked {
            self.request_features(game_id);
        }

        info!("Scoreboard bridge ready");
        self.bus.publish(OutputEvent::Ready {
            catalog_version: self.catalog_version.clone(),
        });
    }

    pub fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::GameDetected { game_id, name, .. } => self.on_game_detected(game_id, &name),
            HostEvent::GameExit {
                game_id,
                process_name,
                ..
            } => self.on_game_exit(game_id, &process_name),
            HostEvent::ElevatedPrivilegesRequired { game_id, .. } => {
                warn!(game_id, "Host requires elevated privileges to capture game");
                self.log(
                    LogLevel::Warn,
                    format!("Elevated privileges required for game {game_id}"),
                );
            }
            HostEvent::NewInfoUpdate { game_id, payload } => self.on_info_update(game_id, &payload),
            HostEvent::NewGameEvent { game_id, payload } => {
                debug!(game_id, ?payload, "Game event");
            }
            HostEvent::Error { game_id, error } => self.on_host_error(game_id, error),
        }
    }

    pub fn handle_poll_outcome(&mut self, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Scoreboard(scoreboard) => {
                self.accept_scoreboard(scoreboard);
            }
            PollOutcome::Failed(error) => self.report_poll_failure(&error),
        }
    }

    /// The shim went away: nothing downstream can hear us, so end the session.
    pub fn handle_disconnect(&mut self) {
        let target = self.games.polling_target;
        let active = self.session.active_game_id;
        if active != NO_ACTIVE_GAME && active != target {
            self.on_game_exit(active, "");
        }
        if self.session.phase != SessionPhase::Inactive || self.poller.is_polling() {
            info!("Shim disconnected, ending session");
            self.on_game_exit(target, "");
        }
    }

    pub fn shutdown(&mut self) {
        self.poller.stop();
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn on_game_detected(&mut self, game_id: u32, name: &str) {
        if !self.session.is_tracked(game_id) {
            debug!(game_id, name, "Ignoring untracked game");
            return;
        }

        info!(game_id, name, "Game detected");
        self.set_active_game(game_id);
        self.enable_capture(game_id);
        self.request_features(game_id);

        if game_id == self.games.polling_target {
            self.session.phase = SessionPhase::ActivePush;
            self.poller.start(false);
        }
    }

    fn on_game_exit(&mut self, game_id: u32, process_name: &str) {
        if game_id == self.session.active_game_id {
            info!(game_id, process_name, "Game exited");
            self.set_active_game(NO_ACTIVE_GAME);
        }

        if game_id == self.games.polling_target {
            self.poller.stop();
            self.session.last_scoreboard = None;
            self.session.phase = SessionPhase::Inactive;
        }
    }

    fn on_info_update(&mut self, game_id: u32, payload: &Value) {
        if game_id != self.games.polling_target {
            return;
        }

        let players = match extract_player_list(payload) {
            Ok(players) => players,
            Err(PayloadError::Unrecognized | PayloadError::MissingPlayers) => {
                debug!(game_id, "Info update carries no player list");
                return;
            }
            Err(e) => {
                warn!(game_id, "Discarding info update: {e}");
                self.log(LogLevel::Warn, format!("Discarding info update: {e}"));
                return;
            }
        };

        let scoreboard = match normalize_scoreboard(&players) {
            Ok(board) => board,
            Err(e) => {
                warn!(game_id, "Discarding info update: {e}");
                self.log(LogLevel::Warn, format!("Discarding info update: {e}"));
                return;
            }
        };

        if self.accept_scoreboard(scoreboard) {
            self.poller.start(false);
        }
    }

    fn on_host_error(&mut self, game_id: u32, error: Value) {
        let message = normalize_error_message(&error);
        warn!(game_id, error = %message, "Host reported an error");
        self.log(
            LogLevel::Error,
            format!("Host error for game {game_id}: {message}"),
        );

        if game_id != self.games.polling_target {
            return;
        }

        self.poller.start(true);
        self.session.phase = SessionPhase::ActivePollFallback;
        self.bus.publish(OutputEvent::ScoreboardError {
            game_id,
            error: message,
            details: (!error.is_null()).then_some(error),
        });

        if self.session.active_game_id == game_id {
            self.set_active_game(NO_ACTIVE_GAME);
        }
    }

    // -----------------------------------------------------------------------
    // Shared steps
    // -----------------------------------------------------------------------

    /// Diff against the retained snapshot, notify on change, then retain
    /// `scoreboard` either way. Returns whether it was a change.
    fn accept_scoreboard(&mut self, scoreboard: Scoreboard) -> bool {
        let changed = has_changed(self.session.last_scoreboard.as_ref(), &scoreboard);
        if changed {
            debug!(players = scoreboard.players.len(), "Scoreboard changed");
            self.bus.publish(OutputEvent::ScoreboardUpdate {
                scoreboard: scoreboard.clone(),
            });
        }
        self.session.last_scoreboard = Some(scoreboard);
        changed
    }

    fn report_poll_failure(&mut self, error: &PollError) {
        warn!("Live client poll failed: {error}");
        self.log(LogLevel::Warn, format!("Live client poll failed: {error}"));

        let now = Instant::now();
        let due = self
            .session
            .last_error_at
            .map_or(true, |last| now.duration_since(last) >= self.error_throttle);
        if !due {
            return;
        }

        self.session.last_error_at = Some(now);
        self.bus.publish(OutputEvent::ScoreboardError {
            game_id: self.games.polling_target,
            error: error.to_string(),
            details: None,
        });
    }

    fn set_active_game(&mut self, game_id: u32) {
        self.session.active_game_id = game_id;
        self.active_game_tx.send_replace(game_id);
    }

    fn enable_capture(&self, game_id: u32) {
        let host = self.host.clone();
        tokio::spawn(async move {
            if let Err(e) = host.enable_capture(game_id).await {
                warn!(game_id, "Failed to enable capture: {e}");
            }
        });
    }

    /// Only the polling target has a feature list; other games keep the
    /// host's defaults and get no request.
    fn request_features(&self, game_id: u32) {
        let features = self.games.features_for(game_id).to_vec();
        if features.is_empty() {
            debug!(game_id, "No required features, host defaults apply");
            return;
        }

        let host = self.host.clone();
        tokio::spawn(async move {
            match host.set_required_features(game_id, &features).await {
                Ok(()) => info!(game_id, count = features.len(), "Required features set"),
                Err(e) => warn!(game_id, "Failed to set required features: {e}"),
            }
        });
    }

    fn log(&self, level: LogLevel, message: String) {
        self.bus.publish(OutputEvent::log(level, message));
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.poller.stop();
    }
}

/// Human-readable text for a host error value.
///
/// Structured errors contribute their `message`; anything else is
/// stringified. Empty or missing errors become [`UNKNOWN_ERROR`].
pub fn normalize_error_message(error: &Value) -> String {
    let text = match error {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    };

    if text.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
