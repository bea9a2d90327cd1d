// Live-data poller: a self-rescheduling pull loop against the live client.
//
// IDLE until `start`, then one cycle immediately and one per interval until
// `stop`. Each cycle spawns its own fetch, so a hung request never delays the
// next tick and two fetches may be in flight at once. Results go upward on
// `outcomes`; the poller never touches session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scoreboard_core::model::Scoreboard;
use scoreboard_core::normalize::normalize_scoreboard;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::live_client::{LiveClientSource, PollError};
use crate::reconciler::NO_ACTIVE_GAME;

/// Result of one fetch, reported to the reconciler.
#[derive(Debug)]
pub enum PollOutcome {
    Scoreboard(Scoreboard),
    Failed(PollError),
}

pub struct Poller {
    source: Arc<dyn LiveClientSource>,
    target_game_id: u32,
    interval: Duration,
    active_game: watch::Receiver<u32>,
    outcomes: mpsc::Sender<PollOutcome>,
    /// Set by a forced start; cycles then poll while no game is active.
    forced: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn LiveClientSource>,
        target_game_id: u32,
        interval: Duration,
        active_game: watch::Receiver<u32>,
        outcomes: mpsc::Sender<PollOutcome>,
    ) -> Self {
        Self {
            source,
            target_game_id,
            interval,
            active_game,
            outcomes,
            forced: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Start polling. Returns `true` if a new schedule was created.
    ///
    /// Without `force`, nothing happens unless the active game is the
    /// target. A forced start on a running schedule creates no second timer
    /// but lifts the active-game guard for the running one.
    pub fn start(&mut self, force: bool) -> bool {
        if self.is_polling() {
            if force && !self.forced.swap(true, Ordering::Relaxed) {
                info!("Live client polling switched to forced mode");
            }
            return false;
        }

        let active = *self.active_game.borrow();
        if !force && active != self.target_game_id {
            debug!(
                active,
                target = self.target_game_id,
                "Not starting poller: target game is not active"
            );
            return false;
        }

        self.forced.store(force, Ordering::Relaxed);
        info!(
            force,
            interval_ms = self.interval.as_millis() as u64,
            "Starting live client polling"
        );

        let cycle = PollCycle {
            source: self.source.clone(),
            target_game_id: self.target_game_id,
            active_game: self.active_game.clone(),
            outcomes: self.outcomes.clone(),
            forced: self.forced.clone(),
        };
        let interval = self.interval;

        self.task = Some(tokio::spawn(async move {
            // First tick completes immediately.
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cycle.fire();
            }
        }));
        true
    }

    /// Cancel the schedule. In-flight fetches still complete and report.
    pub fn stop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
            info!("Stopped live client polling");
        }
        self.forced.store(false, Ordering::Relaxed);
    }

    pub fn is_polling(&self) -> bool {
        self.task.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn is_forced(&self) -> bool {
        self.is_polling() && self.forced.load(Ordering::Relaxed)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one tick needs, cloned into the timer task.
#[derive(Clone)]
struct PollCycle {
    source: Arc<dyn LiveClientSource>,
    target_game_id: u32,
    active_game: watch::Receiver<u32>,
    outcomes: mpsc::Sender<PollOutcome>,
    forced: Arc<AtomicBool>,
}

impl PollCycle {
    fn fire(&self) {
        let active = *self.active_game.borrow();
        if active != self.target_game_id {
            // A forced schedule only stands in while no game is active.
            // Once another game takes over, the guard applies again.
            let forced = self.forced.load(Ordering::Relaxed);
            if forced && active != NO_ACTIVE_GAME {
                self.forced.store(false, Ordering::Relaxed);
                info!(active, "Another game is active, forced polling lifted");
            }
            if !forced || active != NO_ACTIVE_GAME {
                debug!("Skipping poll cycle: target game is not active");
                return;
            }
        }

        let cycle = self.clone();
        tokio::spawn(async move {
            let outcome = cycle.poll_once().await;
            let _ = cycle.outcomes.send(outcome).await;
        });
    }

    async fn poll_once(&self) -> PollOutcome {
        let result = self
            .source
            .fetch_players()
            .await
            .and_then(|body| normalize_scoreboard(&body).map_err(PollError::from));

        match result {
            Ok(scoreboard) => PollOutcome::Scoreboard(scoreboard),
            Err(e) => PollOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    const TARGET: u32 = 5426;
    const INTERVAL: Duration = Duration::from_millis(2000);

    /// Counts calls and answers with a fixed body.
    struct CountingSource {
        calls: AtomicUsize,
        body: Value,
    }

    impl CountingSource {
        fn new(body: Value) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                body,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LiveClientSource for CountingSource {
        async fn fetch_players(&self) -> Result<Value, PollError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn poller(
        source: Arc<CountingSource>,
        active: u32,
    ) -> (
        Poller,
        watch::Sender<u32>,
        mpsc::Receiver<PollOutcome>,
    ) {
        let (active_tx, active_rx) = watch::channel(active);
        let (tx, rx) = mpsc::channel(64);
        (Poller::new(source, TARGET, INTERVAL, active_rx, tx), active_tx, rx)
    }

    #[tokio::test]
    async fn unforced_start_without_active_target_is_noop() {
        tokio::time::pause();
        let source = CountingSource::new(json!([]));
        let (mut poller, _active, _rx) = poller(source.clone(), 0);

        assert!(!poller.start(false));
        assert!(!poller.is_polling());

        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn forced_start_always_proceeds() {
        tokio::time::pause();
        let source = CountingSource::new(json!([]));
        let (mut poller, _active, mut rx) = poller(source.clone(), 0);

        assert!(poller.start(true));
        assert!(poller.is_forced());

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Scoreboard(ref b) if b.is_empty()));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn first_cycle_runs_immediately_then_on_interval() {
        tokio::time::pause();
        let source = CountingSource::new(json!([{ "summonerName": "Faker" }]));
        let (mut poller, _active, mut rx) = poller(source.clone(), TARGET);

        assert!(poller.start(false));
        match rx.recv().await.unwrap() {
            PollOutcome::Scoreboard(board) => assert_eq!(board.players[0].name, "Faker"),
            other => panic!("expected scoreboard, got {other:?}"),
        }
        assert_eq!(source.calls(), 1);

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn double_start_keeps_a_single_schedule() {
        tokio::time::pause();
        let source = CountingSource::new(json!([]));
        let (mut poller, _active, _rx) = poller(source.clone(), TARGET);

        assert!(poller.start(false));
        assert!(!poller.start(false));
        assert!(!poller.start(true));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        // Ticks at 0, 2000 and 4000 ms.
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn stop_cancels_schedule_and_is_idempotent() {
        tokio::time::pause();
        let source = CountingSource::new(json!([]));
        let (mut poller, _active, _rx) = poller(source.clone(), TARGET);

        poller.start(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls(), 1);

        poller.stop();
        poller.stop();
        assert!(!poller.is_polling());

        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn cycles_skip_while_target_inactive_but_timer_keeps_running() {
        tokio::time::pause();
        let source = CountingSource::new(json!([]));
        let (mut poller, active, _rx) = poller(source.clone(), TARGET);

        poller.start(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls(), 1);

        active.send_replace(0);
        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(source.calls(), 1);
        assert!(poller.is_polling());

        active.send_replace(TARGET);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn forcing_a_running_schedule_lifts_the_guard() {
        tokio::time::pause();
        let source = CountingSource::new(json!([]));
        let (mut poller, active, _rx) = poller(source.clone(), TARGET);

        poller.start(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        active.send_replace(0);

        assert!(!poller.start(true));
        assert!(poller.is_forced());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn forced_schedule_yields_to_another_active_game() {
        tokio::time::pause();
        let source = CountingSource::new(json!([]));
        let (mut poller, active, _rx) = poller(source.clone(), 0);

        poller.start(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls(), 1);

        active.send_replace(10902);
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(source.calls(), 1);
        assert!(!poller.is_forced());

        // Back to no game: the force does not come back on its own.
        active.send_replace(0);
        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(source.calls(), 1);

        active.send_replace(TARGET);
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn non_array_body_reports_shape_failure() {
        tokio::time::pause();
        let source = CountingSource::new(json!({ "error": "not in game" }));
        let (mut poller, _active, mut rx) = poller(source, TARGET);

        poller.start(false);
        match rx.recv().await.unwrap() {
            PollOutcome::Failed(PollError::Shape(_)) => {}
            other => panic!("expected shape failure, got {other:?}"),
        }
    }
}
