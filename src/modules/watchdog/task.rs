use super::database::{WatchdogConfig, WatchdogDatabase};
use super::executor::{ExecutorError, ShutdownExecutor};
use super::notifier::Notifier;
use super::presence::{PlayerSnapshot, PresenceTracker};
use super::state::{IdleTimer, Notice, Outcome, WatchdogState};
use crate::database::Database;
use crate::tasks::Task;
use async_trait::async_trait;
use poise::serenity_prelude::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct WatchdogStatus {
    pub state: WatchdogState,
    pub config: WatchdogConfig,
    pub remaining: Option<Duration>,
    pub snapshot: Option<PlayerSnapshot>,
}

/// The idle-shutdown watchdog for one game server.
///
/// All state lives in one [`IdleTimer`] behind one mutex; the poll loop and
/// the admin commands both go through it. Remote calls (polling, shutdown)
/// and notifications happen with the lock released.
pub struct Watchdog {
    timer: Mutex<IdleTimer>,
    presence: Arc<dyn PresenceTracker>,
    executor: Arc<dyn ShutdownExecutor>,
    notifier: Arc<dyn Notifier>,
    shutdown_timeout: Duration,
    store: Option<Database<WatchdogDatabase>>,
}

impl Watchdog {
    pub fn new(
        config: WatchdogConfig,
        presence: Arc<dyn PresenceTracker>,
        executor: Arc<dyn ShutdownExecutor>,
        notifier: Arc<dyn Notifier>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            timer: Mutex::new(IdleTimer::new(config)),
            presence,
            executor,
            notifier,
            shutdown_timeout,
            store: None,
        }
    }

    /// Persists config changes made through the admin commands.
    pub fn with_store(mut self, store: Database<WatchdogDatabase>) -> Self {
        self.store = Some(store);
        self
    }

    /// Polls once and evaluates the timer. Returns the handle of the shutdown
    /// this tick started, if any.
    pub async fn tick(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let poll = self.presence.poll().await;
        debug!("Watchdog poll via {}: {:?}", self.presence.name(), poll);

        let outcome = {
            let mut timer = self.timer.lock().await;
            timer.evaluate(poll, Instant::now())
        };

        self.notify(&outcome.notices).await;

        outcome.shutdown.map(|cycle| {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_shutdown(cycle).await })
        })
    }

    async fn still_wanted(&self, cycle: u64) -> bool {
        let wanted = self.timer.lock().await.may_execute(cycle);
        if !wanted {
            info!("Shutdown cycle {} was cancelled before it ran", cycle);
        }
        wanted
    }

    async fn run_shutdown(&self, cycle: u64) {
        if !self.still_wanted(cycle).await {
            return;
        }
        info!("Executing shutdown for cycle {}", cycle);

        let result = match self.executor.prepare().await {
            Ok(prepared) => {
                // A backup can take long enough for an admin to step in.
                if !self.still_wanted(cycle).await {
                    return;
                }
                self.shut_down(prepared).await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => info!("Shutdown cycle {} finished", cycle),
            Err(e) => error!("Shutdown cycle {} failed: {}", cycle, e),
        }

        let outcome = {
            let mut timer = self.timer.lock().await;
            timer.shutdown_finished(cycle, result)
        };
        self.notify(&outcome.notices).await;
    }

    /// The shutdown itself, bounded by the shutdown timeout.
    async fn shut_down(&self, prepared: String) -> Result<String, ExecutorError> {
        match timeout(self.shutdown_timeout, self.executor.execute()).await {
            Ok(Ok(output)) if prepared.is_empty() => Ok(output),
            Ok(Ok(output)) => Ok(format!("{}\n{}", prepared, output)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExecutorError::Timeout(self.shutdown_timeout)),
        }
    }

    async fn notify(&self, notices: &[Notice]) {
        for notice in notices {
            self.notifier.send(&notice.to_string()).await;
        }
    }

    /// Runs an admin change and persists the resulting config while still
    /// holding the timer, so saves land in the same order as the changes.
    async fn apply<F>(&self, f: F)
    where
        F: FnOnce(&mut IdleTimer) -> Outcome,
    {
        let outcome = {
            let mut timer = self.timer.lock().await;
            let outcome = f(&mut timer);
            if let Some(store) = &self.store {
                if let Err(e) = store.save_config(timer.config()).await {
                    error!("Failed to persist watchdog config: {}", e);
                }
            }
            outcome
        };

        self.notify(&outcome.notices).await;
    }

    pub async fn enable(&self) {
        self.apply(IdleTimer::enable).await;
    }

    pub async fn disable(&self) {
        self.apply(IdleTimer::disable).await;
    }

    pub async fn set_idle_timeout(&self, secs: u64) {
        self.apply(|timer| {
            timer.set_idle_timeout(secs);
            Outcome::default()
        })
        .await;
    }

    pub async fn status(&self) -> WatchdogStatus {
        let timer = self.timer.lock().await;
        WatchdogStatus {
            state: timer.state(),
            config: timer.config(),
            remaining: timer.remaining(Instant::now()),
            snapshot: timer.snapshot().cloned(),
        }
    }

    /// How long the loop should sleep: the poll interval, shortened so a
    /// pending deadline is evaluated on time.
    pub async fn next_delay(&self) -> Duration {
        let timer = self.timer.lock().await;
        let interval = timer.poll_interval();
        match timer.remaining(Instant::now()) {
            Some(remaining) => interval.min(remaining.max(Duration::from_millis(100))),
            None => interval,
        }
    }
}

#[derive(Clone)]
pub struct WatchdogTask {
    watchdog: Arc<Watchdog>,
    next: Duration,
}

impl WatchdogTask {
    pub fn new(watchdog: Arc<Watchdog>) -> Self {
        Self {
            watchdog,
            next: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl Task for WatchdogTask {
    fn name(&self) -> &str {
        "Watchdog"
    }

    fn schedule(&self) -> Option<Duration> {
        Some(self.next)
    }

    async fn execute(
        &mut self,
        _ctx: &Context,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // The shutdown runs detached; the loop keeps polling meanwhile.
        let _ = self.watchdog.tick().await;
        self.next = self.watchdog.next_delay().await;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::presence::PollError;
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted poll results; repeats the last one when exhausted.
    struct ScriptedPresence {
        script: Mutex<VecDeque<Result<usize, PollError>>>,
    }

    impl ScriptedPresence {
        fn new(script: Vec<Result<usize, PollError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }

        async fn push(&self, next: Result<usize, PollError>) {
            let mut script = self.script.lock().await;
            script.clear();
            script.push_back(next);
        }
    }

    #[async_trait]
    impl PresenceTracker for ScriptedPresence {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn poll(&self) -> Result<PlayerSnapshot, PollError> {
            let mut script = self.script.lock().await;
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            next.unwrap_or(Ok(0)).map(|count| {
                PlayerSnapshot::new((0..count).map(|i| format!("p{}", i)).collect(), Instant::now())
            })
        }
    }

    struct FakeExecutor {
        calls: AtomicUsize,
        prepared: AtomicUsize,
        fail: bool,
        delay: Duration,
        prepare_delay: Duration,
    }

    impl FakeExecutor {
        fn new(fail: bool, delay: Duration) -> Arc<Self> {
            Self::with_backup(fail, delay, Duration::ZERO)
        }

        fn with_backup(fail: bool, delay: Duration, prepare_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                prepared: AtomicUsize::new(0),
                fail,
                delay,
                prepare_delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn prepared(&self) -> usize {
            self.prepared.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ShutdownExecutor for FakeExecutor {
        async fn prepare(&self) -> Result<String, ExecutorError> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.prepare_delay).await;
            Ok(String::new())
        }

        async fn execute(&self) -> Result<String, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(ExecutorError::RemoteFailure("simulated".into()))
            } else {
                Ok("bye".into())
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl RecordingNotifier {
        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                delay,
            })
        }

        async fn messages(&self) -> Vec<String> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &str) {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.sent.lock().await.push(message.to_string());
        }
    }

    fn watchdog(
        presence: Arc<ScriptedPresence>,
        executor: Arc<FakeExecutor>,
        notifier: Arc<RecordingNotifier>,
        timeout_secs: u64,
    ) -> Arc<Watchdog> {
        Arc::new(Watchdog::new(
            WatchdogConfig {
                enabled: true,
                idle_timeout_secs: timeout_secs,
                poll_interval_secs: 1,
            },
            presence,
            executor,
            notifier,
            Duration::from_secs(30),
        ))
    }

    async fn advance(secs: u64) {
        tokio::time::advance(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_server_is_shut_down_once_after_timeout() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::new(false, Duration::ZERO);
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = watchdog(presence, executor.clone(), notifier.clone(), 5);

        assert!(wd.tick().await.is_none());
        advance(2).await;
        assert!(wd.tick().await.is_none());
        advance(4).await;

        let handle = wd.tick().await.expect("shutdown should start");
        handle.await.unwrap();
        assert_eq!(executor.calls(), 1);

        // Holds until the host is seen gone; no second shutdown.
        assert_eq!(wd.status().await.state, WatchdogState::PoweringOff);
        let messages = notifier.messages().await;
        assert!(messages[0].contains("Shutdown timer started"));
        assert!(messages[1].contains("shutting down"));
        assert!(messages[2].contains("shutdown done"));
    }

    #[tokio::test(start_paused = true)]
    async fn returning_player_prevents_shutdown() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::new(false, Duration::ZERO);
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = watchdog(presence.clone(), executor.clone(), notifier.clone(), 5);

        wd.tick().await;
        advance(3).await;
        presence.push(Ok(1)).await;
        assert!(wd.tick().await.is_none());
        assert_eq!(wd.status().await.state, WatchdogState::Idle);

        advance(10).await;
        assert!(wd.tick().await.is_none());
        assert_eq!(executor.calls(), 0);
        assert!(notifier.messages().await[1].contains("stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_shutdown_reports_once_and_keeps_polling() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::new(true, Duration::ZERO);
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = watchdog(presence.clone(), executor.clone(), notifier.clone(), 5);

        wd.tick().await;
        advance(5).await;
        wd.tick().await.unwrap().await.unwrap();

        assert_eq!(wd.status().await.state, WatchdogState::Idle);
        let failures = notifier
            .messages()
            .await
            .iter()
            .filter(|m| m.contains("Shutdown failed"))
            .count();
        assert_eq!(failures, 1);

        // The loop carries on: the still-empty server starts a fresh countdown.
        assert!(wd.tick().await.is_none());
        assert!(matches!(
            wd.status().await.state,
            WatchdogState::CountingDown { .. }
        ));
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_executor_times_out() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::new(false, Duration::from_secs(3600));
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = watchdog(presence, executor.clone(), notifier.clone(), 1);

        wd.tick().await;
        advance(1).await;
        let handle = wd.tick().await.unwrap();

        // Polling is not blocked by the in-flight shutdown.
        assert!(wd.tick().await.is_none());
        assert_eq!(wd.status().await.state, WatchdogState::ShuttingDown);

        handle.await.unwrap();
        assert_eq!(wd.status().await.state, WatchdogState::Idle);
        assert!(notifier
            .messages()
            .await
            .last()
            .unwrap()
            .contains("did not finish"));
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backup_longer_than_shutdown_timeout_still_shuts_down() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::with_backup(false, Duration::ZERO, Duration::from_secs(600));
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = watchdog(presence, executor.clone(), notifier.clone(), 1);

        wd.tick().await;
        advance(1).await;
        wd.tick().await.unwrap().await.unwrap();

        assert_eq!(executor.prepared(), 1);
        assert_eq!(executor.calls(), 1);
        assert_eq!(wd.status().await.state, WatchdogState::PoweringOff);
        assert!(notifier.messages().await.last().unwrap().contains("shutdown done"));
    }

    #[tokio::test(start_paused = true)]
    async fn disable_while_shutdown_is_announced_prevents_it() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::new(false, Duration::ZERO);
        let notifier = RecordingNotifier::slow(Duration::from_secs(8));
        let wd = watchdog(presence, executor.clone(), notifier.clone(), 1);

        wd.tick().await;
        advance(1).await;

        // The expiry tick blocks on the slow "shutting down" notice.
        let expiring = {
            let wd = wd.clone();
            tokio::spawn(async move { wd.tick().await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(wd.status().await.state, WatchdogState::ShuttingDown);

        wd.disable().await;
        if let Some(shutdown) = expiring.await.unwrap() {
            shutdown.await.unwrap();
        }

        assert_eq!(executor.calls(), 0);
        assert_eq!(executor.prepared(), 0);
        assert_eq!(wd.status().await.state, WatchdogState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_polls_while_powering_off_start_no_countdown() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::new(false, Duration::ZERO);
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = watchdog(presence.clone(), executor.clone(), notifier.clone(), 1);

        wd.tick().await;
        advance(1).await;
        wd.tick().await.unwrap().await.unwrap();
        let sent = notifier.messages().await.len();

        for _ in 0..10 {
            advance(10).await;
            assert!(wd.tick().await.is_none());
        }
        assert_eq!(notifier.messages().await.len(), sent);
        assert_eq!(executor.calls(), 1);

        presence.push(Err(PollError::Unreachable("down".into()))).await;
        wd.tick().await;
        assert_eq!(wd.status().await.state, WatchdogState::Unreachable);
        assert_eq!(notifier.messages().await.len(), sent);
    }

    #[tokio::test]
    async fn concurrent_admin_changes_persist_the_final_config() {
        let path = std::env::temp_dir().join(format!("watchdog-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let path = path.to_string_lossy().to_string();

        let store = Database::<WatchdogDatabase>::new(path.clone()).await.unwrap();
        let wd = Arc::new(
            Watchdog::new(
                WatchdogConfig::default(),
                ScriptedPresence::new(vec![Ok(1)]),
                FakeExecutor::new(false, Duration::ZERO),
                Arc::new(RecordingNotifier::default()),
                Duration::from_secs(30),
            )
            .with_store(store.clone()),
        );

        let changes = (0..20).map(|i| {
            let wd = wd.clone();
            tokio::spawn(async move {
                match i % 3 {
                    0 => wd.enable().await,
                    1 => wd.disable().await,
                    _ => wd.set_idle_timeout(60 + i).await,
                }
            })
        });
        for change in futures::future::join_all(changes).await {
            change.unwrap();
        }

        let live = wd.status().await.config;
        assert_eq!(store.get_config().await, Some(live));

        let reopened = Database::<WatchdogDatabase>::new(path.clone()).await.unwrap();
        assert_eq!(reopened.get_config().await, Some(live));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_polls_never_shut_down_and_recover_once() {
        let presence = ScriptedPresence::new(vec![Err(PollError::Unreachable("down".into()))]);
        let executor = FakeExecutor::new(false, Duration::ZERO);
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = watchdog(presence.clone(), executor.clone(), notifier.clone(), 1);

        for _ in 0..20 {
            assert!(wd.tick().await.is_none());
            advance(5).await;
        }
        assert_eq!(wd.status().await.state, WatchdogState::Unreachable);
        assert!(notifier.messages().await.is_empty());

        presence.push(Ok(2)).await;
        wd.tick().await;
        wd.tick().await;
        assert_eq!(wd.status().await.state, WatchdogState::Idle);
        assert_eq!(notifier.messages().await.len(), 1);
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_cancels_countdown_before_deadline() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::new(false, Duration::ZERO);
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = watchdog(presence, executor.clone(), notifier.clone(), 5);

        wd.tick().await;
        advance(4).await;
        wd.disable().await;
        advance(10).await;
        assert!(wd.tick().await.is_none());

        assert_eq!(executor.calls(), 0);
        let status = wd.status().await;
        assert!(!status.config.enabled);
        assert_eq!(status.remaining, None);
        assert!(notifier.messages().await.last().unwrap().contains("disabled"));
    }

    #[tokio::test(start_paused = true)]
    async fn next_delay_wakes_for_the_deadline() {
        let presence = ScriptedPresence::new(vec![Ok(0)]);
        let executor = FakeExecutor::new(false, Duration::ZERO);
        let notifier = Arc::new(RecordingNotifier::default());
        let wd = Arc::new(Watchdog::new(
            WatchdogConfig {
                enabled: true,
                idle_timeout_secs: 5,
                poll_interval_secs: 60,
            },
            presence,
            executor,
            notifier,
            Duration::from_secs(30),
        ));

        assert_eq!(wd.next_delay().await, Duration::from_secs(60));
        wd.tick().await;
        assert_eq!(wd.next_delay().await, Duration::from_secs(5));
    }
}
