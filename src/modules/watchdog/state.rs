//! The idle-shutdown state machine.
//!
//! [`IdleTimer`] performs no I/O: it is fed poll results, the current time and
//! executor outcomes, and answers with the notices to send and whether a
//! shutdown has to be started. The surrounding [`Watchdog`](super::task::Watchdog)
//! owns it behind a single mutex.

use super::database::WatchdogConfig;
use super::executor::ExecutorError;
use super::presence::{PlayerSnapshot, PollError};
use crate::utils::{format_hms, truncate};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    CountingDown { deadline: Instant },
    ShuttingDown,
    /// The shutdown command was accepted; waiting for the host to drop off.
    PoweringOff,
    Unreachable,
}

impl fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::CountingDown { .. } => write!(f, "counting down"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::PoweringOff => write!(f, "powering off"),
            Self::Unreachable => write!(f, "server unreachable"),
        }
    }
}

/// Operator-facing messages produced by state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    CountdownStarted { timeout: Duration },
    CountdownCancelled { players: usize },
    ShutdownStarting,
    ShutdownSucceeded { output: String },
    ShutdownFailed { error: String },
    Recovered { players: usize },
    Enabled,
    Disabled,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountdownStarted { timeout } => write!(
                f,
                "⏳ Server is empty. Shutdown timer started: `{}` until shutdown.",
                format_hms(timeout.as_secs())
            ),
            Self::CountdownCancelled { players } => write!(
                f,
                "❌ Shutdown timer stopped, `{}` player(s) online.",
                players
            ),
            Self::ShutdownStarting => {
                write!(f, "⚙️ Server has been empty for too long, shutting down.")
            }
            Self::ShutdownSucceeded { output } if output.trim().is_empty() => {
                write!(f, "🛑 Server shutdown done.")
            }
            Self::ShutdownSucceeded { output } => write!(
                f,
                "🛑 Server shutdown done.\n```\n{}\n```",
                truncate(output.trim(), 1000)
            ),
            Self::ShutdownFailed { error } => write!(
                f,
                "❌ Shutdown failed: {}\nNot retrying automatically, use `/server shutdown` to try again.",
                error
            ),
            Self::Recovered { players } => write!(
                f,
                "🟢 Server is reachable again, `{}` player(s) online.",
                players
            ),
            Self::Enabled => write!(f, "🟩 Auto-shutdown enabled."),
            Self::Disabled => write!(f, "🟥 Auto-shutdown disabled."),
        }
    }
}

/// What the caller has to do after feeding the timer an event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub notices: Vec<Notice>,
    /// Set when a shutdown must be started; carries the cycle number that
    /// the executor result has to be reported back with.
    pub shutdown: Option<u64>,
}

#[derive(Debug)]
pub struct IdleTimer {
    config: WatchdogConfig,
    state: WatchdogState,
    snapshot: Option<PlayerSnapshot>,
    cycle: u64,
}

impl IdleTimer {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            state: WatchdogState::Idle,
            snapshot: None,
            cycle: 0,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn config(&self) -> WatchdogConfig {
        self.config
    }

    pub fn snapshot(&self) -> Option<&PlayerSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.config.idle_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs.max(1))
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            WatchdogState::CountingDown { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// One evaluation tick: the poll result is applied before the deadline
    /// is checked, so a player seen in this tick always beats expiry.
    pub fn evaluate(&mut self, poll: Result<PlayerSnapshot, PollError>, now: Instant) -> Outcome {
        let mut outcome = Outcome::default();
        self.observe(poll, now, &mut outcome);
        self.check_deadline(now, &mut outcome);
        outcome
    }

    fn observe(&mut self, poll: Result<PlayerSnapshot, PollError>, now: Instant, out: &mut Outcome) {
        if self.state == WatchdogState::ShuttingDown {
            if let Ok(snapshot) = poll {
                self.snapshot = Some(snapshot);
            }
            return;
        }

        if self.state == WatchdogState::PoweringOff {
            match poll {
                Ok(snapshot) if snapshot.count > 0 => {
                    warn!("Host still up after shutdown, {} player(s) online", snapshot.count);
                    self.snapshot = Some(snapshot);
                    self.state = WatchdogState::Idle;
                }
                Ok(snapshot) => self.snapshot = Some(snapshot),
                Err(_) => {
                    info!("Host is down");
                    self.state = WatchdogState::Unreachable;
                }
            }
            return;
        }

        let snapshot = match poll {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if self.state != WatchdogState::Unreachable {
                    warn!("Watchdog lost contact with the server: {}", e);
                    self.state = WatchdogState::Unreachable;
                }
                return;
            }
        };

        let count = snapshot.count;
        self.snapshot = Some(snapshot);

        if self.state == WatchdogState::Unreachable {
            info!("Server reachable again with {} player(s)", count);
            out.notices.push(Notice::Recovered { players: count });
            self.state = WatchdogState::Idle;
        }

        match self.state {
            WatchdogState::Idle if count == 0 && self.config.enabled => {
                let timeout = self.idle_timeout();
                self.state = WatchdogState::CountingDown {
                    deadline: now + timeout,
                };
                info!("Server empty, shutdown in {:?}", timeout);
                out.notices.push(Notice::CountdownStarted { timeout });
            }
            WatchdogState::CountingDown { .. } if count > 0 => {
                info!("Countdown cancelled, {} player(s) online", count);
                self.state = WatchdogState::Idle;
                out.notices.push(Notice::CountdownCancelled { players: count });
            }
            _ => {}
        }
    }

    fn check_deadline(&mut self, now: Instant, out: &mut Outcome) {
        if let WatchdogState::CountingDown { deadline } = self.state {
            if now >= deadline {
                self.cycle += 1;
                self.state = WatchdogState::ShuttingDown;
                info!("Idle timeout reached, starting shutdown cycle {}", self.cycle);
                out.notices.push(Notice::ShutdownStarting);
                out.shutdown = Some(self.cycle);
            }
        }
    }

    /// Whether the shutdown started for `cycle` may still go ahead. False
    /// once an admin disable (or a newer cycle) has moved the state on.
    pub fn may_execute(&self, cycle: u64) -> bool {
        self.state == WatchdogState::ShuttingDown && self.cycle == cycle
    }

    /// Reports the executor result for `cycle`. Failures are never retried.
    /// After a success the timer holds in `PoweringOff` until the host is
    /// seen gone, so a server still answering while it stops does not start
    /// a new countdown.
    pub fn shutdown_finished(&mut self, cycle: u64, result: Result<String, ExecutorError>) -> Outcome {
        let mut outcome = Outcome::default();

        if self.may_execute(cycle) {
            self.state = match result {
                Ok(_) => WatchdogState::PoweringOff,
                Err(_) => WatchdogState::Idle,
            };
        }

        outcome.notices.push(match result {
            Ok(output) => Notice::ShutdownSucceeded { output },
            Err(e) => Notice::ShutdownFailed {
                error: e.to_string(),
            },
        });
        outcome
    }

    pub fn enable(&mut self) -> Outcome {
        self.config.enabled = true;
        Outcome {
            notices: vec![Notice::Enabled],
            shutdown: None,
        }
    }

    pub fn disable(&mut self) -> Outcome {
        self.config.enabled = false;
        self.state = WatchdogState::Idle;
        Outcome {
            notices: vec![Notice::Disabled],
            shutdown: None,
        }
    }

    /// Applies to the next countdown; a running deadline is left alone.
    pub fn set_idle_timeout(&mut self, secs: u64) {
        self.config.idle_timeout_secs = secs;
    }

    pub fn set_poll_interval(&mut self, secs: u64) {
        self.config.poll_interval_secs = secs;
    }
}
