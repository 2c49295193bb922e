//! Interval-driven invoker used for status and notification polling.
//!
//! Every tick is spawned as its own task, so a slow tick never delays the next
//! one and a panicking tick never kills the timer. Callers are responsible for
//! discarding results of superseded ticks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Default)]
struct ClockState {
    /// Bumped on every start/stop; a ticker only fires while its generation is current.
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

/// Cheap to clone; clones control the same timer.
#[derive(Clone)]
pub struct PollingClock {
    name: &'static str,
    state: Arc<Mutex<ClockState>>,
}

impl PollingClock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(ClockState::default())),
        }
    }

    /// Invokes `action` now and then every `every` until `stop` is called.
    /// Restarting an already running clock replaces the previous schedule.
    pub fn start<F, Fut>(&self, every: Duration, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(old) = state.ticker.take() {
            old.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        tokio::spawn(action());

        let shared = Arc::clone(&self.state);
        let name = self.name;
        state.ticker = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let state = shared.lock();
                if state.generation != generation {
                    break;
                }
                debug!(clock = name, "tick");
                tokio::spawn(action());
            }
        }));
        debug!(clock = name, every_ms = every.as_millis() as u64, "polling started");
    }

    /// Cancels all future invocations. Ticks already issued keep running.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
            debug!(clock = self.name, "polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().ticker.is_some()
    }
}
