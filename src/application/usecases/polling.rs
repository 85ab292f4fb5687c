use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::usecases::subscription_store::SubscriptionStore;
use crate::config::config_model::PollingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Slow,
    Fast,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Slow => f.write_str("slow"),
            Cadence::Fast => f.write_str("fast"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Schedule {
    burst_until: Option<Instant>,
    stopped: bool,
}

impl Schedule {
    fn cadence_at(&self, now: Instant) -> Cadence {
        match self.burst_until {
            Some(until) if now < until => Cadence::Fast,
            _ => Cadence::Slow,
        }
    }
}

/// Keeps the store fresh in the background: slow polling in steady state, a
/// short fast burst after a checkout return.
pub struct PollingSynchronizer {
    store: Arc<SubscriptionStore>,
    config: PollingConfig,
}

impl PollingSynchronizer {
    pub fn new(store: Arc<SubscriptionStore>, config: PollingConfig) -> Self {
        Self { store, config }
    }

    /// Spawns the poller. The first fetch happens one slow interval from now.
    /// Each handle owns exactly one task, so polls never overlap.
    pub fn start(&self) -> PollingHandle {
        let (schedule, receiver) = watch::channel(Schedule::default());
        let task = tokio::spawn(poll_loop(self.store.clone(), self.config, receiver));
        PollingHandle {
            schedule,
            config: self.config,
            task: Some(task),
        }
    }
}

/// Owner of a running poller. Dropping it cancels the task.
pub struct PollingHandle {
    schedule: watch::Sender<Schedule>,
    config: PollingConfig,
    task: Option<JoinHandle<()>>,
}

impl PollingHandle {
    /// Switches to fast polling for the burst window. Calling it again during a
    /// burst restarts the window rather than stacking a second timer.
    pub fn on_checkout_return(&self) {
        let until = Instant::now() + self.config.burst_window;
        self.schedule.send_modify(|schedule| schedule.burst_until = Some(until));
        info!(
            burst_secs = self.config.burst_window.as_secs(),
            "polling: checkout return, switching to fast cadence"
        );
    }

    pub fn cadence(&self) -> Cadence {
        self.schedule.borrow().cadence_at(Instant::now())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the poller and waits for an in-flight fetch to finish.
    pub async fn stop(mut self) {
        self.schedule.send_modify(|schedule| schedule.stopped = true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "polling: task ended abnormally");
            }
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_loop(
    store: Arc<SubscriptionStore>,
    config: PollingConfig,
    mut schedule: watch::Receiver<Schedule>,
) {
    debug!("polling: started");
    let mut last_cadence = Cadence::Slow;
    loop {
        let current = *schedule.borrow_and_update();
        if current.stopped {
            break;
        }

        let cadence = current.cadence_at(Instant::now());
        if cadence != last_cadence {
            info!(from = %last_cadence, to = %cadence, "polling: cadence changed");
            last_cadence = cadence;
        }
        let period: Duration = match cadence {
            Cadence::Slow => config.slow_interval,
            Cadence::Fast => config.fast_interval,
        };

        tokio::select! {
            _ = tokio::time::sleep(period) => {
                if let Err(err) = store.fetch().await {
                    warn!(%cadence, error = %err, "polling: fetch failed");
                }
            }
            changed = schedule.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("polling: stopped");
}
