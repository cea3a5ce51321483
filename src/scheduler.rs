use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::SupervisorConfig;
use crate::models::SweepTrigger;
use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Drives periodic sweeps. Once started it runs for the lifetime of the process.
pub struct Scheduler {
    supervisor: Arc<Supervisor>,
    service_name: String,
    interval: Duration,
    sweep_on_start: bool,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(supervisor: Arc<Supervisor>, config: &SupervisorConfig) -> Self {
        Self {
            supervisor,
            service_name: config.service_name.clone(),
            interval: config.check_interval(),
            sweep_on_start: config.sweep_on_start,
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Sends the startup notification, then spawns the timer loop.
    ///
    /// The first timed sweep fires one full interval after start. Returns `None`
    /// if the scheduler was already running.
    pub async fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return None;
        }

        info!(
            service = %self.service_name,
            interval_secs = self.interval.as_secs(),
            targets = self.supervisor.targets().len(),
            "Scheduler started"
        );
        self.supervisor
            .notifier()
            .started(&self.service_name, self.supervisor.targets().len())
            .await;

        Some(tokio::spawn(async move { self.run().await }))
    }

    async fn run(&self) {
        if self.sweep_on_start {
            self.supervisor.sweep(SweepTrigger::Startup).await;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.supervisor.sweep(SweepTrigger::Timer).await;
        }
    }
}
