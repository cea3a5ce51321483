use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::{AlertPolicy, OverlapPolicy};
use crate::models::{AlertMessage, ProbeOutcome, ProbeResult, SweepReport, SweepTrigger, Target};
use crate::notifier::Notifier;
use crate::prober::Prober;

/// Owns the static target set and runs sweeps over it, one at a time.
pub struct Supervisor {
    targets: Vec<Target>,
    prober: Prober,
    notifier: Notifier,
    alert_policy: AlertPolicy,
    overlap_policy: OverlapPolicy,
    sweep_lock: Mutex<()>,
    // Last known health per target name, only consulted for `AlertPolicy::OnTransition`.
    last_health: Mutex<HashMap<String, bool>>,
    last_report: RwLock<Option<SweepReport>>,
    sweeps_completed: AtomicU64,
}

impl Supervisor {
    pub fn new(targets: Vec<Target>, prober: Prober, notifier: Notifier) -> Self {
        Self {
            targets,
            prober,
            notifier,
            alert_policy: AlertPolicy::default(),
            overlap_policy: OverlapPolicy::default(),
            sweep_lock: Mutex::new(()),
            last_health: Mutex::new(HashMap::new()),
            last_report: RwLock::new(None),
            sweeps_completed: AtomicU64::new(0),
        }
    }

    pub fn with_policies(mut self, alert_policy: AlertPolicy, overlap_policy: OverlapPolicy) -> Self {
        self.alert_policy = alert_policy;
        self.overlap_policy = overlap_policy;
        self
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps_completed.load(Ordering::Relaxed)
    }

    pub async fn last_report(&self) -> Option<SweepReport> {
        self.last_report.read().await.clone()
    }

    /// Probes every target once and alerts on failures.
    ///
    /// Only one sweep runs at a time. Timer ticks that collide with an in-flight
    /// sweep wait or are dropped depending on the overlap policy; manual and
    /// startup sweeps always wait.
    pub async fn sweep(&self, trigger: SweepTrigger) -> SweepReport {
        let _guard = match (trigger, self.overlap_policy) {
            (SweepTrigger::Timer, OverlapPolicy::Skip) => match self.sweep_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(%trigger, "sweep already in flight, dropping tick");
                    return SweepReport::skipped(trigger);
                }
            },
            _ => self.sweep_lock.lock().await,
        };

        let started_at = Utc::now();
        let start = Instant::now();
        info!(%trigger, targets = self.targets.len(), "Checking services...");

        let mut tasks = FuturesUnordered::new();
        for (index, target) in self.targets.iter().enumerate() {
            tasks.push(async move {
                let (result, alerted) = self.check_target(target).await;
                (index, result, alerted)
            });
        }

        let mut indexed = Vec::with_capacity(self.targets.len());
        let mut alerts_sent = 0;
        while let Some((index, result, alerted)) = tasks.next().await {
            if alerted {
                alerts_sent += 1;
            }
            indexed.push((index, result));
        }
        drop(tasks);
        indexed.sort_by_key(|(index, _)| *index);

        let report = SweepReport {
            trigger,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            results: indexed.into_iter().map(|(_, result)| result).collect(),
            alerts_sent,
            skipped: false,
        };

        info!(
            %trigger,
            checked = report.results.len(),
            unhealthy = report.unhealthy_count(),
            alerts = report.alerts_sent,
            "Sweep completed in {:.2}s",
            report.duration_ms as f64 / 1000.0
        );

        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// Probes one target and returns whether an alert reached the operator.
    async fn check_target(&self, target: &Target) -> (ProbeResult, bool) {
        let result = self.prober.check(target).await;
        log_result(&result);

        let healthy = result.outcome.is_healthy();
        let delivered = match self.alert_for(&result).await {
            Some(alert) => self.notifier.alert(&alert).await,
            None => {
                self.commit_health(target, healthy).await;
                return (result, false);
            }
        };
        // An undelivered transition stays pending so the next sweep retries it.
        if delivered {
            self.commit_health(target, healthy).await;
        }
        (result, delivered)
    }

    async fn alert_for(&self, result: &ProbeResult) -> Option<AlertMessage> {
        match self.alert_policy {
            AlertPolicy::EverySweep => AlertMessage::from_result(result),
            AlertPolicy::OnTransition => {
                let healthy = result.outcome.is_healthy();
                let previous = self.last_health.lock().await.get(&result.target.name).copied();
                // Unknown counts as healthy so a target that starts out down still alerts.
                match (previous.unwrap_or(true), healthy) {
                    (true, false) => AlertMessage::from_result(result),
                    (false, true) => Some(AlertMessage::recovered(&result.target)),
                    _ => None,
                }
            }
        }
    }

    async fn commit_health(&self, target: &Target, healthy: bool) {
        if self.alert_policy == AlertPolicy::OnTransition {
            self.last_health.lock().await.insert(target.name.clone(), healthy);
        }
    }
}

fn log_result(result: &ProbeResult) {
    let name = &result.target.name;
    let url = &result.target.url;
    match &result.outcome {
        ProbeOutcome::Healthy => {
            info!(target_name = %name, %url, latency_ms = ?result.latency_ms, "{} is up", name)
        }
        ProbeOutcome::UnexpectedStatus { code } => {
            warn!(target_name = %name, %url, code, "{} responded with {}", name, code)
        }
        ProbeOutcome::Unreachable { kind, detail } => {
            error!(target_name = %name, %url, ?kind, error = %detail, "{} is not responding", name)
        }
    }
}
