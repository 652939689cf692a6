//! Monitoring loop — ticks, bounded probe fan-out, and stop conditions.
//!
//! Each tick probes every endpoint on both environments concurrently,
//! waits for all probes to return, and only then folds the results into
//! per-endpoint health. The loop itself is the single writer of
//! [`MonitorState`], so no locking is involved.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use driftwatch_core::{
    BaseUrl, ComparisonResult, DriftKind, EndpointRegistry, EndpointSpec, Environment,
    MonitorSettings, ProbeResult, Severity,
};

use crate::alerts::AlertDispatcher;
use crate::comparator::compare;
use crate::prober::Prober;
use crate::report::MonitoringReport;
use crate::tracker::{EndpointHealth, Transition};

/// Endpoint name used for alerts about the monitor itself.
pub const MONITOR_ALERT_SOURCE: &str = "monitor";

/// Running totals across all ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub total_ticks: u64,
    pub total_checks: u64,
    pub total_probes: u64,
    pub total_failures: u64,
}

/// Everything the loop mutates. Owned by [`Monitor`]; never shared.
#[derive(Debug)]
pub struct MonitorState {
    registry: EndpointRegistry,
    /// Parallel to `registry.list()`.
    health: Vec<EndpointHealth>,
    alerts: AlertDispatcher,
    counters: Counters,
    started_at: DateTime<Utc>,
}

impl MonitorState {
    pub fn new(registry: EndpointRegistry, alerts: AlertDispatcher) -> Self {
        let health = registry.list().iter().map(|_| EndpointHealth::new()).collect();
        Self {
            registry,
            health,
            alerts,
            counters: Counters::default(),
            started_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Endpoints paired with their health, in registry order.
    pub fn endpoints(&self) -> impl Iterator<Item = (&EndpointSpec, &EndpointHealth)> {
        self.registry.list().iter().zip(&self.health)
    }

    pub fn health(&self, path: &str) -> Option<&EndpointHealth> {
        self.registry
            .list()
            .iter()
            .position(|e| e.path == path)
            .map(|i| &self.health[i])
    }

    pub fn alerts(&self) -> &AlertDispatcher {
        &self.alerts
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub passed: usize,
    pub failed: usize,
    pub alerts_raised: usize,
    pub elapsed: Duration,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator-requested shutdown.
    Shutdown,
    /// Critical alerts reached `max_critical_alerts`.
    CriticalCeiling,
    /// The configured tick limit was reached.
    TickLimit,
}

impl StopReason {
    /// Whether the process should exit with a failure status.
    pub fn is_failure(self) -> bool {
        self == Self::CriticalCeiling
    }
}

/// Final result of [`Monitor::run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub report: MonitoringReport,
}

/// The contract monitor.
pub struct Monitor<P> {
    settings: MonitorSettings,
    prober: Arc<P>,
    state: MonitorState,
    max_ticks: Option<u64>,
}

impl<P: Prober> Monitor<P> {
    /// Create a monitor. The alert log path comes from `settings`.
    pub fn new(settings: MonitorSettings, registry: EndpointRegistry, prober: P) -> Self {
        let alerts = AlertDispatcher::new(settings.alert_log.clone());
        Self {
            state: MonitorState::new(registry, alerts),
            settings,
            prober: Arc::new(prober),
            max_ticks: None,
        }
    }

    /// Stop after `max_ticks` ticks.
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> MonitoringReport {
        MonitoringReport::from_state(&self.state, Utc::now())
    }

    /// Run ticks until shutdown, the critical-alert ceiling, or the tick limit.
    ///
    /// Shutdown is only observed between ticks. A tick that overruns the
    /// interval delays the next one instead of overlapping it.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> RunOutcome {
        info!(
            endpoints = self.state.registry.len(),
            reference = %self.settings.reference_url,
            candidate = %self.settings.candidate_url,
            interval_ms = self.settings.interval.as_millis() as u64,
            alert_threshold = self.settings.alert_threshold,
            "contract monitor started"
        );

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            if *shutdown.borrow_and_update() {
                break StopReason::Shutdown;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        break StopReason::Shutdown;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            self.run_tick().await;

            if self.ceiling_reached() {
                self.halt();
                break StopReason::CriticalCeiling;
            }
            if self
                .max_ticks
                .is_some_and(|max| self.state.counters.total_ticks >= max)
            {
                break StopReason::TickLimit;
            }
        };

        let report = self.report();
        info!(
            ?reason,
            ticks = report.total_ticks,
            failures = report.total_failures,
            success_rate = report.success_rate_percent,
            critical_alerts = report.alert_counts.critical,
            "contract monitor stopped"
        );
        RunOutcome { reason, report }
    }

    /// Probe every endpoint once and fold the results into state.
    pub async fn run_tick(&mut self) -> TickSummary {
        let started = Instant::now();
        let tick = self.state.counters.total_ticks + 1;

        let results = self.probe_all().await;

        let now = Utc::now();
        let mut summary = TickSummary {
            tick,
            passed: 0,
            failed: 0,
            alerts_raised: 0,
            elapsed: Duration::ZERO,
        };
        for (index, result) in results.into_iter().enumerate() {
            self.apply(index, &result, now, &mut summary);
        }
        self.state.counters.total_ticks = tick;
        summary.elapsed = started.elapsed();

        info!(
            tick,
            passed = summary.passed,
            failed = summary.failed,
            alerts = summary.alerts_raised,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "tick complete"
        );
        summary
    }

    /// Fan out reference + candidate probes for every endpoint and join them.
    ///
    /// Results come back in registry order.
    async fn probe_all(&self) -> Vec<ComparisonResult> {
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, endpoint) in self.state.registry.list().iter().enumerate() {
            let prober = Arc::clone(&self.prober);
            let permits = Arc::clone(&permits);
            let endpoint = endpoint.clone();
            let reference_url = self.settings.reference_url.clone();
            let candidate_url = self.settings.candidate_url.clone();
            let timeout = self.settings.timeout;

            tasks.spawn(async move {
                let (reference, candidate) = tokio::join!(
                    probe_bounded(
                        &*prober,
                        &permits,
                        &endpoint,
                        Environment::Reference,
                        &reference_url,
                        timeout,
                    ),
                    probe_bounded(
                        &*prober,
                        &permits,
                        &endpoint,
                        Environment::Candidate,
                        &candidate_url,
                        timeout,
                    ),
                );
                (index, compare(&reference, &candidate))
            });
        }

        let mut slots: Vec<Option<ComparisonResult>> =
            (0..self.state.registry.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }

        slots
            .into_iter()
            .zip(self.state.registry.list())
            .map(|(slot, endpoint)| {
                slot.unwrap_or_else(|| {
                    ComparisonResult::incompatible(
                        endpoint,
                        DriftKind::Availability,
                        vec!["probe task failed".to_string()],
                    )
                })
            })
            .collect()
    }

    fn apply(
        &mut self,
        index: usize,
        result: &ComparisonResult,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) {
        let state = &mut self.state;
        state.counters.total_checks += 1;
        state.counters.total_probes += 2;

        let path = result.endpoint.path.as_str();
        let label = result.endpoint.label();
        if result.compatible {
            summary.passed += 1;
        } else {
            summary.failed += 1;
            state.counters.total_failures += 1;
            debug!(
                endpoint = %path,
                kind = ?result.kind,
                reasons = ?result.reasons,
                "contract drift"
            );
        }

        let health = &mut state.health[index];
        match health.record(result, now, self.settings.alert_threshold) {
            Transition::EnteredAlerting => {
                let message = format!(
                    "{label} incompatible for {} consecutive checks: {}",
                    health.consecutive_failures(),
                    result.reasons.join("; ")
                );
                state.alerts.raise(path, Severity::Critical, message);
                summary.alerts_raised += 1;
            }
            Transition::Degraded => {
                let message = format!("{label} degraded: {}", result.reasons.join("; "));
                state.alerts.raise(path, Severity::Warning, message);
                summary.alerts_raised += 1;
            }
            Transition::Recovered => {
                info!(endpoint = %path, "endpoint compatible again");
            }
            Transition::Unchanged => {}
        }
    }

    fn ceiling_reached(&self) -> bool {
        let critical = self.state.alerts.count(Severity::Critical);
        critical >= self.settings.max_critical_alerts as usize
    }

    /// Raise the final alert before the loop stops itself.
    fn halt(&mut self) {
        let critical = self.state.alerts.count(Severity::Critical);
        let message = format!(
            "monitoring stopped: {critical} critical alerts reached the limit of {}, manual investigation required",
            self.settings.max_critical_alerts
        );
        self.state
            .alerts
            .raise(MONITOR_ALERT_SOURCE, Severity::Critical, message);
    }
}

/// Run one probe while holding a concurrency permit.
async fn probe_bounded<P: Prober>(
    prober: &P,
    permits: &Semaphore,
    endpoint: &EndpointSpec,
    environment: Environment,
    base_url: &BaseUrl,
    timeout: Duration,
) -> ProbeResult {
    let Ok(_permit) = permits.acquire().await else {
        return ProbeResult::failure(endpoint, environment, "probe limiter closed", Duration::ZERO);
    };
    prober.probe(endpoint, environment, base_url, timeout).await
}
