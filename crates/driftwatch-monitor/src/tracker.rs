//! Failure tracker — per-endpoint health state machine.
//!
//! ```text
//! Healthy ──fail──▶ Degraded ──fail × threshold──▶ Alerting
//!    ▲                 │                              │
//!    └─────compatible──┴──────────compatible──────────┘
//! ```
//!
//! Alerts are edge-triggered: only the step into `Alerting` is reported as
//! [`Transition::EnteredAlerting`]. Further failures while already alerting
//! are `Unchanged`.

use chrono::{DateTime, Utc};
use tracing::debug;

use driftwatch_core::{ComparisonResult, DriftKind, HealthState};

/// What a single `record` call did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State did not change.
    Unchanged,
    /// First failure after being healthy. Raises a Warning.
    Degraded,
    /// Crossed the alert threshold. Raises a Critical alert.
    EnteredAlerting,
    /// Compatible again after Degraded or Alerting.
    Recovered,
}

/// Health of one endpoint, owned and mutated only by the monitoring loop.
#[derive(Debug, Clone, Default)]
pub struct EndpointHealth {
    state: HealthState,
    consecutive_failures: u32,
    last_success_at: Option<DateTime<Utc>>,
    /// Reasons from the most recent incompatible result.
    last_reasons: Vec<String>,
    last_kind: Option<DriftKind>,
    total_checks: u64,
    total_failures: u64,
}

impl EndpointHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one comparison into the state machine.
    ///
    /// `alert_threshold` below 1 is treated as 1.
    pub fn record(
        &mut self,
        result: &ComparisonResult,
        now: DateTime<Utc>,
        alert_threshold: u32,
    ) -> Transition {
        let threshold = alert_threshold.max(1);
        let previous = self.state;
        self.total_checks += 1;

        if result.compatible {
            self.consecutive_failures = 0;
            self.state = HealthState::Healthy;
            self.last_success_at = Some(now);
            self.last_reasons.clear();
            self.last_kind = None;

            if previous == HealthState::Healthy {
                return Transition::Unchanged;
            }
            debug!(endpoint = %result.endpoint.path, from = %previous, "endpoint recovered");
            return Transition::Recovered;
        }

        self.total_failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_reasons.clone_from(&result.reasons);
        self.last_kind = result.kind;

        self.state = if self.consecutive_failures >= threshold {
            HealthState::Alerting
        } else {
            HealthState::Degraded
        };

        match (previous, self.state) {
            (HealthState::Alerting, _) => Transition::Unchanged,
            (_, HealthState::Alerting) => Transition::EnteredAlerting,
            (HealthState::Healthy, HealthState::Degraded) => Transition::Degraded,
            _ => Transition::Unchanged,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    pub fn last_reasons(&self) -> &[String] {
        &self.last_reasons
    }

    pub fn last_kind(&self) -> Option<DriftKind> {
        self.last_kind
    }

    pub fn total_checks(&self) -> u64 {
        self.total_checks
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }
}
