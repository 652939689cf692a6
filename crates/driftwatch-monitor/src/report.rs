//! Report aggregator — a serializable snapshot of a monitoring run.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use driftwatch_core::{DriftKind, HealthState};

use crate::alerts::AlertCounts;
use crate::error::{PersistError, ensure_parent};
use crate::scheduler::MonitorState;

/// Consecutive failures at which an endpoint gets its own recommendation.
const INVESTIGATE_AFTER_FAILURES: u32 = 3;

/// Overall success rate below which the candidate is flagged.
const MIN_HEALTHY_SUCCESS_RATE: f64 = 95.0;

/// Point-in-time view of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_drift: Option<DriftKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_reasons: Vec<String>,
    pub total_checks: u64,
    pub total_failures: u64,
}

/// Aggregate monitoring report, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub total_ticks: u64,
    /// Reference/candidate comparisons performed.
    pub total_checks: u64,
    /// Individual HTTP probes sent (two per check).
    pub total_probes: u64,
    /// Incompatible comparisons.
    pub total_failures: u64,
    pub success_rate_percent: f64,
    pub endpoints: BTreeMap<String, EndpointReport>,
    pub alert_counts: AlertCounts,
    pub recommendations: Vec<String>,
}

impl MonitoringReport {
    /// Build a report from the current monitor state. Pure read.
    pub fn from_state(state: &MonitorState, now: DateTime<Utc>) -> Self {
        let counters = state.counters();

        let endpoints: BTreeMap<String, EndpointReport> = state
            .endpoints()
            .map(|(spec, health)| {
                (
                    spec.path.clone(),
                    EndpointReport {
                        name: spec.name.clone(),
                        state: health.state(),
                        consecutive_failures: health.consecutive_failures(),
                        last_success_at: health.last_success_at(),
                        last_drift: health.last_kind(),
                        last_reasons: health.last_reasons().to_vec(),
                        total_checks: health.total_checks(),
                        total_failures: health.total_failures(),
                    },
                )
            })
            .collect();

        let success_rate_percent = success_rate(counters.total_checks, counters.total_failures);
        let recommendations = recommend(&endpoints, counters.total_checks, success_rate_percent);

        Self {
            timestamp: now,
            uptime_seconds: (now - state.started_at()).num_seconds().max(0) as u64,
            total_ticks: counters.total_ticks,
            total_checks: counters.total_checks,
            total_probes: counters.total_probes,
            total_failures: counters.total_failures,
            success_rate_percent,
            endpoints,
            alert_counts: state.alerts().counts(),
            recommendations,
        }
    }

    /// Write the report as pretty JSON, creating the parent directory.
    pub fn write_json(&self, path: &Path) -> Result<(), PersistError> {
        ensure_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Percentage of compatible checks, rounded to two decimals. 100 with no checks.
fn success_rate(total_checks: u64, total_failures: u64) -> f64 {
    if total_checks == 0 {
        return 100.0;
    }
    let passed = total_checks.saturating_sub(total_failures) as f64;
    (passed / total_checks as f64 * 10_000.0).round() / 100.0
}

fn recommend(
    endpoints: &BTreeMap<String, EndpointReport>,
    total_checks: u64,
    success_rate_percent: f64,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    for (path, endpoint) in endpoints {
        if endpoint.consecutive_failures >= INVESTIGATE_AFTER_FAILURES {
            recommendations.push(format!(
                "Investigate recent changes affecting {path} ({} consecutive failures)",
                endpoint.consecutive_failures
            ));
        }
    }

    for (path, endpoint) in endpoints {
        if endpoint.state == HealthState::Alerting {
            recommendations.push(format!(
                "Block candidate promotion until {path} is compatible again"
            ));
        }
    }

    if total_checks > 0 && success_rate_percent < MIN_HEALTHY_SUCCESS_RATE {
        recommendations.push(format!(
            "Overall success rate is {success_rate_percent:.2}% (below {MIN_HEALTHY_SUCCESS_RATE:.0}%), review the candidate deployment for contract drift"
        ));
    }

    if recommendations.is_empty() {
        recommendations.push("No contract drift detected".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(state: HealthState, consecutive_failures: u32) -> EndpointReport {
        EndpointReport {
            name: None,
            state,
            consecutive_failures,
            last_success_at: None,
            last_drift: None,
            last_reasons: Vec::new(),
            total_checks: 10,
            total_failures: u64::from(consecutive_failures),
        }
    }

    #[test]
    fn success_rate_edges() {
        assert_eq!(success_rate(0, 0), 100.0);
        assert_eq!(success_rate(4, 1), 75.0);
        assert_eq!(success_rate(3, 1), 66.67);
        assert_eq!(success_rate(5, 5), 0.0);
    }

    #[test]
    fn clean_run_recommends_nothing_special() {
        let endpoints =
            BTreeMap::from([("/health".to_string(), endpoint(HealthState::Healthy, 0))]);
        assert_eq!(
            recommend(&endpoints, 10, 100.0),
            vec!["No contract drift detected"]
        );
    }

    #[test]
    fn three_consecutive_failures_trigger_investigation() {
        let endpoints = BTreeMap::from([
            ("/health".to_string(), endpoint(HealthState::Healthy, 0)),
            ("/properties".to_string(), endpoint(HealthState::Degraded, 3)),
        ]);
        let recs = recommend(&endpoints, 100, 97.0);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("/properties"));
        assert!(recs[0].contains("3 consecutive failures"));
    }

    #[test]
    fn alerting_and_low_success_rate_are_flagged() {
        let endpoints =
            BTreeMap::from([("/properties".to_string(), endpoint(HealthState::Alerting, 5))]);
        let recs = recommend(&endpoints, 10, 50.0);
        assert!(recs.iter().any(|r| r.starts_with("Investigate")));
        assert!(recs.iter().any(|r| r.starts_with("Block candidate promotion")));
        assert!(recs.iter().any(|r| r.contains("50.00%")));
    }

    #[test]
    fn write_json_creates_parent_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        let report = MonitoringReport {
            timestamp: Utc::now(),
            uptime_seconds: 12,
            total_ticks: 2,
            total_checks: 4,
            total_probes: 8,
            total_failures: 1,
            success_rate_percent: 75.0,
            endpoints: BTreeMap::from([(
                "/health".to_string(),
                EndpointReport {
                    name: Some("Health".to_string()),
                    ..endpoint(HealthState::Degraded, 1)
                },
            )]),
            alert_counts: AlertCounts::default(),
            recommendations: vec!["No contract drift detected".to_string()],
        };

        report.write_json(&path).unwrap();
        let parsed: MonitoringReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, report);
    }
}
