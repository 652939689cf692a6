//! Domain types for the contract monitor.
//!
//! Probe results and comparison results are transient: they are produced
//! once per tick, folded into per-endpoint health, and dropped. Alerts and
//! health states are what survive into reports.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Endpoints ──────────────────────────────────────────────────────

/// A critical endpoint probed on both environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Request path relative to the environment base URL, e.g. `/health`.
    pub path: String,
    /// Status codes that mean "endpoint alive" (200/401/403 for auth-gated routes).
    #[serde(default = "default_acceptable_status")]
    pub acceptable_status: BTreeSet<u16>,
    /// Human-readable label used in alerts and reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_acceptable_status() -> BTreeSet<u16> {
    BTreeSet::from([200])
}

impl EndpointSpec {
    pub fn new(path: &str, acceptable_status: impl IntoIterator<Item = u16>) -> Self {
        Self {
            path: path.to_string(),
            acceptable_status: acceptable_status.into_iter().collect(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// The label if set, otherwise the path.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.path)
    }

    /// Whether a response status counts as the endpoint being alive.
    pub fn accepts(&self, status: u16) -> bool {
        self.acceptable_status.contains(&status)
    }
}

/// Which side of the comparison a probe was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// The contract baseline (e.g. production).
    Reference,
    /// The environment validated against the baseline (e.g. staging).
    Candidate,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("reference"),
            Self::Candidate => f.write_str("candidate"),
        }
    }
}

// ── Body shape ─────────────────────────────────────────────────────

/// Structural classification of a response payload.
///
/// Values are ignored; only the top-level kind and, for objects, the key
/// set take part in compatibility checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "keys", rename_all = "snake_case")]
pub enum BodyShape {
    Scalar,
    Array,
    Object(BTreeSet<String>),
}

impl BodyShape {
    /// Classify a decoded JSON value.
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self::Object(map.keys().cloned().collect()),
            serde_json::Value::Array(_) => Self::Array,
            _ => Self::Scalar,
        }
    }

    /// Classify a raw response body. Anything that is not JSON is a scalar.
    pub fn from_bytes(body: &[u8]) -> Self {
        serde_json::from_slice::<serde_json::Value>(body)
            .map(|value| Self::of(&value))
            .unwrap_or(Self::Scalar)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Array => "array",
            Self::Object(_) => "object",
        }
    }
}

// ── Probes and comparisons ─────────────────────────────────────────

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A response arrived with an acceptable status.
    Success { status: u16, shape: BodyShape },
    /// Network failure, timeout, or an unacceptable status.
    Failure { reason: String },
}

/// Result of probing one endpoint on one environment.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub endpoint: EndpointSpec,
    pub environment: Environment,
    pub outcome: ProbeOutcome,
    pub latency: Duration,
}

impl ProbeResult {
    pub fn success(
        endpoint: &EndpointSpec,
        environment: Environment,
        status: u16,
        shape: BodyShape,
        latency: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.clone(),
            environment,
            outcome: ProbeOutcome::Success { status, shape },
            latency,
        }
    }

    pub fn failure(
        endpoint: &EndpointSpec,
        environment: Environment,
        reason: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.clone(),
            environment,
            outcome: ProbeOutcome::Failure {
                reason: reason.into(),
            },
            latency,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Success { .. })
    }
}

/// Why a comparison came out incompatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// One or both environments did not answer acceptably.
    Availability,
    /// Both answered, with different status codes.
    StatusMismatch,
    /// Same status, but the candidate payload lost keys or changed kind.
    ShapeRegression,
}

/// Reference vs. candidate verdict for one endpoint in one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    pub endpoint: EndpointSpec,
    pub compatible: bool,
    pub reasons: Vec<String>,
    /// `None` when compatible.
    pub kind: Option<DriftKind>,
}

impl ComparisonResult {
    pub fn compatible(endpoint: &EndpointSpec) -> Self {
        Self {
            endpoint: endpoint.clone(),
            compatible: true,
            reasons: Vec::new(),
            kind: None,
        }
    }

    pub fn incompatible(endpoint: &EndpointSpec, kind: DriftKind, reasons: Vec<String>) -> Self {
        Self {
            endpoint: endpoint.clone(),
            compatible: false,
            reasons,
            kind: Some(kind),
        }
    }
}

// ── Health and alerts ──────────────────────────────────────────────

/// Per-endpoint health state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Healthy,
    /// Failing, but below the alert threshold.
    Degraded,
    /// Failing at or above the alert threshold.
    Alerting,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded => f.write_str("degraded"),
            Self::Alerting => f.write_str("alerting"),
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// An entry in the append-only alert log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Endpoint path, or `monitor` for alerts about the monitor itself.
    pub endpoint: String,
    pub message: String,
}
