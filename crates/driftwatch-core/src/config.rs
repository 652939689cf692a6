//! driftwatch.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::registry::EndpointRegistry;
use crate::types::EndpointSpec;
use crate::url::BaseUrl;

pub const DEFAULT_INTERVAL: &str = "30s";
pub const DEFAULT_TIMEOUT: &str = "10s";
pub const DEFAULT_ALERT_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_CRITICAL_ALERTS: u32 = 10;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_url: Option<String>,
    pub interval: String,
    pub timeout: String,
    pub alert_threshold: u32,
    pub max_critical_alerts: u32,
    pub max_concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_log: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            reference_url: None,
            candidate_url: None,
            interval: DEFAULT_INTERVAL.to_string(),
            timeout: DEFAULT_TIMEOUT.to_string(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            max_critical_alerts: DEFAULT_MAX_CRITICAL_ALERTS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            alert_log: None,
            report_path: None,
        }
    }
}

/// Validated runtime settings derived from a [`MonitorConfig`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub reference_url: BaseUrl,
    pub candidate_url: BaseUrl,
    /// Time between tick starts. A late tick is deferred, never overlapped.
    pub interval: Duration,
    /// Per-probe timeout.
    pub timeout: Duration,
    /// Consecutive failures before an endpoint enters `Alerting`.
    pub alert_threshold: u32,
    /// Critical alerts after which the monitor stops itself.
    pub max_critical_alerts: u32,
    /// Probes in flight at once, across all endpoints of a tick.
    pub max_concurrency: usize,
    pub alert_log: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(?path, endpoints = config.endpoints.len(), "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check everything needed to start the monitor.
    pub fn validate(&self) -> ConfigResult<()> {
        self.settings()?;
        self.registry()?;
        Ok(())
    }

    pub fn registry(&self) -> ConfigResult<EndpointRegistry> {
        EndpointRegistry::new(self.endpoints.clone())
    }

    pub fn settings(&self) -> ConfigResult<MonitorSettings> {
        let m = &self.monitor;

        let reference_url = m
            .reference_url
            .as_deref()
            .ok_or(ConfigError::Missing("reference_url"))?;
        let candidate_url = m
            .candidate_url
            .as_deref()
            .ok_or(ConfigError::Missing("candidate_url"))?;

        let interval = positive_duration("interval", &m.interval)?;
        let timeout = positive_duration("timeout", &m.timeout)?;

        if m.alert_threshold == 0 {
            return Err(ConfigError::Zero("alert_threshold"));
        }
        if m.max_critical_alerts == 0 {
            return Err(ConfigError::Zero("max_critical_alerts"));
        }
        if m.max_concurrency == 0 {
            return Err(ConfigError::Zero("max_concurrency"));
        }

        Ok(MonitorSettings {
            reference_url: BaseUrl::parse("reference_url", reference_url)?,
            candidate_url: BaseUrl::parse("candidate_url", candidate_url)?,
            interval,
            timeout,
            alert_threshold: m.alert_threshold,
            max_critical_alerts: m.max_critical_alerts,
            max_concurrency: m.max_concurrency,
            alert_log: m.alert_log.clone(),
            report_path: m.report_path.clone(),
        })
    }

    /// Scaffold a starter driftwatch.toml covering typical critical routes.
    pub fn scaffold() -> Self {
        let auth_gated = [200, 401, 403];
        MonitorConfig {
            monitor: MonitorSection {
                reference_url: Some("http://localhost:4600".to_string()),
                candidate_url: Some("http://localhost:4650".to_string()),
                alert_log: Some(PathBuf::from("driftwatch-alerts.jsonl")),
                report_path: Some(PathBuf::from("driftwatch-report.json")),
                ..MonitorSection::default()
            },
            endpoints: vec![
                EndpointSpec::new("/health", [200]).with_name("Health"),
                EndpointSpec::new("/api/v1/properties", auth_gated).with_name("Properties"),
                EndpointSpec::new("/api/v1/units", auth_gated).with_name("Units"),
                EndpointSpec::new("/api/v1/leases", auth_gated).with_name("Leases"),
                EndpointSpec::new("/api/v1/tenants", auth_gated).with_name("Tenants"),
                EndpointSpec::new("/api/v1/maintenance", auth_gated).with_name("Maintenance"),
            ],
        }
    }
}

fn positive_duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let duration = parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })?;
    if duration.is_zero() {
        return Err(ConfigError::Zero(field));
    }
    Ok(duration)
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
