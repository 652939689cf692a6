//! Alert dispatcher — append-only alert log with JSON-lines write-through.
//!
//! Delivery to chat or email is left to whatever tails the log file.
//! Consumers that need deduplication should key on (endpoint, timestamp).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use driftwatch_core::{Alert, Severity};

use crate::error::{PersistError, ensure_parent};

/// Alert totals by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub critical: usize,
    pub warning: usize,
}

/// Owns the alert log for the lifetime of a monitoring run.
#[derive(Debug, Default)]
pub struct AlertDispatcher {
    log: Vec<Alert>,
    log_path: Option<PathBuf>,
}

impl AlertDispatcher {
    /// Create a dispatcher. With `log_path` set, every alert is also
    /// appended to that file as one JSON object per line.
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self {
            log: Vec::new(),
            log_path,
        }
    }

    /// Append an alert and write it through to the log file.
    ///
    /// A failed write is logged and otherwise ignored.
    pub fn raise(
        &mut self,
        endpoint: &str,
        severity: Severity,
        message: impl Into<String>,
    ) -> &Alert {
        let alert = Alert {
            timestamp: Utc::now(),
            severity,
            endpoint: endpoint.to_string(),
            message: message.into(),
        };

        match severity {
            Severity::Warning => warn!(%endpoint, message = %alert.message, "alert raised"),
            Severity::Critical => {
                error!(%endpoint, message = %alert.message, "critical alert raised")
            }
        }

        if let Some(path) = &self.log_path {
            if let Err(e) = append_json_line(path, &alert) {
                error!(path = ?path, error = %e, "failed to persist alert, monitoring continues");
            }
        }

        self.log.push(alert);
        &self.log[self.log.len() - 1]
    }

    /// All alerts raised so far, oldest first.
    pub fn alerts(&self) -> &[Alert] {
        &self.log
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.log.iter().filter(|a| a.severity == severity).count()
    }

    pub fn counts(&self) -> AlertCounts {
        AlertCounts {
            critical: self.count(Severity::Critical),
            warning: self.count(Severity::Warning),
        }
    }
}

fn append_json_line(path: &Path, alert: &Alert) -> Result<(), PersistError> {
    ensure_parent(path)?;
    let mut line = serde_json::to_string(alert)?;
    line.push('\n');

    let write_err = |source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_err)?;
    file.write_all(line.as_bytes()).map_err(write_err)
}
