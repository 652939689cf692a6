//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that prevent the monitor from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("endpoint registry is empty: at least one [[endpoints]] entry is required")]
    EmptyRegistry,

    #[error("invalid endpoint {path:?}: {reason}")]
    InvalidEndpoint { path: String, reason: String },

    #[error("duplicate endpoint {0:?}")]
    DuplicateEndpoint(String),

    #[error("missing {0}: set it in the config file or on the command line")]
    Missing(&'static str),

    #[error("invalid {field} {url:?}: {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("invalid duration for {field}: {value:?} (expected e.g. \"500ms\", \"30s\", \"2m\")")]
    InvalidDuration { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
