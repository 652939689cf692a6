//! driftwatch-core — shared types for the driftwatch contract monitor.
//!
//! Holds the data model that flows between the prober, comparator, failure
//! tracker and report aggregator, plus the static endpoint registry and the
//! `driftwatch.toml` configuration parser.
//!
//! # Architecture
//!
//! ```text
//! MonitorConfig (driftwatch.toml + CLI overrides)
//!   ├── settings() → MonitorSettings (validated URLs, durations, limits)
//!   └── registry() → EndpointRegistry (ordered, non-empty EndpointSpec list)
//! ```
//!
//! Every configuration problem surfaces as a [`ConfigError`] before the
//! monitor starts; nothing in this crate is consulted again once the loop
//! is running.

pub mod config;
pub mod error;
pub mod registry;
pub mod types;
pub mod url;

pub use config::{MonitorConfig, MonitorSection, MonitorSettings, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use registry::EndpointRegistry;
pub use types::*;
pub use url::BaseUrl;
