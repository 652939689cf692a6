//! Endpoint registry — the fixed list of critical endpoints.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::EndpointSpec;

/// Ordered, non-empty set of endpoints, fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointSpec>,
}

impl EndpointRegistry {
    /// Build a registry, rejecting an empty list, malformed paths,
    /// empty status sets, and duplicate paths.
    pub fn new(endpoints: Vec<EndpointSpec>) -> ConfigResult<Self> {
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut seen = HashSet::new();
        for endpoint in &endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(ConfigError::InvalidEndpoint {
                    path: endpoint.path.clone(),
                    reason: "path must start with '/'".to_string(),
                });
            }
            if endpoint.acceptable_status.is_empty() {
                return Err(ConfigError::InvalidEndpoint {
                    path: endpoint.path.clone(),
                    reason: "acceptable_status must list at least one status code".to_string(),
                });
            }
            if let Some(bad) = endpoint
                .acceptable_status
                .iter()
                .find(|code| !(100..=599).contains(*code))
            {
                return Err(ConfigError::InvalidEndpoint {
                    path: endpoint.path.clone(),
                    reason: format!("{bad} is not an HTTP status code"),
                });
            }
            if !seen.insert(endpoint.path.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(endpoint.path.clone()));
            }
        }

        Ok(Self { endpoints })
    }

    /// Endpoints in configuration order.
    pub fn list(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
