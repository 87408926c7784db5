//! Controller configuration and validation.
//!
//! # Design
//! - Plain serde model with defaults for every field so partial documents work.
//! - Validation is explicit and returns typed errors instead of clamping.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::FailurePolicy;
use crate::error::ConfigError;
use crate::query::DEFAULT_PAGE_SIZE;

/// Default quiet period for search input, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// Default minimum visible loading duration, in milliseconds.
pub const DEFAULT_MIN_LOADING_MS: u64 = 250;
/// Default upper bound for page sizes accepted from locations.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 500;
/// Default namespace for persisted preferences.
pub const DEFAULT_STORAGE_NAMESPACE: &str = "pagewise";
/// Default buffer for the controller event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Tunables for a list controller instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Quiet period before search input commits.
    pub debounce_ms: u64,
    /// Minimum time a fetch stays in a loading state.
    pub min_loading_ms: u64,
    /// Page size used when the location does not carry one.
    pub default_page_size: u32,
    /// Largest page size accepted from locations and callers.
    pub max_page_size: u32,
    /// Behaviour of the visible page when a fetch fails.
    pub failure_policy: FailurePolicy,
    /// Prefix for persisted preference keys.
    pub storage_namespace: String,
    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            min_loading_ms: DEFAULT_MIN_LOADING_MS,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            failure_policy: FailurePolicy::default(),
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for unknown fields or wrong types, or any
    /// error reported by [`ControllerConfig::validate`].
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value.clone())
            .map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] or [`ConfigError::Empty`] describing
    /// the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "default_page_size",
                constraint: "must be greater than zero",
            });
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_page_size",
                constraint: "must be greater than zero",
            });
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::OutOfRange {
                field: "default_page_size",
                constraint: "must not exceed max_page_size",
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                field: "event_capacity",
                constraint: "must be greater than zero",
            });
        }
        if self.storage_namespace.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "storage_namespace",
            });
        }
        Ok(())
    }

    /// Quiet period as a [`Duration`].
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Minimum loading duration as a [`Duration`].
    #[must_use]
    pub const fn min_loading(&self) -> Duration {
        Duration::from_millis(self.min_loading_ms)
    }

    /// Whether `page_size` is accepted.
    #[must_use]
    pub const fn accepts_page_size(&self, page_size: u32) -> bool {
        page_size >= 1 && page_size <= self.max_page_size
    }
}
