//! Configuration management for Quarry.
//!
//! Provides the execution settings a driver hands to its operators: memory
//! limits, page sizing and aggregation budgets.

use serde::{Deserialize, Serialize};

use common_error::QuarryResult;

/// Default row threshold at which a page builder reports itself full.
pub const DEFAULT_PAGE_MAX_ROWS: usize = 16 * 1024;

/// Default byte threshold at which a page builder reports itself full.
pub const DEFAULT_PAGE_MAX_BYTES: usize = 1024 * 1024;

/// Default number of groups an aggregation pre-sizes its hash table for.
pub const DEFAULT_EXPECTED_GROUPS: usize = 10_000;

/// Global Quarry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// Execution configuration.
    pub execution: ExecutionConfig,
}

impl QuarryConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> QuarryResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> QuarryResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Execution configuration for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Memory limit in bytes shared by every operator of a pipeline.
    /// `None` means accounting only.
    pub memory_limit: Option<usize>,
    /// Page sizing.
    pub page: PageConfig,
    /// Hash aggregation settings.
    pub aggregation: AggregationConfig,
}

/// Thresholds at which a page builder is considered full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Maximum rows per page.
    pub max_rows: usize,
    /// Maximum estimated bytes per page.
    pub max_bytes: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_PAGE_MAX_ROWS,
            max_bytes: DEFAULT_PAGE_MAX_BYTES,
        }
    }
}

/// Hash aggregation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Per-operator budget for accumulator memory. `None` means the
    /// operator is bounded only by the pipeline memory limit.
    pub max_memory_bytes: Option<usize>,
    /// Hash table capacity hint.
    pub expected_groups: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: None,
            expected_groups: DEFAULT_EXPECTED_GROUPS,
        }
    }
}
