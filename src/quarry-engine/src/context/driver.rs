//! Driver context and runtime configuration.
//!
//! A driver context lives for one pipeline execution. It carries the
//! settings operators are created with and the resources they share: the
//! memory manager, the metrics sink and the cancellation signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common_config::{AggregationConfig, ExecutionConfig, PageConfig};
use tokio::sync::watch;

use super::OperatorContext;
use crate::memory::{MemoryManager, MemoryReservation, TrackingMemoryManager};
use crate::metrics::MetricsSink;

// ============================================================================
// Runtime Configuration
// ============================================================================

/// Runtime configuration for one pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Pipeline memory limit in bytes (`None` = accounting only).
    pub memory_limit: Option<usize>,
    /// Page builder thresholds.
    pub page: PageConfig,
    /// Hash aggregation settings.
    pub aggregation: AggregationConfig,
    /// Report operator stats to the metrics sink.
    pub collect_metrics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for RuntimeConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            memory_limit: config.memory_limit,
            page: config.page,
            aggregation: config.aggregation,
            collect_metrics: true,
        }
    }
}

impl RuntimeConfig {
    /// Set the pipeline memory limit.
    #[must_use]
    pub const fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }

    /// Set the page builder thresholds.
    #[must_use]
    pub const fn with_page_thresholds(mut self, max_rows: usize, max_bytes: usize) -> Self {
        self.page = PageConfig {
            max_rows,
            max_bytes,
        };
        self
    }

    /// Set the per-aggregation memory budget.
    #[must_use]
    pub const fn with_aggregation_budget(mut self, max_memory_bytes: usize) -> Self {
        self.aggregation.max_memory_bytes = Some(max_memory_bytes);
        self
    }

    /// Set the expected number of aggregation groups.
    #[must_use]
    pub const fn with_expected_groups(mut self, expected_groups: usize) -> Self {
        self.aggregation.expected_groups = expected_groups;
        self
    }

    /// Enable or disable metrics collection.
    #[must_use]
    pub const fn with_metrics(mut self, enabled: bool) -> Self {
        self.collect_metrics = enabled;
        self
    }
}

// ============================================================================
// Driver Context
// ============================================================================

/// Resources shared by the operators of one driver.
#[derive(Debug)]
pub struct DriverContext {
    config: RuntimeConfig,
    memory: Arc<dyn MemoryManager>,
    metrics: Option<MetricsSink>,
    cancel_rx: watch::Receiver<bool>,
    next_operator_id: AtomicUsize,
}

impl DriverContext {
    /// Create a context for `config`, with a tracking memory manager
    /// enforcing the configured limit and a fresh metrics sink.
    pub fn new(config: RuntimeConfig) -> Self {
        let (_, cancel_rx) = watch::channel(false);
        let metrics = config.collect_metrics.then(MetricsSink::new);
        Self {
            memory: Arc::new(TrackingMemoryManager::new(config.memory_limit)),
            config,
            metrics,
            cancel_rx,
            next_operator_id: AtomicUsize::new(0),
        }
    }

    /// Share a memory manager with other drivers.
    #[must_use]
    pub fn with_memory(mut self, memory: Arc<dyn MemoryManager>) -> Self {
        self.memory = memory;
        self
    }

    /// Report to a shared metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Disable metrics collection.
    #[must_use]
    pub fn without_metrics(mut self) -> Self {
        self.metrics = None;
        self
    }

    /// Observe a cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = cancel_rx;
        self
    }

    /// Get the runtime configuration.
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the memory manager.
    pub fn memory_manager(&self) -> Arc<dyn MemoryManager> {
        Arc::clone(&self.memory)
    }

    /// Get the metrics sink (if enabled).
    pub const fn metrics(&self) -> Option<&MetricsSink> {
        self.metrics.as_ref()
    }

    /// Check if the owner asked the driver to stop.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Hand out the context for the next operator of the chain. Operator
    /// ids follow creation order.
    pub fn add_operator_context(&self, operator_type: &'static str) -> OperatorContext {
        let operator_id = self.next_operator_id.fetch_add(1, Ordering::Relaxed);
        OperatorContext::new(
            operator_id,
            operator_type,
            MemoryReservation::new(self.memory_manager()),
        )
    }
}

impl Default for DriverContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

// ============================================================================
// Cancellation Handle
// ============================================================================

/// Handle for cancelling a running driver from outside it.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Create a new cancellation handle and receiver.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel_tx: tx }, rx)
    }

    /// Cancel every driver observing this handle.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Another receiver for a driver created later.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new().0
    }
}
