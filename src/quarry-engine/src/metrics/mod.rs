//! Per-operator statistics.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Immutable snapshot of one operator's accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStats {
    /// Position of the operator in its pipeline.
    pub operator_id: usize,
    /// Operator kind, e.g. `HashAggregationOperator`.
    pub operator_type: String,
    /// Rows accepted through `add_input`.
    pub input_rows: u64,
    /// Pages accepted through `add_input`.
    pub input_pages: u64,
    /// Rows returned from `get_output`.
    pub output_rows: u64,
    /// Pages returned from `get_output`.
    pub output_pages: u64,
    /// Wall time spent in `add_input`.
    pub add_input_time: Duration,
    /// Wall time spent in `get_output`.
    pub get_output_time: Duration,
    /// Wall time spent in `finish`.
    pub finish_time: Duration,
    /// Bytes reserved when the snapshot was taken.
    pub memory_reservation: usize,
    /// Highest reservation observed.
    pub peak_memory_reservation: usize,
}

impl OperatorStats {
    /// Key under which a sink stores these stats.
    pub fn label(&self) -> String {
        format!("{}:{}", self.operator_id, self.operator_type)
    }

    /// Total wall time across all phases.
    pub fn wall_time(&self) -> Duration {
        self.add_input_time + self.get_output_time + self.finish_time
    }

    /// Get selectivity (`output_rows` / `input_rows`).
    pub fn selectivity(&self) -> f64 {
        if self.input_rows == 0 {
            1.0
        } else {
            self.output_rows as f64 / self.input_rows as f64
        }
    }

    /// Fold another driver's stats for the same operator into these.
    pub fn merge(&mut self, other: &Self) {
        self.input_rows += other.input_rows;
        self.input_pages += other.input_pages;
        self.output_rows += other.output_rows;
        self.output_pages += other.output_pages;
        self.add_input_time += other.add_input_time;
        self.get_output_time += other.get_output_time;
        self.finish_time += other.finish_time;
        self.memory_reservation += other.memory_reservation;
        self.peak_memory_reservation = self
            .peak_memory_reservation
            .max(other.peak_memory_reservation);
    }
}

impl std::fmt::Display for OperatorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "input={} rows/{} pages, output={} rows/{} pages, time={:?}, peak memory={}B",
            self.input_rows,
            self.input_pages,
            self.output_rows,
            self.output_pages,
            self.wall_time(),
            self.peak_memory_reservation
        )
    }
}

/// Shared collector that drivers report operator stats to.
///
/// Cloning is cheap; clones share the same storage. Several drivers of the
/// same pipeline merge into one entry per operator.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink {
    stats: Arc<RwLock<BTreeMap<String, OperatorStats>>>,
}

impl MetricsSink {
    /// Create a new metrics sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one operator's final stats, merging with earlier reports.
    pub fn record(&self, stats: &OperatorStats) {
        let mut guard = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(stats.label())
            .and_modify(|existing| existing.merge(stats))
            .or_insert_with(|| stats.clone());
    }

    /// Stats recorded under `label`.
    pub fn get(&self, label: &str) -> Option<OperatorStats> {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(label)
            .cloned()
    }

    /// All stats ordered by operator id.
    pub fn all(&self) -> Vec<OperatorStats> {
        let mut stats: Vec<OperatorStats> = self
            .stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        stats.sort_by_key(|s| s.operator_id);
        stats
    }

    /// Clear all stats.
    pub fn clear(&self) {
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Rows accepted across all operators.
    pub fn total_input_rows(&self) -> u64 {
        self.all().iter().map(|s| s.input_rows).sum()
    }

    /// Human-readable per-operator summary.
    pub fn format_summary(&self) -> String {
        let mut output = String::new();
        for stats in self.all() {
            let _ = writeln!(output, "{}: {stats}", stats.label());
        }
        if output.is_empty() {
            output.push_str("No stats collected.\n");
        }
        output
    }
}

/// Timer for measuring one operator call.
#[derive(Debug)]
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time without stopping.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop and return elapsed time.
    #[must_use]
    pub fn stop(self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for ExecutionTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(operator_id: usize, input_rows: u64, output_rows: u64) -> OperatorStats {
        OperatorStats {
            operator_id,
            operator_type: "FilterProjectOperator".to_string(),
            input_rows,
            output_rows,
            peak_memory_reservation: 10 * input_rows as usize,
            ..OperatorStats::default()
        }
    }

    #[test]
    fn test_selectivity() {
        assert!((stats(0, 1000, 500).selectivity() - 0.5).abs() < 0.001);
        assert!((stats(0, 0, 0).selectivity() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_sink_merges_drivers() {
        let sink = MetricsSink::new();
        sink.record(&stats(1, 100, 10));
        sink.record(&stats(1, 50, 5));
        sink.record(&stats(0, 7, 7));

        let merged = sink.get("1:FilterProjectOperator").unwrap();
        assert_eq!(merged.input_rows, 150);
        assert_eq!(merged.output_rows, 15);
        assert_eq!(merged.peak_memory_reservation, 1000);

        let ids: Vec<usize> = sink.all().iter().map(|s| s.operator_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(sink.total_input_rows(), 157);
    }

    #[test]
    fn test_stats_serde() {
        let original = stats(2, 3, 1);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: OperatorStats = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_format_summary() {
        let sink = MetricsSink::new();
        assert_eq!(sink.format_summary(), "No stats collected.\n");
        sink.record(&stats(0, 1, 1));
        assert!(sink.format_summary().starts_with("0:FilterProjectOperator: input=1 rows"));
        sink.clear();
        assert!(sink.all().is_empty());
    }

    #[test]
    fn test_execution_timer() {
        let timer = ExecutionTimer::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.stop() >= Duration::from_millis(10));
    }
}
