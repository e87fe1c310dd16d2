//! Driver run results.

use std::fmt::Write;
use std::time::Duration;

use arrow::record_batch::RecordBatch;

use common_error::QuarryResult;
use quarry_core::{Page, TypeDescriptor, Value};

use crate::metrics::OperatorStats;

/// Everything a completed driver produced.
#[derive(Debug, Clone)]
pub struct DriverResult {
    /// Output pages in emission order.
    pub pages: Vec<Page>,
    /// Types of the output pages.
    pub types: TypeDescriptor,
    /// Per-operator accounting, head first.
    pub stats: Vec<OperatorStats>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl DriverResult {
    /// Create a new driver result.
    pub const fn new(
        pages: Vec<Page>,
        types: TypeDescriptor,
        stats: Vec<OperatorStats>,
        elapsed: Duration,
    ) -> Self {
        Self {
            pages,
            types,
            stats,
            elapsed,
        }
    }

    /// Get total row count.
    pub fn total_rows(&self) -> usize {
        self.pages.iter().map(Page::position_count).sum()
    }

    /// Get number of pages.
    pub const fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Check if no rows were produced.
    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }

    /// All output rows, page after page.
    pub fn rows(&self) -> QuarryResult<Vec<Vec<Value>>> {
        let mut rows = Vec::with_capacity(self.total_rows());
        for page in &self.pages {
            rows.extend(page.rows()?);
        }
        Ok(rows)
    }

    /// Convert every page to an Arrow record batch.
    pub fn to_record_batches(&self) -> QuarryResult<Vec<RecordBatch>> {
        self.pages.iter().map(Page::to_record_batch).collect()
    }

    /// Format timing and per-operator stats.
    pub fn explain_analyze(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Execution Time: {:?}", self.elapsed);
        let _ = writeln!(output, "Total Rows: {}", self.total_rows());
        let _ = writeln!(output, "Pages: {}", self.num_pages());
        output.push_str("\nOperator Stats:\n");
        for stats in &self.stats {
            let _ = writeln!(output, "  {}: {stats}", stats.label());
        }
        output
    }
}
