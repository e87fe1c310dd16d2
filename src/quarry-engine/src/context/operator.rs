//! Per-operator accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use common_error::QuarryResult;
use quarry_core::Page;

use crate::memory::MemoryReservation;
use crate::metrics::OperatorStats;

/// Accounting owned by exactly one operator.
///
/// The driver records page counts and per-phase wall time as it calls the
/// operator; the operator itself reports its memory footprint. Counters are
/// atomics so recording only needs a shared reference.
#[derive(Debug)]
pub struct OperatorContext {
    operator_id: usize,
    operator_type: &'static str,
    input_rows: AtomicU64,
    input_pages: AtomicU64,
    output_rows: AtomicU64,
    output_pages: AtomicU64,
    add_input_nanos: AtomicU64,
    get_output_nanos: AtomicU64,
    finish_nanos: AtomicU64,
    reservation: MemoryReservation,
    peak_memory: usize,
}

impl OperatorContext {
    pub(crate) const fn new(
        operator_id: usize,
        operator_type: &'static str,
        reservation: MemoryReservation,
    ) -> Self {
        Self {
            operator_id,
            operator_type,
            input_rows: AtomicU64::new(0),
            input_pages: AtomicU64::new(0),
            output_rows: AtomicU64::new(0),
            output_pages: AtomicU64::new(0),
            add_input_nanos: AtomicU64::new(0),
            get_output_nanos: AtomicU64::new(0),
            finish_nanos: AtomicU64::new(0),
            reservation,
            peak_memory: 0,
        }
    }

    /// Position of the operator in its pipeline.
    pub const fn operator_id(&self) -> usize {
        self.operator_id
    }

    /// Operator kind.
    pub const fn operator_type(&self) -> &'static str {
        self.operator_type
    }

    /// Record a page of `rows` rows accepted by `add_input`.
    pub fn record_add_input(&self, rows: usize, elapsed: Duration) {
        self.input_rows.fetch_add(rows as u64, Ordering::Relaxed);
        self.input_pages.fetch_add(1, Ordering::Relaxed);
        add_duration(&self.add_input_nanos, elapsed);
    }

    /// Record one `get_output` call and the page it returned, if any.
    pub fn record_get_output(&self, page: Option<&Page>, elapsed: Duration) {
        if let Some(page) = page {
            self.output_rows
                .fetch_add(page.position_count() as u64, Ordering::Relaxed);
            self.output_pages.fetch_add(1, Ordering::Relaxed);
        }
        add_duration(&self.get_output_nanos, elapsed);
    }

    /// Record one `finish` call.
    pub fn record_finish(&self, elapsed: Duration) {
        add_duration(&self.finish_nanos, elapsed);
    }

    /// Resize this operator's reservation to `bytes`, charging the
    /// pipeline memory manager. On failure the previous size is kept.
    pub fn set_memory_reservation(&mut self, bytes: usize) -> QuarryResult<()> {
        self.reservation.try_resize(bytes)?;
        self.peak_memory = self.peak_memory.max(bytes);
        Ok(())
    }

    /// Return the whole reservation to the memory manager.
    pub fn free_memory(&mut self) {
        self.reservation.free();
    }

    /// Bytes currently reserved.
    pub const fn memory_reservation(&self) -> usize {
        self.reservation.size()
    }

    /// Highest reservation so far.
    pub const fn peak_memory_reservation(&self) -> usize {
        self.peak_memory
    }

    /// Snapshot of the accounting so far.
    pub fn stats(&self) -> OperatorStats {
        OperatorStats {
            operator_id: self.operator_id,
            operator_type: self.operator_type.to_string(),
            input_rows: self.input_rows.load(Ordering::Relaxed),
            input_pages: self.input_pages.load(Ordering::Relaxed),
            output_rows: self.output_rows.load(Ordering::Relaxed),
            output_pages: self.output_pages.load(Ordering::Relaxed),
            add_input_time: load_duration(&self.add_input_nanos),
            get_output_time: load_duration(&self.get_output_nanos),
            finish_time: load_duration(&self.finish_nanos),
            memory_reservation: self.reservation.size(),
            peak_memory_reservation: self.peak_memory,
        }
    }
}

fn add_duration(counter: &AtomicU64, elapsed: Duration) {
    let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    counter.fetch_add(nanos, Ordering::Relaxed);
}

fn load_duration(counter: &AtomicU64) -> Duration {
    Duration::from_nanos(counter.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use quarry_core::Block;

    use crate::context::DriverContext;

    use super::*;

    #[test]
    fn test_records_pages_and_time() {
        let ctx = DriverContext::default();
        let op = ctx.add_operator_context("FilterProjectOperator");
        let page = Page::try_new(vec![Block::from_i64s([Some(1), Some(2)])]).unwrap();

        op.record_add_input(page.position_count(), Duration::from_millis(2));
        op.record_add_input(page.position_count(), Duration::from_millis(3));
        op.record_get_output(None, Duration::from_millis(1));
        op.record_get_output(Some(&page), Duration::from_millis(1));
        op.record_finish(Duration::from_millis(4));

        let stats = op.stats();
        assert_eq!(stats.input_rows, 4);
        assert_eq!(stats.input_pages, 2);
        assert_eq!(stats.output_rows, 2);
        assert_eq!(stats.output_pages, 1);
        assert_eq!(stats.add_input_time, Duration::from_millis(5));
        assert_eq!(stats.wall_time(), Duration::from_millis(11));
    }

    #[test]
    fn test_peak_memory() {
        let ctx = DriverContext::default();
        let mut op = ctx.add_operator_context("HashAggregationOperator");
        op.set_memory_reservation(300).unwrap();
        op.set_memory_reservation(100).unwrap();
        assert_eq!(op.memory_reservation(), 100);
        assert_eq!(op.peak_memory_reservation(), 300);

        op.free_memory();
        assert_eq!(op.stats().memory_reservation, 0);
        assert_eq!(op.stats().peak_memory_reservation, 300);
        assert_eq!(ctx.memory_manager().used(), 0);
    }
}
