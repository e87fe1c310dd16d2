//! Memory managers and reservations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common_error::{QuarryError, QuarryResult};

/// Shared memory accounting for every operator of a pipeline.
///
/// Managers only account; nothing spills. Operators never talk to a manager
/// directly, they hold a [`MemoryReservation`] through their operator
/// context.
pub trait MemoryManager: Send + Sync + std::fmt::Debug {
    /// Charge `bytes`, failing with `ResourceExhausted` past the limit.
    fn reserve(&self, bytes: usize) -> QuarryResult<()>;

    /// Return `bytes` previously charged.
    fn release(&self, bytes: usize);

    /// Bytes currently charged.
    fn used(&self) -> usize;

    /// The limit, `None` when unbounded.
    fn limit(&self) -> Option<usize>;

    /// Bytes still available before the limit.
    fn available(&self) -> usize {
        self.limit()
            .map_or(usize::MAX, |limit| limit.saturating_sub(self.used()))
    }
}

/// Manager that accepts every reservation and tracks nothing.
#[derive(Debug, Default)]
pub struct NoopMemoryManager;

impl NoopMemoryManager {
    /// Create a new no-op memory manager.
    pub const fn new() -> Self {
        Self
    }
}

impl MemoryManager for NoopMemoryManager {
    fn reserve(&self, _bytes: usize) -> QuarryResult<()> {
        Ok(())
    }

    fn release(&self, _bytes: usize) {}

    fn used(&self) -> usize {
        0
    }

    fn limit(&self) -> Option<usize> {
        None
    }
}

/// Atomic accounting with an optional limit and a high-water mark.
#[derive(Debug)]
pub struct TrackingMemoryManager {
    used: AtomicUsize,
    peak: AtomicUsize,
    limit: Option<usize>,
}

impl TrackingMemoryManager {
    /// Create a manager enforcing `limit` bytes when set.
    pub const fn new(limit: Option<usize>) -> Self {
        Self {
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            limit,
        }
    }

    /// Create a manager that only accounts.
    pub const fn unlimited() -> Self {
        Self::new(None)
    }

    /// Highest usage observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

impl Default for TrackingMemoryManager {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl MemoryManager for TrackingMemoryManager {
    fn reserve(&self, bytes: usize) -> QuarryResult<()> {
        if bytes == 0 {
            return Ok(());
        }

        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let new = current.saturating_add(bytes);
            if let Some(limit) = self.limit {
                if new > limit {
                    return Err(QuarryError::resource_exhausted(format!(
                        "pipeline memory limit exceeded: {current} + {bytes} > {limit} bytes"
                    )));
                }
            }
            match self
                .used
                .compare_exchange_weak(current, new, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.peak.fetch_max(new, Ordering::Relaxed);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        // saturating: a double release must not wrap
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// An operator's share of a [`MemoryManager`].
///
/// The reservation is resized to the operator's current estimate after
/// every unit of work and returns everything to the manager when dropped.
#[derive(Debug)]
pub struct MemoryReservation {
    manager: Arc<dyn MemoryManager>,
    bytes: usize,
}

impl MemoryReservation {
    /// An empty reservation against `manager`.
    pub fn new(manager: Arc<dyn MemoryManager>) -> Self {
        Self { manager, bytes: 0 }
    }

    /// Bytes currently held.
    pub const fn size(&self) -> usize {
        self.bytes
    }

    /// Resize to exactly `bytes`. On failure the previous size is kept.
    pub fn try_resize(&mut self, bytes: usize) -> QuarryResult<()> {
        if bytes > self.bytes {
            self.manager.reserve(bytes - self.bytes)?;
        } else {
            self.manager.release(self.bytes - bytes);
        }
        self.bytes = bytes;
        Ok(())
    }

    /// Grow by `additional` bytes.
    pub fn grow(&mut self, additional: usize) -> QuarryResult<()> {
        self.try_resize(self.bytes.saturating_add(additional))
    }

    /// Return everything to the manager.
    pub fn free(&mut self) {
        self.manager.release(self.bytes);
        self.bytes = 0;
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.free();
    }
}
