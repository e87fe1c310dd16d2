//! Pipeline-wide memory accounting.

mod manager;

pub use manager::{MemoryManager, MemoryReservation, NoopMemoryManager, TrackingMemoryManager};
