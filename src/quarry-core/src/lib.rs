//! Columnar data model for the Quarry execution core.
//!
//! This crate provides the values operators exchange:
//! - `ColumnType`, `TypeDescriptor` and `Value` for the type system
//! - `Block`, `BlockCursor` and `BlockBuilder` for single columns
//! - `Page` and `PageBuilder` for row-aligned column sets
//! - `BlockIterable` and `ColumnSourceProvider` for stored columns

pub mod block;
pub mod page;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use block::{Block, BlockBuilder, BlockCursor};
pub use page::{Page, PageBuilder, PageBuilderState};
pub use source::{
    BlockIter, BlockIterable, ColumnSourceProvider, InMemoryBlockIterable, InMemoryColumnProvider,
};
pub use types::{ColumnType, TypeDescriptor, Value};
