//! Mutable single-column builders.

use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryBuilder, Float64Builder, Int64Builder};

use common_error::{QuarryError, QuarryResult};

use super::{Block, BlockCursor};
use crate::types::{ColumnType, Value};

/// Offset entry charged per variable-length value.
const OFFSET_SIZE: usize = std::mem::size_of::<i32>();

#[derive(Debug)]
enum Inner {
    Int64(Int64Builder),
    Float64(Float64Builder),
    VarBinary(BinaryBuilder),
}

/// Accumulates the values of one column and freezes them into a [`Block`].
#[derive(Debug)]
pub struct BlockBuilder {
    column_type: ColumnType,
    inner: Inner,
    positions: usize,
    size_in_bytes: usize,
}

impl BlockBuilder {
    /// Create a builder for `column_type`.
    pub fn new(column_type: ColumnType) -> Self {
        Self::with_capacity(column_type, 0)
    }

    /// Create a builder with room for `positions` values.
    pub fn with_capacity(column_type: ColumnType, positions: usize) -> Self {
        let inner = match column_type {
            ColumnType::Int64 => Inner::Int64(Int64Builder::with_capacity(positions)),
            ColumnType::Float64 => Inner::Float64(Float64Builder::with_capacity(positions)),
            ColumnType::VarBinary => {
                Inner::VarBinary(BinaryBuilder::with_capacity(positions, positions * 8))
            }
        };
        Self {
            column_type,
            inner,
            positions: 0,
            size_in_bytes: 0,
        }
    }

    /// The column type.
    pub const fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Values appended since the last build.
    pub const fn position_count(&self) -> usize {
        self.positions
    }

    /// Check if nothing was appended since the last build.
    pub const fn is_empty(&self) -> bool {
        self.positions == 0
    }

    /// Estimated size of the values appended since the last build.
    pub const fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    /// Append an `Int64` value.
    pub fn append_i64(&mut self, value: i64) -> QuarryResult<()> {
        match &mut self.inner {
            Inner::Int64(builder) => builder.append_value(value),
            _ => return Err(self.mismatch(ColumnType::Int64)),
        }
        self.record(8);
        Ok(())
    }

    /// Append a `Float64` value.
    pub fn append_f64(&mut self, value: f64) -> QuarryResult<()> {
        match &mut self.inner {
            Inner::Float64(builder) => builder.append_value(value),
            _ => return Err(self.mismatch(ColumnType::Float64)),
        }
        self.record(8);
        Ok(())
    }

    /// Append a `VarBinary` value.
    pub fn append_bytes(&mut self, value: &[u8]) -> QuarryResult<()> {
        match &mut self.inner {
            Inner::VarBinary(builder) => builder.append_value(value),
            _ => return Err(self.mismatch(ColumnType::VarBinary)),
        }
        self.record(value.len() + OFFSET_SIZE);
        Ok(())
    }

    /// Append a null slot.
    pub fn append_null(&mut self) {
        let width = match &mut self.inner {
            Inner::Int64(builder) => {
                builder.append_null();
                8
            }
            Inner::Float64(builder) => {
                builder.append_null();
                8
            }
            Inner::VarBinary(builder) => {
                builder.append_null();
                OFFSET_SIZE
            }
        };
        self.record(width);
    }

    /// Append a dynamically typed value. `Value::Null` appends a null.
    pub fn append_value(&mut self, value: &Value) -> QuarryResult<()> {
        match value {
            Value::Null => {
                self.append_null();
                Ok(())
            }
            Value::Int64(v) => self.append_i64(*v),
            Value::Float64(v) => self.append_f64(*v),
            Value::Bytes(v) => self.append_bytes(v),
        }
    }

    /// Copy one row of `block`, null or not.
    pub fn append_from_block(&mut self, block: &Block, position: usize) -> QuarryResult<()> {
        if block.is_null(position)? {
            self.append_null();
            return Ok(());
        }
        match block.column_type() {
            ColumnType::Int64 => self.append_i64(block.get_i64(position)?),
            ColumnType::Float64 => self.append_f64(block.get_f64(position)?),
            ColumnType::VarBinary => self.append_bytes(block.get_bytes(position)?),
        }
    }

    /// Copy the current row of `cursor`, null or not.
    pub fn append_from_cursor(&mut self, cursor: &BlockCursor) -> QuarryResult<()> {
        if cursor.is_null()? {
            self.append_null();
            return Ok(());
        }
        match cursor.column_type() {
            ColumnType::Int64 => self.append_i64(cursor.get_i64()?),
            ColumnType::Float64 => self.append_f64(cursor.get_f64()?),
            ColumnType::VarBinary => self.append_bytes(cursor.get_bytes()?),
        }
    }

    /// Freeze the appended values into a block and reset to empty.
    pub fn build(&mut self) -> Block {
        let array: ArrayRef = match &mut self.inner {
            Inner::Int64(builder) => Arc::new(builder.finish()),
            Inner::Float64(builder) => Arc::new(builder.finish()),
            Inner::VarBinary(builder) => Arc::new(builder.finish()),
        };
        self.positions = 0;
        self.size_in_bytes = 0;
        Block::from_parts(self.column_type, array)
    }

    fn record(&mut self, bytes: usize) {
        self.positions += 1;
        // one validity bit per slot, rounded up to a byte per eight rows
        self.size_in_bytes += bytes + usize::from(self.positions % 8 == 1);
    }

    fn mismatch(&self, attempted: ColumnType) -> QuarryError {
        QuarryError::type_error(format!(
            "cannot append {attempted} value to {} column",
            self.column_type
        ))
    }
}
