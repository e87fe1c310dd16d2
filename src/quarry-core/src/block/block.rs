//! Immutable single-column blocks.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BinaryArray, Float64Array, Int64Array, new_empty_array};
use arrow::datatypes::{Float64Type, Int64Type};

use common_error::{QuarryError, QuarryResult};

use super::BlockCursor;
use crate::types::{ColumnType, Value};

/// An immutable column of values of one type with a null flag per row.
///
/// Blocks are backed by an Arrow array, so cloning one is cheap and a
/// block can be shared freely between pages and cursors. Value accessors
/// require the slot to be non-null; reading a null slot is an error rather
/// than a silent default.
#[derive(Debug, Clone)]
pub struct Block {
    column_type: ColumnType,
    array: ArrayRef,
}

impl Block {
    /// Wrap an Arrow array, checking that it holds `column_type` values.
    pub fn try_new(column_type: ColumnType, array: ArrayRef) -> QuarryResult<Self> {
        if array.data_type() != &column_type.arrow_type() {
            return Err(QuarryError::schema_error(format!(
                "expected {column_type} block, got arrow array of type {}",
                array.data_type()
            )));
        }
        Ok(Self { column_type, array })
    }

    /// Wrap an Arrow array, inferring the column type from it.
    pub fn from_array(array: ArrayRef) -> QuarryResult<Self> {
        let column_type = ColumnType::try_from_arrow(array.data_type())?;
        Ok(Self { column_type, array })
    }

    /// Wrap an array already known to hold `column_type` values.
    pub(crate) const fn from_parts(column_type: ColumnType, array: ArrayRef) -> Self {
        Self { column_type, array }
    }

    /// A block with no rows.
    pub fn empty(column_type: ColumnType) -> Self {
        Self {
            column_type,
            array: new_empty_array(&column_type.arrow_type()),
        }
    }

    /// Build an `Int64` block.
    pub fn from_i64s(values: impl IntoIterator<Item = Option<i64>>) -> Self {
        Self {
            column_type: ColumnType::Int64,
            array: Arc::new(values.into_iter().collect::<Int64Array>()),
        }
    }

    /// Build a `Float64` block.
    pub fn from_f64s(values: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            column_type: ColumnType::Float64,
            array: Arc::new(values.into_iter().collect::<Float64Array>()),
        }
    }

    /// Build a `VarBinary` block.
    pub fn from_bytes<B: AsRef<[u8]>>(values: impl IntoIterator<Item = Option<B>>) -> Self {
        Self {
            column_type: ColumnType::VarBinary,
            array: Arc::new(values.into_iter().collect::<BinaryArray>()),
        }
    }

    /// The column type.
    pub const fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Number of rows.
    pub fn position_count(&self) -> usize {
        self.array.len()
    }

    /// Check if the block has no rows.
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Number of null rows.
    pub fn null_count(&self) -> usize {
        self.array.null_count()
    }

    /// The backing Arrow array.
    pub const fn array(&self) -> &ArrayRef {
        &self.array
    }

    /// Memory held by the backing buffers.
    pub fn size_in_bytes(&self) -> usize {
        self.array.get_array_memory_size()
    }

    /// A fresh sequential reader positioned before the first row.
    pub fn cursor(&self) -> BlockCursor {
        BlockCursor::new(self.clone())
    }

    /// Null flag of one row.
    pub fn is_null(&self, position: usize) -> QuarryResult<bool> {
        self.check_position(position)?;
        Ok(self.array.is_null(position))
    }

    /// Value of an `Int64` row.
    pub fn get_i64(&self, position: usize) -> QuarryResult<i64> {
        self.check_readable(position, ColumnType::Int64)?;
        self.array
            .as_primitive_opt::<Int64Type>()
            .map(|array| array.value(position))
            .ok_or_else(|| self.corrupt())
    }

    /// Value of a `Float64` row.
    pub fn get_f64(&self, position: usize) -> QuarryResult<f64> {
        self.check_readable(position, ColumnType::Float64)?;
        self.array
            .as_primitive_opt::<Float64Type>()
            .map(|array| array.value(position))
            .ok_or_else(|| self.corrupt())
    }

    /// Value of a `VarBinary` row.
    pub fn get_bytes(&self, position: usize) -> QuarryResult<&[u8]> {
        self.check_readable(position, ColumnType::VarBinary)?;
        self.array
            .as_binary_opt::<i32>()
            .map(|array| array.value(position))
            .ok_or_else(|| self.corrupt())
    }

    /// Value of any row as a [`Value`], mapping null slots to `Value::Null`.
    pub fn get_value(&self, position: usize) -> QuarryResult<Value> {
        if self.is_null(position)? {
            return Ok(Value::Null);
        }
        match self.column_type {
            ColumnType::Int64 => self.get_i64(position).map(Value::Int64),
            ColumnType::Float64 => self.get_f64(position).map(Value::Float64),
            ColumnType::VarBinary => self.get_bytes(position).map(|v| Value::Bytes(v.to_vec())),
        }
    }

    fn check_position(&self, position: usize) -> QuarryResult<()> {
        if position >= self.array.len() {
            return Err(QuarryError::illegal_state(format!(
                "position {position} out of range for block of {} rows",
                self.array.len()
            )));
        }
        Ok(())
    }

    fn check_readable(&self, position: usize, expected: ColumnType) -> QuarryResult<()> {
        if self.column_type != expected {
            return Err(QuarryError::type_error(format!(
                "cannot read {expected} from {} block",
                self.column_type
            )));
        }
        if self.is_null(position)? {
            return Err(QuarryError::illegal_state(format!(
                "value read at null position {position}"
            )));
        }
        Ok(())
    }

    fn corrupt(&self) -> QuarryError {
        QuarryError::internal(format!(
            "{} block backed by arrow array of type {}",
            self.column_type,
            self.array.data_type()
        ))
    }
}
