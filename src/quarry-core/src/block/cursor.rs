//! Sequential block readers.

use common_error::{QuarryError, QuarryResult};

use super::Block;
use crate::types::{ColumnType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeFirst,
    Positioned(usize),
    Exhausted,
}

/// Forward-only reader over one [`Block`].
///
/// A new cursor sits before the first row. Each successful
/// [`advance_next_position`](Self::advance_next_position) moves to the next
/// row; once it returns `false` the cursor is exhausted for good. Reads are
/// only valid while positioned on a row.
#[derive(Debug, Clone)]
pub struct BlockCursor {
    block: Block,
    state: CursorState,
}

impl BlockCursor {
    pub(crate) const fn new(block: Block) -> Self {
        Self {
            block,
            state: CursorState::BeforeFirst,
        }
    }

    /// Column type of the underlying block.
    pub const fn column_type(&self) -> ColumnType {
        self.block.column_type()
    }

    /// Move to the next row. Returns `false`, now and on every later call,
    /// once the last row has been passed.
    pub fn advance_next_position(&mut self) -> bool {
        let next = match self.state {
            CursorState::BeforeFirst => 0,
            CursorState::Positioned(position) => position + 1,
            CursorState::Exhausted => return false,
        };
        if next < self.block.position_count() {
            self.state = CursorState::Positioned(next);
            true
        } else {
            self.state = CursorState::Exhausted;
            false
        }
    }

    /// Check if the cursor currently sits on a row.
    pub const fn is_valid(&self) -> bool {
        matches!(self.state, CursorState::Positioned(_))
    }

    /// Check if the cursor has moved past the last row.
    pub const fn is_finished(&self) -> bool {
        matches!(self.state, CursorState::Exhausted)
    }

    /// Rows not yet visited, excluding the current one.
    pub fn remaining_positions(&self) -> usize {
        let count = self.block.position_count();
        match self.state {
            CursorState::BeforeFirst => count,
            CursorState::Positioned(position) => count - position - 1,
            CursorState::Exhausted => 0,
        }
    }

    /// Current row index.
    pub fn position(&self) -> QuarryResult<usize> {
        match self.state {
            CursorState::Positioned(position) => Ok(position),
            CursorState::BeforeFirst => Err(QuarryError::illegal_state(
                "cursor read before advanceNextPosition",
            )),
            CursorState::Exhausted => Err(QuarryError::illegal_state(
                "cursor read after the last position",
            )),
        }
    }

    /// Null flag of the current row.
    pub fn is_null(&self) -> QuarryResult<bool> {
        self.block.is_null(self.position()?)
    }

    /// `Int64` value of the current row.
    pub fn get_i64(&self) -> QuarryResult<i64> {
        self.block.get_i64(self.position()?)
    }

    /// `Float64` value of the current row.
    pub fn get_f64(&self) -> QuarryResult<f64> {
        self.block.get_f64(self.position()?)
    }

    /// `VarBinary` value of the current row.
    pub fn get_bytes(&self) -> QuarryResult<&[u8]> {
        self.block.get_bytes(self.position()?)
    }

    /// Current row as a [`Value`].
    pub fn get_value(&self) -> QuarryResult<Value> {
        self.block.get_value(self.position()?)
    }
}
