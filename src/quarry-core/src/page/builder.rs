//! Row-at-a-time page construction.

use common_config::PageConfig;
use common_error::{QuarryError, QuarryResult};

use super::Page;
use crate::block::{Block, BlockBuilder, BlockCursor};
use crate::types::{TypeDescriptor, Value};

/// Lifecycle of a [`PageBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageBuilderState {
    /// Nothing appended since creation or the last build.
    Empty,
    /// Rows buffered, thresholds not reached (or a row is half written).
    Accumulating,
    /// A threshold was reached at a row boundary. Appends are rejected
    /// until the next build or reset.
    Full,
}

/// Builds pages one value at a time across a fixed set of channels.
///
/// Callers append one value per channel to form a row. The builder turns
/// `Full` only when every channel holds the same number of values and the
/// row or byte threshold has been reached, so a full builder always builds
/// into a well-formed page.
#[derive(Debug)]
pub struct PageBuilder {
    types: TypeDescriptor,
    builders: Vec<BlockBuilder>,
    max_rows: usize,
    max_bytes: usize,
    /// Row count for builders without channels.
    bare_rows: usize,
    state: PageBuilderState,
}

impl PageBuilder {
    /// Create a builder for `types` with the thresholds in `config`.
    pub fn new(types: TypeDescriptor, config: &PageConfig) -> Self {
        Self::with_thresholds(types, config.max_rows, config.max_bytes)
    }

    /// Create a builder with explicit thresholds. A zero threshold is
    /// treated as one.
    pub fn with_thresholds(types: TypeDescriptor, max_rows: usize, max_bytes: usize) -> Self {
        let max_rows = max_rows.max(1);
        let builders = types
            .iter()
            .map(|ty| BlockBuilder::with_capacity(ty, max_rows.min(1024)))
            .collect();
        Self {
            types,
            builders,
            max_rows,
            max_bytes: max_bytes.max(1),
            bare_rows: 0,
            state: PageBuilderState::Empty,
        }
    }

    /// Channel types.
    pub const fn types(&self) -> &TypeDescriptor {
        &self.types
    }

    /// Current state.
    pub const fn state(&self) -> PageBuilderState {
        self.state
    }

    /// Check if nothing was appended since the last build.
    pub fn is_empty(&self) -> bool {
        self.state == PageBuilderState::Empty
    }

    /// Check if a threshold was reached.
    pub fn is_full(&self) -> bool {
        self.state == PageBuilderState::Full
    }

    /// Completed rows. While a row is half written this is the count of
    /// the shortest channel.
    pub fn position_count(&self) -> usize {
        self.builders
            .iter()
            .map(BlockBuilder::position_count)
            .min()
            .unwrap_or(self.bare_rows)
    }

    /// Estimated size of the buffered values.
    pub fn size_in_bytes(&self) -> usize {
        self.builders.iter().map(BlockBuilder::size_in_bytes).sum()
    }

    /// Append an `Int64` value to `channel`.
    pub fn append_i64(&mut self, channel: usize, value: i64) -> QuarryResult<()> {
        self.builder(channel)?.append_i64(value)?;
        self.refresh_state();
        Ok(())
    }

    /// Append a `Float64` value to `channel`.
    pub fn append_f64(&mut self, channel: usize, value: f64) -> QuarryResult<()> {
        self.builder(channel)?.append_f64(value)?;
        self.refresh_state();
        Ok(())
    }

    /// Append a `VarBinary` value to `channel`.
    pub fn append_bytes(&mut self, channel: usize, value: &[u8]) -> QuarryResult<()> {
        self.builder(channel)?.append_bytes(value)?;
        self.refresh_state();
        Ok(())
    }

    /// Append a null to `channel`.
    pub fn append_null(&mut self, channel: usize) -> QuarryResult<()> {
        self.builder(channel)?.append_null();
        self.refresh_state();
        Ok(())
    }

    /// Append a dynamically typed value to `channel`.
    pub fn append_value(&mut self, channel: usize, value: &Value) -> QuarryResult<()> {
        self.builder(channel)?.append_value(value)?;
        self.refresh_state();
        Ok(())
    }

    /// Copy row `position` of `block` into `channel`.
    pub fn append_from_block(
        &mut self,
        channel: usize,
        block: &Block,
        position: usize,
    ) -> QuarryResult<()> {
        self.builder(channel)?.append_from_block(block, position)?;
        self.refresh_state();
        Ok(())
    }

    /// Copy the current row of `cursor` into `channel`.
    pub fn append_from_cursor(&mut self, channel: usize, cursor: &BlockCursor) -> QuarryResult<()> {
        self.builder(channel)?.append_from_cursor(cursor)?;
        self.refresh_state();
        Ok(())
    }

    /// Append a complete row. Nothing is appended if any value does not
    /// fit its channel.
    pub fn append_row(&mut self, row: &[Value]) -> QuarryResult<()> {
        self.check_appendable()?;
        if row.len() != self.types.len() {
            return Err(QuarryError::invalid_parameter(format!(
                "row of {} values for builder of {} channels",
                row.len(),
                self.types.len()
            )));
        }
        for (channel, (value, expected)) in row.iter().zip(self.types.iter()).enumerate() {
            if let Some(actual) = value.column_type() {
                if actual != expected {
                    return Err(QuarryError::type_error(format!(
                        "channel {channel} is {expected}, got {actual} value"
                    )));
                }
            }
        }
        if self.builders.is_empty() {
            self.bare_rows += 1;
        }
        for (builder, value) in self.builders.iter_mut().zip(row) {
            builder.append_value(value)?;
        }
        self.refresh_state();
        Ok(())
    }

    /// Freeze the buffered rows into a page and reset to `Empty`.
    ///
    /// Fails if the channels hold different numbers of values.
    pub fn build(&mut self) -> QuarryResult<Page> {
        if !self.is_aligned() {
            let counts: Vec<usize> = self
                .builders
                .iter()
                .map(BlockBuilder::position_count)
                .collect();
            return Err(QuarryError::illegal_state(format!(
                "build with misaligned channels, per-channel counts {counts:?}"
            )));
        }
        let page = if self.builders.is_empty() {
            Page::with_position_count(self.bare_rows)
        } else {
            Page::try_new(self.builders.iter_mut().map(BlockBuilder::build).collect())?
        };
        self.bare_rows = 0;
        self.state = PageBuilderState::Empty;
        Ok(page)
    }

    /// Discard everything buffered.
    pub fn reset(&mut self) {
        for builder in &mut self.builders {
            builder.build();
        }
        self.bare_rows = 0;
        self.state = PageBuilderState::Empty;
    }

    fn builder(&mut self, channel: usize) -> QuarryResult<&mut BlockBuilder> {
        self.check_appendable()?;
        let channels = self.builders.len();
        self.builders.get_mut(channel).ok_or_else(|| {
            QuarryError::invalid_parameter(format!(
                "channel {channel} out of range for builder of {channels} channels"
            ))
        })
    }

    fn check_appendable(&self) -> QuarryResult<()> {
        if self.is_full() {
            return Err(QuarryError::illegal_state(
                "append to a full page builder; build or reset first",
            ));
        }
        Ok(())
    }

    fn is_aligned(&self) -> bool {
        let mut counts = self.builders.iter().map(BlockBuilder::position_count);
        counts
            .next()
            .is_none_or(|first| counts.all(|count| count == first))
    }

    fn refresh_state(&mut self) {
        let rows = self.position_count();
        let buffered = rows > 0 || self.builders.iter().any(|b| !b.is_empty());
        self.state = if !buffered {
            PageBuilderState::Empty
        } else if self.is_aligned()
            && (rows >= self.max_rows || self.size_in_bytes() >= self.max_bytes)
        {
            PageBuilderState::Full
        } else {
            PageBuilderState::Accumulating
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn types() -> TypeDescriptor {
        TypeDescriptor::new([ColumnType::VarBinary, ColumnType::Float64])
    }

    #[test]
    fn test_state_transitions() {
        let mut builder = PageBuilder::with_thresholds(types(), 2, usize::MAX);
        assert_eq!(builder.state(), PageBuilderState::Empty);

        builder.append_bytes(0, b"A").unwrap();
        assert_eq!(builder.state(), PageBuilderState::Accumulating);
        builder.append_f64(1, 1.0).unwrap();
        assert_eq!(builder.state(), PageBuilderState::Accumulating);

        builder.append_bytes(0, b"N").unwrap();
        // half-written row never reports full
        assert_eq!(builder.state(), PageBuilderState::Accumulating);
        builder.append_null(1).unwrap();
        assert_eq!(builder.state(), PageBuilderState::Full);

        let err = builder.append_bytes(0, b"R").unwrap_err();
        assert!(err.is_usage_defect());

        let page = builder.build().unwrap();
        assert_eq!(page.position_count(), 2);
        assert!(builder.is_empty());
        assert_eq!(builder.position_count(), 0);
    }

    #[test]
    fn test_byte_threshold() {
        let mut builder = PageBuilder::with_thresholds(types(), usize::MAX, 64);
        let mut rows = 0;
        while !builder.is_full() {
            builder
                .append_row(&[Value::from("1998-09-02"), Value::Float64(2.5)])
                .unwrap();
            rows += 1;
        }
        assert!(builder.size_in_bytes() >= 64);
        assert_eq!(builder.build().unwrap().position_count(), rows);
    }

    #[test]
    fn test_build_misaligned_fails() {
        let mut builder = PageBuilder::new(types(), &PageConfig::default());
        builder.append_bytes(0, b"A").unwrap();
        assert!(builder.build().unwrap_err().is_usage_defect());
        builder.reset();
        assert!(builder.is_empty());
        assert_eq!(builder.build().unwrap().position_count(), 0);
    }

    #[test]
    fn test_type_and_channel_errors() {
        let mut builder = PageBuilder::new(types(), &PageConfig::default());
        assert!(matches!(
            builder.append_i64(1, 3).unwrap_err(),
            QuarryError::TypeError(_)
        ));
        assert!(matches!(
            builder.append_null(2).unwrap_err(),
            QuarryError::InvalidParameter(_)
        ));
        assert!(matches!(
            builder
                .append_row(&[Value::Int64(1), Value::Float64(1.0)])
                .unwrap_err(),
            QuarryError::TypeError(_)
        ));
        assert!(builder.append_row(&[Value::Null]).is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_append_from_cursor() {
        let block = Block::from_f64s([Some(4.0), None]);
        let mut cursor = block.cursor();
        let mut builder =
            PageBuilder::new(TypeDescriptor::new([ColumnType::Float64]), &PageConfig::default());
        while cursor.advance_next_position() {
            builder.append_from_cursor(0, &cursor).unwrap();
        }
        let page = builder.build().unwrap();
        assert_eq!(
            page.rows().unwrap(),
            vec![vec![Value::Float64(4.0)], vec![Value::Null]]
        );
    }

    #[test]
    fn test_channel_less_rows() {
        let mut builder = PageBuilder::with_thresholds(TypeDescriptor::empty(), 3, usize::MAX);
        for _ in 0..3 {
            builder.append_row(&[]).unwrap();
        }
        assert!(builder.is_full());
        let page = builder.build().unwrap();
        assert_eq!(page.channel_count(), 0);
        assert_eq!(page.position_count(), 3);
    }
}
