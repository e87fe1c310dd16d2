//! Immutable row-aligned column sets.

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use common_error::{QuarryError, QuarryResult};

use crate::block::Block;
use crate::types::{TypeDescriptor, Value};

/// A batch of rows stored column-wise: one [`Block`] per channel, all of
/// the same row count.
///
/// Pages are the unit operators exchange. Row `i` of a page is the tuple
/// of row `i` across its blocks. A page without channels still carries a
/// row count, which is what `count(*)` style consumers need.
#[derive(Debug, Clone)]
pub struct Page {
    blocks: Vec<Block>,
    position_count: usize,
}

impl Page {
    /// Create a page from blocks of equal row count.
    ///
    /// An empty block list yields a zero-row page; use
    /// [`with_position_count`](Self::with_position_count) for channel-less
    /// pages with rows.
    pub fn try_new(blocks: Vec<Block>) -> QuarryResult<Self> {
        let position_count = blocks.first().map_or(0, Block::position_count);
        if let Some((channel, block)) = blocks
            .iter()
            .enumerate()
            .find(|(_, block)| block.position_count() != position_count)
        {
            return Err(QuarryError::schema_error(format!(
                "channel {channel} has {} rows, expected {position_count}",
                block.position_count()
            )));
        }
        Ok(Self {
            blocks,
            position_count,
        })
    }

    /// A page with no channels and `position_count` rows.
    pub const fn with_position_count(position_count: usize) -> Self {
        Self {
            blocks: Vec::new(),
            position_count,
        }
    }

    /// Number of rows.
    pub const fn position_count(&self) -> usize {
        self.position_count
    }

    /// Check if the page has no rows.
    pub const fn is_empty(&self) -> bool {
        self.position_count == 0
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block of one channel.
    pub fn block(&self, channel: usize) -> QuarryResult<&Block> {
        self.blocks.get(channel).ok_or_else(|| {
            QuarryError::invalid_parameter(format!(
                "channel {channel} out of range for page of {} channels",
                self.blocks.len()
            ))
        })
    }

    /// All blocks in channel order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Consume the page, returning its blocks.
    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Per-channel types of this page.
    pub fn types(&self) -> TypeDescriptor {
        self.blocks.iter().map(Block::column_type).collect()
    }

    /// Memory held by all blocks.
    pub fn size_in_bytes(&self) -> usize {
        self.blocks.iter().map(Block::size_in_bytes).sum()
    }

    /// Check the page's channel types against `expected`.
    pub fn ensure_types(&self, expected: &TypeDescriptor) -> QuarryResult<()> {
        let actual = self.types();
        if &actual != expected {
            return Err(QuarryError::schema_error(format!(
                "page types {actual} do not match {expected}"
            )));
        }
        Ok(())
    }

    /// Page made of the selected channels, in the given order.
    pub fn project(&self, channels: &[usize]) -> QuarryResult<Self> {
        let blocks = channels
            .iter()
            .map(|&channel| self.block(channel).cloned())
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(Self {
            blocks,
            position_count: self.position_count,
        })
    }

    /// One row as values.
    pub fn row(&self, position: usize) -> QuarryResult<Vec<Value>> {
        if position >= self.position_count {
            return Err(QuarryError::illegal_state(format!(
                "row {position} out of range for page of {} rows",
                self.position_count
            )));
        }
        self.blocks
            .iter()
            .map(|block| block.get_value(position))
            .collect()
    }

    /// All rows as values. Meant for small pages and assertions.
    pub fn rows(&self) -> QuarryResult<Vec<Vec<Value>>> {
        (0..self.position_count).map(|i| self.row(i)).collect()
    }

    /// Convert to an Arrow record batch with generated column names.
    pub fn to_record_batch(&self) -> QuarryResult<RecordBatch> {
        let fields: Vec<Field> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, block)| Field::new(format!("_col{i}"), block.column_type().arrow_type(), true))
            .collect();
        self.to_record_batch_with_schema(Arc::new(Schema::new(fields)))
    }

    /// Convert to an Arrow record batch with the given schema.
    pub fn to_record_batch_with_schema(&self, schema: SchemaRef) -> QuarryResult<RecordBatch> {
        let columns: Vec<ArrayRef> = self.blocks.iter().map(|b| Arc::clone(b.array())).collect();
        let options = RecordBatchOptions::new().with_row_count(Some(self.position_count));
        Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
    }
}

impl TryFrom<&RecordBatch> for Page {
    type Error = QuarryError;

    fn try_from(batch: &RecordBatch) -> QuarryResult<Self> {
        let blocks = batch
            .columns()
            .iter()
            .map(|array| Block::from_array(Arc::clone(array)))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(Self {
            blocks,
            position_count: batch.num_rows(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn sample() -> Page {
        Page::try_new(vec![
            Block::from_bytes([Some("A"), Some("N")]),
            Block::from_i64s([Some(1), None]),
        ])
        .unwrap()
    }

    #[test]
    fn test_rows() {
        let page = sample();
        assert_eq!(page.position_count(), 2);
        assert_eq!(page.channel_count(), 2);
        assert_eq!(
            page.rows().unwrap(),
            vec![
                vec![Value::from("A"), Value::Int64(1)],
                vec![Value::from("N"), Value::Null],
            ]
        );
        assert!(page.row(2).unwrap_err().is_usage_defect());
    }

    #[test]
    fn test_unequal_blocks_rejected() {
        let err = Page::try_new(vec![
            Block::from_i64s([Some(1)]),
            Block::from_i64s([Some(1), Some(2)]),
        ])
        .unwrap_err();
        assert!(matches!(err, QuarryError::SchemaError(_)));
    }

    #[test]
    fn test_ensure_types() {
        let page = sample();
        let expected = TypeDescriptor::new([ColumnType::VarBinary, ColumnType::Int64]);
        assert!(page.ensure_types(&expected).is_ok());
        assert!(page.ensure_types(&expected.project(&[1, 0]).unwrap()).is_err());
    }

    #[test]
    fn test_channel_less_page() {
        let page = Page::with_position_count(5);
        assert_eq!(page.channel_count(), 0);
        assert_eq!(page.position_count(), 5);
        let batch = page.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 5);
        assert_eq!(Page::try_from(&batch).unwrap().position_count(), 5);
    }

    #[test]
    fn test_record_batch_conversion() {
        let page = sample();
        let batch = page.to_record_batch().unwrap();
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.schema().field(0).name(), "_col0");

        let back = Page::try_from(&batch).unwrap();
        assert_eq!(back.types(), page.types());
        assert_eq!(back.rows().unwrap(), page.rows().unwrap());
    }

    #[test]
    fn test_project() {
        let page = sample().project(&[1]).unwrap();
        assert_eq!(page.types(), TypeDescriptor::new([ColumnType::Int64]));
        assert!(sample().project(&[4]).is_err());
    }
}
