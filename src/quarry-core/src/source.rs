//! Column sources.
//!
//! A column source yields the blocks of one column, in order, as many times
//! as it is asked to. Operators that read stored data (such as the
//! alignment operator) consume sources and never see how the blocks were
//! produced.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;

use common_error::{QuarryError, QuarryResult};

use crate::block::Block;
use crate::types::ColumnType;

/// Iterator over the blocks of one column.
pub type BlockIter = Box<dyn Iterator<Item = QuarryResult<Block>> + Send>;

/// A re-iterable sequence of blocks holding one column.
pub trait BlockIterable: Send + Sync + std::fmt::Debug {
    /// Type of every block this source yields.
    fn column_type(&self) -> ColumnType;

    /// A fresh iterator starting at the first block.
    fn blocks(&self) -> BlockIter;
}

/// Looks up column sources by table and column name.
pub trait ColumnSourceProvider: Send + Sync {
    /// Source for one column of one table.
    fn column(&self, table: &str, column: &str) -> QuarryResult<Arc<dyn BlockIterable>>;
}

/// A column source over blocks held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryBlockIterable {
    column_type: ColumnType,
    blocks: Arc<[Block]>,
}

impl InMemoryBlockIterable {
    /// Create a source over `blocks`, which must all be of `column_type`.
    pub fn try_new(column_type: ColumnType, blocks: Vec<Block>) -> QuarryResult<Self> {
        if let Some(block) = blocks.iter().find(|b| b.column_type() != column_type) {
            return Err(QuarryError::schema_error(format!(
                "{} block in {column_type} column source",
                block.column_type()
            )));
        }
        Ok(Self {
            column_type,
            blocks: blocks.into(),
        })
    }

    /// Create a source from one column of each record batch.
    pub fn from_record_batches(batches: &[RecordBatch], column: usize) -> QuarryResult<Self> {
        let schema = batches.first().map(RecordBatch::schema).ok_or_else(|| {
            QuarryError::invalid_parameter("cannot infer a column source from zero batches")
        })?;
        let field = schema.fields().get(column).ok_or_else(|| {
            QuarryError::invalid_parameter(format!(
                "column {column} out of range for {} columns",
                schema.fields().len()
            ))
        })?;
        let column_type = ColumnType::try_from_arrow(field.data_type())?;
        let blocks = batches
            .iter()
            .map(|batch| {
                let array = batch.columns().get(column).ok_or_else(|| {
                    QuarryError::schema_error(format!("batch without column {column}"))
                })?;
                Block::try_new(column_type, Arc::clone(array))
            })
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(Self {
            column_type,
            blocks: blocks.into(),
        })
    }

    /// Total rows across all blocks.
    pub fn position_count(&self) -> usize {
        self.blocks.iter().map(Block::position_count).sum()
    }
}

impl BlockIterable for InMemoryBlockIterable {
    fn column_type(&self) -> ColumnType {
        self.column_type
    }

    fn blocks(&self) -> BlockIter {
        let blocks = Arc::clone(&self.blocks);
        Box::new((0..blocks.len()).map(move |i| Ok(blocks[i].clone())))
    }
}

/// An in-memory table catalog.
#[derive(Debug, Default)]
pub struct InMemoryColumnProvider {
    tables: HashMap<String, HashMap<String, Arc<dyn BlockIterable>>>,
}

impl InMemoryColumnProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one column of one table, replacing any previous source.
    pub fn register(
        &mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        source: Arc<dyn BlockIterable>,
    ) {
        self.tables
            .entry(table.into())
            .or_default()
            .insert(column.into(), source);
    }

    /// Register every column of a record batch stream under its field name.
    pub fn register_batches(
        &mut self,
        table: impl Into<String>,
        batches: &[RecordBatch],
    ) -> QuarryResult<()> {
        let table = table.into();
        let Some(first) = batches.first() else {
            return Ok(());
        };
        for (column, field) in first.schema().fields().iter().enumerate() {
            let source = InMemoryBlockIterable::from_record_batches(batches, column)?;
            self.register(table.clone(), field.name().clone(), Arc::new(source));
        }
        Ok(())
    }
}

impl ColumnSourceProvider for InMemoryColumnProvider {
    fn column(&self, table: &str, column: &str) -> QuarryResult<Arc<dyn BlockIterable>> {
        self.tables
            .get(table)
            .and_then(|columns| columns.get(column))
            .cloned()
            .ok_or_else(|| {
                QuarryError::invalid_parameter(format!("unknown column {table}.{column}"))
            })
    }
}
