//! Source operator zipping independent column sources into pages.

use std::sync::Arc;

use log::debug;

use common_error::{QuarryError, QuarryResult};
use quarry_core::{
    BlockCursor, BlockIter, BlockIterable, ColumnSourceProvider, Page, PageBuilder,
    TypeDescriptor,
};

use super::{BoxedOperator, Operator, OperatorFactory};
use crate::context::{DriverContext, OperatorContext};

/// Creates [`AlignmentOperator`]s over a fixed list of column sources.
#[derive(Debug)]
pub struct AlignmentOperatorFactory {
    sources: Vec<Arc<dyn BlockIterable>>,
    output_types: TypeDescriptor,
}

impl AlignmentOperatorFactory {
    /// Create a factory emitting one channel per source, in order.
    ///
    /// `types` declares each channel's type; every source must yield blocks
    /// of its channel's type.
    pub fn try_new(
        types: TypeDescriptor,
        sources: Vec<Arc<dyn BlockIterable>>,
    ) -> QuarryResult<Self> {
        if sources.is_empty() {
            return Err(QuarryError::invalid_parameter(
                "alignment operator needs at least one column source",
            ));
        }
        if sources.len() != types.len() {
            return Err(QuarryError::invalid_parameter(format!(
                "{} column sources for {} declared channels",
                sources.len(),
                types.len()
            )));
        }
        for (channel, (source, expected)) in sources.iter().zip(types.iter()).enumerate() {
            if source.column_type() != expected {
                return Err(QuarryError::schema_error(format!(
                    "channel {channel} declared {expected}, source yields {}",
                    source.column_type()
                )));
            }
        }
        Ok(Self {
            sources,
            output_types: types,
        })
    }

    /// Create a factory reading `columns` of `table` from `provider`.
    pub fn from_provider(
        provider: &dyn ColumnSourceProvider,
        table: &str,
        columns: &[&str],
    ) -> QuarryResult<Self> {
        let sources = columns
            .iter()
            .map(|column| provider.column(table, column))
            .collect::<QuarryResult<Vec<_>>>()?;
        let types = sources.iter().map(|s| s.column_type()).collect();
        Self::try_new(types, sources)
    }
}

impl OperatorFactory for AlignmentOperatorFactory {
    fn output_types(&self) -> &TypeDescriptor {
        &self.output_types
    }

    fn create_operator(&self, ctx: &DriverContext) -> QuarryResult<BoxedOperator> {
        Ok(Box::new(AlignmentOperator {
            context: ctx.add_operator_context("AlignmentOperator"),
            readers: self
                .sources
                .iter()
                .map(|source| SourceReader::new(source.blocks()))
                .collect(),
            page_builder: PageBuilder::new(self.output_types.clone(), &ctx.config().page),
            output_types: self.output_types.clone(),
            finishing: false,
            drained: false,
            misaligned: None,
            rows: 0,
        }))
    }
}

/// Walks one source row by row across its block boundaries.
struct SourceReader {
    blocks: BlockIter,
    cursor: Option<BlockCursor>,
    exhausted: bool,
}

impl SourceReader {
    fn new(blocks: BlockIter) -> Self {
        Self {
            blocks,
            cursor: None,
            exhausted: false,
        }
    }

    /// Move to the next row, pulling blocks as needed. Once `false` is
    /// returned the reader stays exhausted.
    fn advance(&mut self) -> QuarryResult<bool> {
        if self.exhausted {
            return Ok(false);
        }
        loop {
            if let Some(cursor) = &mut self.cursor {
                if cursor.advance_next_position() {
                    return Ok(true);
                }
            }
            match self.blocks.next() {
                Some(block) => self.cursor = Some(block?.cursor()),
                None => {
                    self.cursor = None;
                    self.exhausted = true;
                    return Ok(false);
                }
            }
        }
    }

    fn cursor(&self) -> QuarryResult<&BlockCursor> {
        self.cursor
            .as_ref()
            .ok_or_else(|| QuarryError::illegal_state("column source read while not positioned"))
    }
}

impl std::fmt::Debug for SourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceReader")
            .field("cursor", &self.cursor)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

/// First stage of a pipeline: advances every column source in lock-step
/// and emits the rows as pages.
///
/// Sources may cut their columns into blocks at different boundaries; only
/// the total row count has to agree. A source running dry while another
/// still has rows is a `SchemaError`; the operator then drops its
/// buffered rows and returns the same error on every later call.
#[derive(Debug)]
pub struct AlignmentOperator {
    context: OperatorContext,
    readers: Vec<SourceReader>,
    page_builder: PageBuilder,
    output_types: TypeDescriptor,
    finishing: bool,
    drained: bool,
    misaligned: Option<String>,
    rows: u64,
}

impl AlignmentOperator {
    /// Advance every source by one row. Returns `false` once all sources
    /// are exhausted together.
    fn advance_all(&mut self) -> QuarryResult<bool> {
        let mut advanced = Vec::with_capacity(self.readers.len());
        for reader in &mut self.readers {
            advanced.push(reader.advance()?);
        }
        if advanced.iter().all(|a| *a) {
            return Ok(true);
        }
        if advanced.iter().all(|a| !a) {
            return Ok(false);
        }
        let exhausted: Vec<usize> = advanced
            .iter()
            .enumerate()
            .filter_map(|(channel, a)| (!a).then_some(channel))
            .collect();
        let message = format!(
            "column sources out of alignment after {} rows: channels {exhausted:?} ran out first",
            self.rows
        );
        self.misaligned = Some(message.clone());
        self.page_builder.reset();
        Err(QuarryError::schema_error(message))
    }
}

impl Operator for AlignmentOperator {
    fn operator_context(&self) -> &OperatorContext {
        &self.context
    }

    fn output_types(&self) -> &TypeDescriptor {
        &self.output_types
    }

    fn needs_input(&self) -> bool {
        false
    }

    fn add_input(&mut self, _page: Page) -> QuarryResult<()> {
        Err(QuarryError::illegal_state(
            "AlignmentOperator is a source and takes no input",
        ))
    }

    fn get_output(&mut self) -> QuarryResult<Option<Page>> {
        if let Some(message) = &self.misaligned {
            return Err(QuarryError::schema_error(message.clone()));
        }
        while !self.finishing && !self.drained && !self.page_builder.is_full() {
            if !self.advance_all()? {
                self.drained = true;
                debug!(
                    "AlignmentOperator {} drained {} sources after {} rows",
                    self.context.operator_id(),
                    self.readers.len(),
                    self.rows
                );
                break;
            }
            for (channel, reader) in self.readers.iter().enumerate() {
                self.page_builder
                    .append_from_cursor(channel, reader.cursor()?)?;
            }
            self.rows += 1;
        }
        if self.page_builder.is_empty() {
            return Ok(None);
        }
        self.page_builder.build().map(Some)
    }

    fn finish(&mut self) {
        if !self.finishing && !self.drained {
            debug!(
                "AlignmentOperator {} finished early after {} rows",
                self.context.operator_id(),
                self.rows
            );
        }
        self.finishing = true;
    }

    fn is_finished(&self) -> bool {
        (self.finishing || self.drained) && self.page_builder.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use quarry_core::{Block, ColumnType, InMemoryBlockIterable, Value};

    use super::*;
    use crate::context::RuntimeConfig;

    fn int_source(chunks: &[&[i64]]) -> Arc<dyn BlockIterable> {
        let blocks = chunks
            .iter()
            .map(|chunk| Block::from_i64s(chunk.iter().copied().map(Some)))
            .collect();
        Arc::new(InMemoryBlockIterable::try_new(ColumnType::Int64, blocks).unwrap())
    }

    fn drain(operator: &mut BoxedOperator) -> QuarryResult<Vec<Page>> {
        let mut pages = Vec::new();
        while !operator.is_finished() {
            if let Some(page) = operator.get_output()? {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    #[test]
    fn test_differing_chunk_boundaries() {
        let factory = AlignmentOperatorFactory::try_new(
            TypeDescriptor::new([ColumnType::Int64, ColumnType::Int64]),
            vec![
                int_source(&[&[1, 2, 3], &[4, 5]]),
                int_source(&[&[10], &[], &[20, 30, 40, 50]]),
            ],
        )
        .unwrap();
        let ctx = DriverContext::new(RuntimeConfig::default().with_page_thresholds(2, usize::MAX));
        let mut operator = factory.create_operator(&ctx).unwrap();

        let pages = drain(&mut operator).unwrap();
        let counts: Vec<usize> = pages.iter().map(Page::position_count).collect();
        assert_eq!(counts, vec![2, 2, 1]);

        let rows: Vec<Vec<Value>> = pages.iter().flat_map(|p| p.rows().unwrap()).collect();
        assert_eq!(rows[4], vec![Value::Int64(5), Value::Int64(50)]);
        assert!(operator.get_output().unwrap().is_none());

        operator.finish();
        assert!(operator.is_finished());
        assert!(operator.get_output().unwrap().is_none());
    }

    #[test]
    fn test_mismatched_lengths_fail() {
        let factory = AlignmentOperatorFactory::try_new(
            TypeDescriptor::new([ColumnType::Int64, ColumnType::Int64]),
            vec![int_source(&[&[1, 2, 3]]), int_source(&[&[1, 2]])],
        )
        .unwrap();
        let mut operator = factory.create_operator(&DriverContext::default()).unwrap();
        let err = drain(&mut operator).unwrap_err();
        assert!(matches!(err, QuarryError::SchemaError(_)));
    }

    #[test]
    fn test_misalignment_is_sticky() {
        let factory = AlignmentOperatorFactory::try_new(
            TypeDescriptor::new([ColumnType::Int64, ColumnType::Int64]),
            vec![int_source(&[&[1, 2, 3, 4, 5]]), int_source(&[&[1, 2]])],
        )
        .unwrap();
        let ctx = DriverContext::new(RuntimeConfig::default().with_page_thresholds(4, usize::MAX));
        let mut operator = factory.create_operator(&ctx).unwrap();

        let first = operator.get_output().unwrap_err();
        for _ in 0..4 {
            let again = operator.get_output().unwrap_err();
            assert!(matches!(again, QuarryError::SchemaError(_)));
            assert_eq!(again.to_string(), first.to_string());
        }
        assert!(!operator.is_finished());
    }

    #[test]
    fn test_declared_type_checked() {
        let err = AlignmentOperatorFactory::try_new(
            TypeDescriptor::new([ColumnType::Float64]),
            vec![int_source(&[&[1]])],
        )
        .unwrap_err();
        assert!(matches!(err, QuarryError::SchemaError(_)));
        assert!(AlignmentOperatorFactory::try_new(TypeDescriptor::empty(), vec![]).is_err());
    }

    #[test]
    fn test_source_contract() {
        let factory = AlignmentOperatorFactory::try_new(
            TypeDescriptor::new([ColumnType::Int64]),
            vec![int_source(&[&[1, 2]])],
        )
        .unwrap();
        let mut operator = factory.create_operator(&DriverContext::default()).unwrap();
        assert!(!operator.needs_input());
        let page = Page::try_new(vec![Block::from_i64s([Some(1)])]).unwrap();
        assert!(operator.add_input(page).unwrap_err().is_usage_defect());
    }

    #[test]
    fn test_finish_stops_early() {
        let factory = AlignmentOperatorFactory::try_new(
            TypeDescriptor::new([ColumnType::Int64]),
            vec![int_source(&[&[1, 2, 3]])],
        )
        .unwrap();
        let mut operator = factory.create_operator(&DriverContext::default()).unwrap();
        operator.finish();
        operator.finish();
        assert!(operator.is_finished());
        assert!(operator.get_output().unwrap().is_none());
    }

    #[test]
    fn test_empty_sources() {
        let factory = AlignmentOperatorFactory::try_new(
            TypeDescriptor::new([ColumnType::Int64]),
            vec![int_source(&[])],
        )
        .unwrap();
        let mut operator = factory.create_operator(&DriverContext::default()).unwrap();
        assert!(drain(&mut operator).unwrap().is_empty());
    }
}
