//! Streaming row filter and projection.

use std::fmt::Debug;
use std::sync::Arc;

use log::debug;

use common_error::{QuarryError, QuarryResult};
use quarry_core::{Page, PageBuilder, TypeDescriptor};

use super::{BoxedOperator, Operator, OperatorFactory};
use crate::context::{DriverContext, OperatorContext};

/// Row-level logic of a [`FilterProjectOperator`].
pub trait PageProcessor: Send + Sync + Debug {
    /// Types of the rows this processor appends.
    fn output_types(&self) -> &TypeDescriptor;

    /// Process rows of `page` starting at `start`, appending output rows to
    /// `builder`.
    ///
    /// Stops at the end of the page or as soon as `builder` is full, and
    /// returns the position of the first row not yet processed.
    fn process(
        &self,
        page: &Page,
        start: usize,
        builder: &mut PageBuilder,
    ) -> QuarryResult<usize>;
}

/// Selects and reorders channels, optionally dropping rows whose filter
/// channel is null.
#[derive(Debug, Clone)]
pub struct ChannelProjection {
    channels: Vec<usize>,
    non_null_channel: Option<usize>,
    output_types: TypeDescriptor,
}

impl ChannelProjection {
    /// Project `channels` of pages typed `input_types`.
    pub fn try_new(input_types: &TypeDescriptor, channels: Vec<usize>) -> QuarryResult<Self> {
        let output_types = input_types.project(&channels)?;
        Ok(Self {
            channels,
            non_null_channel: None,
            output_types,
        })
    }

    /// Keep only rows where `channel` is not null.
    #[must_use]
    pub fn with_non_null_filter(mut self, channel: usize) -> Self {
        self.non_null_channel = Some(channel);
        self
    }
}

impl PageProcessor for ChannelProjection {
    fn output_types(&self) -> &TypeDescriptor {
        &self.output_types
    }

    fn process(
        &self,
        page: &Page,
        start: usize,
        builder: &mut PageBuilder,
    ) -> QuarryResult<usize> {
        let filter = self.non_null_channel.map(|c| page.block(c)).transpose()?;
        let blocks = self
            .channels
            .iter()
            .map(|&c| page.block(c))
            .collect::<QuarryResult<Vec<_>>>()?;

        let mut position = start;
        while position < page.position_count() && !builder.is_full() {
            let keep = match filter {
                Some(block) => !block.is_null(position)?,
                None => true,
            };
            if keep && blocks.is_empty() {
                builder.append_row(&[])?;
            } else if keep {
                for (channel, block) in blocks.iter().enumerate() {
                    builder.append_from_block(channel, block, position)?;
                }
            }
            position += 1;
        }
        Ok(position)
    }
}

/// Creates [`FilterProjectOperator`]s sharing one processor.
#[derive(Debug)]
pub struct FilterProjectOperatorFactory {
    processor: Arc<dyn PageProcessor>,
    input_types: TypeDescriptor,
}

impl FilterProjectOperatorFactory {
    /// Create a factory running `processor` over pages typed `input_types`.
    pub fn new(input_types: TypeDescriptor, processor: Arc<dyn PageProcessor>) -> Self {
        Self {
            processor,
            input_types,
        }
    }
}

impl OperatorFactory for FilterProjectOperatorFactory {
    fn output_types(&self) -> &TypeDescriptor {
        self.processor.output_types()
    }

    fn create_operator(&self, ctx: &DriverContext) -> QuarryResult<BoxedOperator> {
        Ok(Box::new(FilterProjectOperator {
            context: ctx.add_operator_context("FilterProjectOperator"),
            processor: Arc::clone(&self.processor),
            input_types: self.input_types.clone(),
            page_builder: PageBuilder::new(
                self.processor.output_types().clone(),
                &ctx.config().page,
            ),
            pending: None,
            finishing: false,
        }))
    }
}

/// Runs a [`PageProcessor`] over each input page into its own page builder.
///
/// Output is buffered until the builder fills up; on `finish` whatever is
/// buffered is flushed. An input page that does not fit the remaining
/// space is held back and resumed after the next page is taken.
#[derive(Debug)]
pub struct FilterProjectOperator {
    context: OperatorContext,
    processor: Arc<dyn PageProcessor>,
    input_types: TypeDescriptor,
    page_builder: PageBuilder,
    /// Input page and the next row of it to process.
    pending: Option<(Page, usize)>,
    finishing: bool,
}

impl FilterProjectOperator {
    fn process_pending(&mut self) -> QuarryResult<()> {
        while !self.page_builder.is_full() {
            let Some((page, start)) = self.pending.take() else {
                break;
            };
            let next = self.processor.process(&page, start, &mut self.page_builder)?;
            if next < page.position_count() {
                if next == start && !self.page_builder.is_full() {
                    return Err(QuarryError::internal(format!(
                        "page processor made no progress at row {start}"
                    )));
                }
                self.pending = Some((page, next));
            }
        }
        Ok(())
    }
}

impl Operator for FilterProjectOperator {
    fn operator_context(&self) -> &OperatorContext {
        &self.context
    }

    fn output_types(&self) -> &TypeDescriptor {
        self.page_builder.types()
    }

    fn needs_input(&self) -> bool {
        !self.finishing && self.pending.is_none() && !self.page_builder.is_full()
    }

    fn add_input(&mut self, page: Page) -> QuarryResult<()> {
        if !self.needs_input() {
            return Err(QuarryError::illegal_state(
                "FilterProjectOperator does not need input",
            ));
        }
        page.ensure_types(&self.input_types)?;
        self.pending = Some((page, 0));
        self.process_pending()
    }

    fn get_output(&mut self) -> QuarryResult<Option<Page>> {
        self.process_pending()?;
        let flush = self.finishing && self.pending.is_none() && !self.page_builder.is_empty();
        if self.page_builder.is_full() || flush {
            return self.page_builder.build().map(Some);
        }
        Ok(None)
    }

    fn finish(&mut self) {
        if !self.finishing {
            debug!(
                "FilterProjectOperator {} finishing with {} buffered rows",
                self.context.operator_id(),
                self.page_builder.position_count()
            );
        }
        self.finishing = true;
    }

    fn is_finished(&self) -> bool {
        self.finishing && self.pending.is_none() && self.page_builder.is_empty()
    }
}
