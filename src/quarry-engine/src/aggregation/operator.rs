//! Hash aggregation operator.

use log::{debug, warn};

use common_error::{QuarryError, QuarryResult};
use quarry_core::{Page, PageBuilder, TypeDescriptor};

use super::accumulator::{GroupedAccumulator, create_accumulator};
use super::{Aggregation, AggregationStep, GroupByHash, GroupKeys};
use crate::context::{DriverContext, OperatorContext};
use crate::operators::{BoxedOperator, Operator, OperatorFactory};

/// Creates [`HashAggregationOperator`]s.
///
/// Output pages carry the group columns first, in `group_channels` order,
/// followed by one column per aggregation.
#[derive(Debug, Clone)]
pub struct HashAggregationOperatorFactory {
    input_types: TypeDescriptor,
    group_channels: Vec<usize>,
    step: AggregationStep,
    aggregations: Vec<Aggregation>,
    output_types: TypeDescriptor,
    max_memory_bytes: Option<usize>,
    expected_groups: Option<usize>,
}

impl HashAggregationOperatorFactory {
    /// Validate the aggregation layout against `input_types`.
    ///
    /// For the final step every aggregation's input channel must hold the
    /// intermediate state its partial step emits.
    pub fn try_new(
        input_types: TypeDescriptor,
        group_channels: Vec<usize>,
        step: AggregationStep,
        aggregations: Vec<Aggregation>,
    ) -> QuarryResult<Self> {
        let mut output_types = input_types.project(&group_channels)?.types().to_vec();
        for aggregation in &aggregations {
            let accumulator = new_accumulator(&input_types, step, aggregation)?;
            output_types.push(if step.is_output_partial() {
                accumulator.intermediate_type()
            } else {
                accumulator.final_type()
            });
        }

        Ok(Self {
            input_types,
            group_channels,
            step,
            aggregations,
            output_types: output_types.into(),
            max_memory_bytes: None,
            expected_groups: None,
        })
    }

    /// Override the per-operator memory budget of the runtime config.
    #[must_use]
    pub const fn with_max_memory_bytes(mut self, max_memory_bytes: usize) -> Self {
        self.max_memory_bytes = Some(max_memory_bytes);
        self
    }

    /// Override the initial hash table capacity of the runtime config.
    #[must_use]
    pub const fn with_expected_groups(mut self, expected_groups: usize) -> Self {
        self.expected_groups = Some(expected_groups);
        self
    }

    /// Get the aggregation step.
    pub const fn step(&self) -> AggregationStep {
        self.step
    }

    /// Get the aggregations.
    pub fn aggregations(&self) -> &[Aggregation] {
        &self.aggregations
    }

    /// Derive the final-step factory consuming this partial step's output.
    pub fn final_from_partial(&self) -> QuarryResult<Self> {
        if self.step != AggregationStep::Partial {
            return Err(QuarryError::invalid_parameter(format!(
                "final_from_partial on a {} aggregation",
                self.step
            )));
        }
        let key_count = self.group_channels.len();
        let aggregations = self
            .aggregations
            .iter()
            .enumerate()
            .map(|(i, a)| Aggregation::over(a.function, key_count + i))
            .collect();

        let mut factory = Self::try_new(
            self.output_types.clone(),
            (0..key_count).collect(),
            AggregationStep::Final,
            aggregations,
        )?;
        factory.max_memory_bytes = self.max_memory_bytes;
        factory.expected_groups = self.expected_groups;
        Ok(factory)
    }
}

impl OperatorFactory for HashAggregationOperatorFactory {
    fn output_types(&self) -> &TypeDescriptor {
        &self.output_types
    }

    fn create_operator(&self, ctx: &DriverContext) -> QuarryResult<BoxedOperator> {
        let config = ctx.config().aggregation;
        let expected_groups = self.expected_groups.unwrap_or(config.expected_groups);
        let accumulators = self
            .aggregations
            .iter()
            .map(|a| new_accumulator(&self.input_types, self.step, a))
            .collect::<QuarryResult<Vec<_>>>()?;

        Ok(Box::new(HashAggregationOperator {
            context: ctx.add_operator_context("HashAggregationOperator"),
            input_types: self.input_types.clone(),
            step: self.step,
            aggregations: self.aggregations.clone(),
            global: self.group_channels.is_empty(),
            max_memory_bytes: self.max_memory_bytes.or(config.max_memory_bytes),
            page_builder: PageBuilder::new(self.output_types.clone(), &ctx.config().page),
            state: AggregationState::Consuming {
                hash: GroupByHash::try_new(
                    &self.input_types,
                    self.group_channels.clone(),
                    expected_groups,
                )?,
                accumulators,
            },
        }))
    }
}

fn new_accumulator(
    input_types: &TypeDescriptor,
    step: AggregationStep,
    aggregation: &Aggregation,
) -> QuarryResult<Box<dyn GroupedAccumulator>> {
    let channel_type = aggregation
        .input_channel
        .map(|c| input_types.channel(c))
        .transpose()?;
    create_accumulator(aggregation.function, step, channel_type)
}

#[derive(Debug)]
enum AggregationState {
    /// Taking input.
    Consuming {
        hash: GroupByHash,
        accumulators: Vec<Box<dyn GroupedAccumulator>>,
    },
    /// Input finished; streaming groups out.
    Emitting {
        keys: GroupKeys,
        accumulators: Vec<Box<dyn GroupedAccumulator>>,
        next_group: usize,
    },
    Finished,
    /// Aborted on an input or memory error. No output.
    Failed,
}

/// Groups rows by key columns and aggregates each group.
///
/// Blocking: nothing is emitted before `finish`. Afterwards the groups are
/// streamed out in first-seen order, one builder-full page per
/// `get_output` call.
///
/// After every input page the operator re-estimates its footprint and
/// resizes its reservation. Going over its own budget or the pipeline
/// limit fails with `ResourceExhausted`. On that or any other error while
/// consuming a page the state is dropped and the operator reports itself
/// finished without output.
#[derive(Debug)]
pub struct HashAggregationOperator {
    context: OperatorContext,
    input_types: TypeDescriptor,
    step: AggregationStep,
    aggregations: Vec<Aggregation>,
    global: bool,
    max_memory_bytes: Option<usize>,
    page_builder: PageBuilder,
    state: AggregationState,
}

impl HashAggregationOperator {
    fn accumulate(&mut self, page: &Page) -> QuarryResult<usize> {
        let AggregationState::Consuming { hash, accumulators } = &mut self.state else {
            return Err(QuarryError::illegal_state(
                "HashAggregationOperator does not need input",
            ));
        };

        let group_ids = hash.get_group_ids(page)?;
        for (aggregation, accumulator) in self.aggregations.iter().zip(accumulators.iter_mut()) {
            accumulator.ensure_group_count(hash.group_count());
            let block = aggregation
                .input_channel
                .map(|c| page.block(c))
                .transpose()?;
            match (self.step.is_input_raw(), block) {
                (true, block) => accumulator.add_input(&group_ids, block)?,
                (false, Some(block)) => accumulator.add_intermediate(&group_ids, block)?,
                (false, None) => {
                    return Err(QuarryError::internal(format!(
                        "final {aggregation} without intermediate channel"
                    )));
                }
            }
        }

        Ok(hash.estimated_size()
            + accumulators
                .iter()
                .map(|a| a.estimated_size())
                .sum::<usize>())
    }

    fn reserve(&mut self, bytes: usize) -> QuarryResult<()> {
        if let Some(max) = self.max_memory_bytes {
            if bytes > max {
                return Err(QuarryError::resource_exhausted(format!(
                    "aggregation needs {bytes} bytes, budget is {max}"
                )));
            }
        }
        self.context.set_memory_reservation(bytes)
    }

    fn abort(&mut self, error: &QuarryError) {
        warn!(
            "HashAggregationOperator {} aborted: {error}",
            self.context.operator_id()
        );
        self.state = AggregationState::Failed;
        self.page_builder.reset();
        self.context.free_memory();
    }
}

impl Operator for HashAggregationOperator {
    fn operator_context(&self) -> &OperatorContext {
        &self.context
    }

    fn output_types(&self) -> &TypeDescriptor {
        self.page_builder.types()
    }

    fn needs_input(&self) -> bool {
        matches!(self.state, AggregationState::Consuming { .. })
    }

    fn add_input(&mut self, page: Page) -> QuarryResult<()> {
        if !self.needs_input() {
            return Err(QuarryError::illegal_state(
                "HashAggregationOperator does not need input",
            ));
        }
        page.ensure_types(&self.input_types)?;

        let outcome = self
            .accumulate(&page)
            .and_then(|estimated| self.reserve(estimated));
        if let Err(error) = outcome {
            self.abort(&error);
            return Err(error);
        }
        Ok(())
    }

    fn get_output(&mut self) -> QuarryResult<Option<Page>> {
        let AggregationState::Emitting {
            keys,
            accumulators,
            next_group,
        } = &mut self.state
        else {
            return Ok(None);
        };

        let key_count = keys.key_count();
        let partial = self.step.is_output_partial();
        while *next_group < keys.len() && !self.page_builder.is_full() {
            keys.append_key(*next_group, &mut self.page_builder)?;
            for (i, accumulator) in accumulators.iter().enumerate() {
                if partial {
                    accumulator.evaluate_intermediate(
                        *next_group,
                        &mut self.page_builder,
                        key_count + i,
                    )?;
                } else {
                    accumulator.evaluate_final(*next_group, &mut self.page_builder, key_count + i)?;
                }
            }
            *next_group += 1;
        }

        if *next_group == keys.len() {
            debug!(
                "HashAggregationOperator {} emitted {} groups",
                self.context.operator_id(),
                keys.len()
            );
            self.state = AggregationState::Finished;
            self.context.free_memory();
        }
        if self.page_builder.is_empty() {
            return Ok(None);
        }
        self.page_builder.build().map(Some)
    }

    fn finish(&mut self) {
        let state = std::mem::replace(&mut self.state, AggregationState::Finished);
        self.state = match state {
            AggregationState::Consuming {
                mut hash,
                mut accumulators,
            } => {
                if self.global {
                    hash.ensure_global_group();
                }
                for accumulator in &mut accumulators {
                    accumulator.ensure_group_count(hash.group_count());
                }
                debug!(
                    "HashAggregationOperator {} ({}) finishing with {} groups",
                    self.context.operator_id(),
                    self.step,
                    hash.group_count()
                );
                AggregationState::Emitting {
                    keys: hash.into_keys(),
                    accumulators,
                    next_group: 0,
                }
            }
            other => other,
        };
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.state,
            AggregationState::Finished | AggregationState::Failed
        ) && self.page_builder.is_empty()
    }
}
