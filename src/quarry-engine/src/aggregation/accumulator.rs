//! Grouped accumulators.
//!
//! An accumulator keeps one slot per group in plain vectors indexed by
//! group id. Raw input and intermediate input are separate entry points so
//! the same state serves every aggregation step.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::mem::size_of;

use arrow::array::{AsArray, BinaryArray, Float64Array, Int64Array};
use arrow::datatypes::{Float64Type, Int64Type};

use common_error::{QuarryError, QuarryResult};
use quarry_core::{Block, ColumnType, PageBuilder};

use super::{AggregationFunction, AggregationStep};

/// Byte length of the `avg` intermediate state: f64 sum then i64 count,
/// both little-endian.
pub const AVG_STATE_SIZE: usize = 16;

/// Per-group state of one aggregation.
pub trait GroupedAccumulator: Send + Debug {
    /// Type this accumulator emits for the partial step.
    fn intermediate_type(&self) -> ColumnType;

    /// Type this accumulator emits for the single and final steps.
    fn final_type(&self) -> ColumnType;

    /// Grow the state to hold `group_count` groups.
    fn ensure_group_count(&mut self, group_count: usize);

    /// Fold raw rows into their groups. `block` is `None` for `count(*)`.
    fn add_input(&mut self, group_ids: &[usize], block: Option<&Block>) -> QuarryResult<()>;

    /// Merge intermediate state rows into their groups.
    fn add_intermediate(&mut self, group_ids: &[usize], block: &Block) -> QuarryResult<()>;

    /// Append the intermediate state of `group_id` to `channel`.
    fn evaluate_intermediate(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()>;

    /// Append the final value of `group_id` to `channel`.
    fn evaluate_final(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()>;

    /// Estimated heap footprint.
    fn estimated_size(&self) -> usize;
}

/// Create the accumulator for `function` running as `step`.
///
/// `channel_type` is the type of the input channel: raw values for the
/// single and partial steps, intermediate state for the final step. It is
/// `None` only for raw `count(*)`.
pub fn create_accumulator(
    function: AggregationFunction,
    step: AggregationStep,
    channel_type: Option<ColumnType>,
) -> QuarryResult<Box<dyn GroupedAccumulator>> {
    use AggregationFunction::{Avg, Count, CountAll, Max, Min, Sum};

    if !step.is_input_raw() {
        let Some(channel_type) = channel_type else {
            return Err(QuarryError::invalid_parameter(format!(
                "{function} in the final step needs an intermediate channel"
            )));
        };
        let expected = match function {
            CountAll | Count => ColumnType::Int64,
            Avg => ColumnType::VarBinary,
            Sum | Min | Max if channel_type.is_numeric() => channel_type,
            Sum | Min | Max => ColumnType::Float64,
        };
        if channel_type != expected {
            return Err(QuarryError::type_error(format!(
                "final {function} expects {expected} intermediate state, got {channel_type}"
            )));
        }
    }

    let accumulator: Box<dyn GroupedAccumulator> = match (function, channel_type) {
        (CountAll, _) => Box::new(CountAccumulator::new(true)),
        (Count, Some(_)) => Box::new(CountAccumulator::new(false)),
        (Sum, Some(column_type)) => {
            function.check_input_type(column_type)?;
            Box::new(SumAccumulator::new(column_type))
        }
        (Avg, Some(column_type)) => {
            let input_type = if step.is_input_raw() {
                function.check_input_type(column_type)?;
                column_type
            } else {
                ColumnType::Float64
            };
            Box::new(AvgAccumulator::new(input_type))
        }
        (Min | Max, Some(column_type)) => {
            function.check_input_type(column_type)?;
            Box::new(ExtremeAccumulator::new(column_type, function == Max))
        }
        (function, None) => {
            return Err(QuarryError::invalid_parameter(format!(
                "{function} needs an input channel"
            )));
        }
    };
    Ok(accumulator)
}

fn int64_array(block: &Block) -> QuarryResult<&Int64Array> {
    block
        .array()
        .as_primitive_opt::<Int64Type>()
        .ok_or_else(|| mismatched(block, ColumnType::Int64))
}

fn float64_array(block: &Block) -> QuarryResult<&Float64Array> {
    block
        .array()
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| mismatched(block, ColumnType::Float64))
}

fn binary_array(block: &Block) -> QuarryResult<&BinaryArray> {
    block
        .array()
        .as_binary_opt::<i32>()
        .ok_or_else(|| mismatched(block, ColumnType::VarBinary))
}

fn mismatched(block: &Block, expected: ColumnType) -> QuarryError {
    QuarryError::type_error(format!(
        "accumulator expects {expected} input, got {}",
        block.column_type()
    ))
}

fn checked_sum(left: i64, right: i64) -> QuarryResult<i64> {
    left.checked_add(right)
        .ok_or_else(|| QuarryError::value_error(format!("bigint overflow: {left} + {right}")))
}

// ============================================================================
// count
// ============================================================================

#[derive(Debug)]
struct CountAccumulator {
    count_all: bool,
    counts: Vec<i64>,
}

impl CountAccumulator {
    const fn new(count_all: bool) -> Self {
        Self {
            count_all,
            counts: Vec::new(),
        }
    }
}

impl GroupedAccumulator for CountAccumulator {
    fn intermediate_type(&self) -> ColumnType {
        ColumnType::Int64
    }

    fn final_type(&self) -> ColumnType {
        ColumnType::Int64
    }

    fn ensure_group_count(&mut self, group_count: usize) {
        if self.counts.len() < group_count {
            self.counts.resize(group_count, 0);
        }
    }

    fn add_input(&mut self, group_ids: &[usize], block: Option<&Block>) -> QuarryResult<()> {
        match block {
            Some(block) if !self.count_all => {
                for (position, &group_id) in group_ids.iter().enumerate() {
                    if !block.is_null(position)? {
                        self.counts[group_id] += 1;
                    }
                }
            }
            _ => {
                for &group_id in group_ids {
                    self.counts[group_id] += 1;
                }
            }
        }
        Ok(())
    }

    fn add_intermediate(&mut self, group_ids: &[usize], block: &Block) -> QuarryResult<()> {
        let counts = int64_array(block)?;
        for (count, &group_id) in counts.iter().zip(group_ids) {
            if let Some(count) = count {
                self.counts[group_id] = checked_sum(self.counts[group_id], count)?;
            }
        }
        Ok(())
    }

    fn evaluate_intermediate(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()> {
        self.evaluate_final(group_id, builder, channel)
    }

    fn evaluate_final(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()> {
        builder.append_i64(channel, self.counts[group_id])
    }

    fn estimated_size(&self) -> usize {
        self.counts.capacity() * size_of::<i64>()
    }
}

// ============================================================================
// sum
// ============================================================================

#[derive(Debug)]
enum NumericSlots {
    Int64(Vec<i64>),
    Float64(Vec<f64>),
}

impl NumericSlots {
    const fn new(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Int64 => Self::Int64(Vec::new()),
            _ => Self::Float64(Vec::new()),
        }
    }

    const fn column_type(&self) -> ColumnType {
        match self {
            Self::Int64(_) => ColumnType::Int64,
            Self::Float64(_) => ColumnType::Float64,
        }
    }

    fn resize(&mut self, group_count: usize) {
        match self {
            Self::Int64(slots) => slots.resize(group_count, 0),
            Self::Float64(slots) => slots.resize(group_count, 0.0),
        }
    }

    fn capacity_bytes(&self) -> usize {
        match self {
            Self::Int64(slots) => slots.capacity() * size_of::<i64>(),
            Self::Float64(slots) => slots.capacity() * size_of::<f64>(),
        }
    }

    fn append(&self, group_id: usize, builder: &mut PageBuilder, channel: usize) -> QuarryResult<()> {
        match self {
            Self::Int64(slots) => builder.append_i64(channel, slots[group_id]),
            Self::Float64(slots) => builder.append_f64(channel, slots[group_id]),
        }
    }
}

#[derive(Debug)]
struct SumAccumulator {
    sums: NumericSlots,
    has_value: Vec<bool>,
}

impl SumAccumulator {
    const fn new(column_type: ColumnType) -> Self {
        Self {
            sums: NumericSlots::new(column_type),
            has_value: Vec::new(),
        }
    }
}

impl GroupedAccumulator for SumAccumulator {
    fn intermediate_type(&self) -> ColumnType {
        self.sums.column_type()
    }

    fn final_type(&self) -> ColumnType {
        self.sums.column_type()
    }

    fn ensure_group_count(&mut self, group_count: usize) {
        if self.has_value.len() < group_count {
            self.has_value.resize(group_count, false);
            self.sums.resize(group_count);
        }
    }

    fn add_input(&mut self, group_ids: &[usize], block: Option<&Block>) -> QuarryResult<()> {
        let Some(block) = block else {
            return Err(QuarryError::internal("sum without input channel"));
        };
        match &mut self.sums {
            NumericSlots::Int64(sums) => {
                for (value, &group_id) in int64_array(block)?.iter().zip(group_ids) {
                    if let Some(value) = value {
                        sums[group_id] = checked_sum(sums[group_id], value)?;
                        self.has_value[group_id] = true;
                    }
                }
            }
            NumericSlots::Float64(sums) => {
                for (value, &group_id) in float64_array(block)?.iter().zip(group_ids) {
                    if let Some(value) = value {
                        sums[group_id] += value;
                        self.has_value[group_id] = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn add_intermediate(&mut self, group_ids: &[usize], block: &Block) -> QuarryResult<()> {
        self.add_input(group_ids, Some(block))
    }

    fn evaluate_intermediate(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()> {
        self.evaluate_final(group_id, builder, channel)
    }

    fn evaluate_final(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()> {
        if self.has_value[group_id] {
            self.sums.append(group_id, builder, channel)
        } else {
            builder.append_null(channel)
        }
    }

    fn estimated_size(&self) -> usize {
        self.sums.capacity_bytes() + self.has_value.capacity()
    }
}

// ============================================================================
// avg
// ============================================================================

#[derive(Debug)]
struct AvgAccumulator {
    input_type: ColumnType,
    sums: Vec<f64>,
    counts: Vec<i64>,
}

impl AvgAccumulator {
    const fn new(input_type: ColumnType) -> Self {
        Self {
            input_type,
            sums: Vec::new(),
            counts: Vec::new(),
        }
    }

    fn add(&mut self, group_id: usize, value: f64) {
        self.sums[group_id] += value;
        self.counts[group_id] += 1;
    }
}

impl GroupedAccumulator for AvgAccumulator {
    fn intermediate_type(&self) -> ColumnType {
        ColumnType::VarBinary
    }

    fn final_type(&self) -> ColumnType {
        ColumnType::Float64
    }

    fn ensure_group_count(&mut self, group_count: usize) {
        if self.counts.len() < group_count {
            self.sums.resize(group_count, 0.0);
            self.counts.resize(group_count, 0);
        }
    }

    fn add_input(&mut self, group_ids: &[usize], block: Option<&Block>) -> QuarryResult<()> {
        let Some(block) = block else {
            return Err(QuarryError::internal("avg without input channel"));
        };
        match self.input_type {
            ColumnType::Int64 => {
                for (value, &group_id) in int64_array(block)?.iter().zip(group_ids) {
                    if let Some(value) = value {
                        self.add(group_id, value as f64);
                    }
                }
            }
            _ => {
                for (value, &group_id) in float64_array(block)?.iter().zip(group_ids) {
                    if let Some(value) = value {
                        self.add(group_id, value);
                    }
                }
            }
        }
        Ok(())
    }

    fn add_intermediate(&mut self, group_ids: &[usize], block: &Block) -> QuarryResult<()> {
        for (state, &group_id) in binary_array(block)?.iter().zip(group_ids) {
            let Some(state) = state else {
                continue;
            };
            if state.len() != AVG_STATE_SIZE {
                return Err(QuarryError::value_error(format!(
                    "avg state of {} bytes, expected {AVG_STATE_SIZE}",
                    state.len()
                )));
            }
            let (sum, count) = state.split_at(8);
            let mut sum_bytes = [0; 8];
            sum_bytes.copy_from_slice(sum);
            let mut count_bytes = [0; 8];
            count_bytes.copy_from_slice(count);

            self.sums[group_id] += f64::from_le_bytes(sum_bytes);
            self.counts[group_id] =
                checked_sum(self.counts[group_id], i64::from_le_bytes(count_bytes))?;
        }
        Ok(())
    }

    fn evaluate_intermediate(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()> {
        let mut state = [0; AVG_STATE_SIZE];
        state[..8].copy_from_slice(&self.sums[group_id].to_le_bytes());
        state[8..].copy_from_slice(&self.counts[group_id].to_le_bytes());
        builder.append_bytes(channel, &state)
    }

    fn evaluate_final(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()> {
        match self.counts[group_id] {
            0 => builder.append_null(channel),
            count => builder.append_f64(channel, self.sums[group_id] / count as f64),
        }
    }

    fn estimated_size(&self) -> usize {
        self.sums.capacity() * size_of::<f64>() + self.counts.capacity() * size_of::<i64>()
    }
}

// ============================================================================
// min / max
// ============================================================================

#[derive(Debug)]
struct ExtremeAccumulator {
    is_max: bool,
    values: NumericSlots,
    has_value: Vec<bool>,
}

impl ExtremeAccumulator {
    const fn new(column_type: ColumnType, is_max: bool) -> Self {
        Self {
            is_max,
            values: NumericSlots::new(column_type),
            has_value: Vec::new(),
        }
    }
}

impl GroupedAccumulator for ExtremeAccumulator {
    fn intermediate_type(&self) -> ColumnType {
        self.values.column_type()
    }

    fn final_type(&self) -> ColumnType {
        self.values.column_type()
    }

    fn ensure_group_count(&mut self, group_count: usize) {
        if self.has_value.len() < group_count {
            self.has_value.resize(group_count, false);
            self.values.resize(group_count);
        }
    }

    fn add_input(&mut self, group_ids: &[usize], block: Option<&Block>) -> QuarryResult<()> {
        let Some(block) = block else {
            return Err(QuarryError::internal("min/max without input channel"));
        };
        let is_max = self.is_max;
        match &mut self.values {
            NumericSlots::Int64(values) => {
                for (value, &group_id) in int64_array(block)?.iter().zip(group_ids) {
                    let Some(value) = value else { continue };
                    let current = &mut values[group_id];
                    let replace = match value.cmp(current) {
                        Ordering::Greater => is_max,
                        Ordering::Less => !is_max,
                        Ordering::Equal => false,
                    };
                    if !self.has_value[group_id] || replace {
                        *current = value;
                        self.has_value[group_id] = true;
                    }
                }
            }
            NumericSlots::Float64(values) => {
                for (value, &group_id) in float64_array(block)?.iter().zip(group_ids) {
                    let Some(value) = value else { continue };
                    let current = &mut values[group_id];
                    let replace = match value.total_cmp(current) {
                        Ordering::Greater => is_max,
                        Ordering::Less => !is_max,
                        Ordering::Equal => false,
                    };
                    if !self.has_value[group_id] || replace {
                        *current = value;
                        self.has_value[group_id] = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn add_intermediate(&mut self, group_ids: &[usize], block: &Block) -> QuarryResult<()> {
        self.add_input(group_ids, Some(block))
    }

    fn evaluate_intermediate(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()> {
        self.evaluate_final(group_id, builder, channel)
    }

    fn evaluate_final(
        &self,
        group_id: usize,
        builder: &mut PageBuilder,
        channel: usize,
    ) -> QuarryResult<()> {
        if self.has_value[group_id] {
            self.values.append(group_id, builder, channel)
        } else {
            builder.append_null(channel)
        }
    }

    fn estimated_size(&self) -> usize {
        self.values.capacity_bytes() + self.has_value.capacity()
    }
}
