//! Aggregation functions and steps.

use serde::{Deserialize, Serialize};

use common_error::{QuarryError, QuarryResult};
use quarry_core::ColumnType;

/// Where an aggregation runs in a partial/final split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationStep {
    /// Raw rows in, final values out.
    Single,
    /// Raw rows in, mergeable intermediate state out.
    Partial,
    /// Intermediate state in, final values out.
    Final,
}

impl AggregationStep {
    /// Check if this step consumes raw input rows.
    pub const fn is_input_raw(&self) -> bool {
        matches!(self, Self::Single | Self::Partial)
    }

    /// Check if this step emits intermediate state.
    pub const fn is_output_partial(&self) -> bool {
        matches!(self, Self::Partial)
    }
}

impl std::fmt::Display for AggregationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "SINGLE"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Final => write!(f, "FINAL"),
        }
    }
}

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationFunction {
    /// `count(*)`: every row.
    CountAll,
    /// `count(c)`: non-null rows of a channel.
    Count,
    /// Sum of non-null values.
    Sum,
    /// Mean of non-null values.
    Avg,
    /// Smallest non-null value.
    Min,
    /// Largest non-null value.
    Max,
}

impl AggregationFunction {
    /// Type of the intermediate state for raw input of `input_type`.
    pub const fn intermediate_type(&self, input_type: ColumnType) -> ColumnType {
        match self {
            Self::CountAll | Self::Count => ColumnType::Int64,
            Self::Avg => ColumnType::VarBinary,
            Self::Sum | Self::Min | Self::Max => input_type,
        }
    }

    /// Type of the final value for raw input of `input_type`.
    pub const fn final_type(&self, input_type: ColumnType) -> ColumnType {
        match self {
            Self::CountAll | Self::Count => ColumnType::Int64,
            Self::Avg => ColumnType::Float64,
            Self::Sum | Self::Min | Self::Max => input_type,
        }
    }

    /// Get the function name for display.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CountAll | Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// Check that raw input of `input_type` is accepted.
    pub fn check_input_type(&self, input_type: ColumnType) -> QuarryResult<()> {
        match self {
            Self::CountAll | Self::Count => Ok(()),
            Self::Sum | Self::Avg | Self::Min | Self::Max if input_type.is_numeric() => Ok(()),
            _ => Err(QuarryError::type_error(format!(
                "{}({input_type}) is not supported",
                self.name()
            ))),
        }
    }
}

impl std::fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One aggregate over one input channel.
///
/// For raw steps the channel holds the values to aggregate (and is ignored
/// by `count(*)`). For the final step it holds the intermediate state
/// produced by the partial step, for every function including `count(*)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregation {
    /// The function.
    pub function: AggregationFunction,
    /// Input channel, `None` only for raw `count(*)`.
    pub input_channel: Option<usize>,
}

impl Aggregation {
    /// `count(*)`.
    pub const fn count_all() -> Self {
        Self {
            function: AggregationFunction::CountAll,
            input_channel: None,
        }
    }

    /// `count(channel)`.
    pub const fn count(channel: usize) -> Self {
        Self::over(AggregationFunction::Count, channel)
    }

    /// `sum(channel)`.
    pub const fn sum(channel: usize) -> Self {
        Self::over(AggregationFunction::Sum, channel)
    }

    /// `avg(channel)`.
    pub const fn avg(channel: usize) -> Self {
        Self::over(AggregationFunction::Avg, channel)
    }

    /// `min(channel)`.
    pub const fn min(channel: usize) -> Self {
        Self::over(AggregationFunction::Min, channel)
    }

    /// `max(channel)`.
    pub const fn max(channel: usize) -> Self {
        Self::over(AggregationFunction::Max, channel)
    }

    /// `function` over `channel`.
    pub const fn over(function: AggregationFunction, channel: usize) -> Self {
        Self {
            function,
            input_channel: Some(channel),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.function, self.input_channel) {
            (AggregationFunction::CountAll, _) => write!(f, "count(*)"),
            (function, Some(channel)) => write!(f, "{function}(#{channel})"),
            (function, None) => write!(f, "{function}()"),
        }
    }
}
