//! Grouped aggregation.
//!
//! Aggregations can run in one step (`Single`) or be split into a
//! `Partial` step per driver and a `Final` step merging the partial
//! results. The intermediate state of every function is an ordinary column,
//! so partial output can travel between drivers as plain pages.

mod accumulator;
mod function;
mod group_by;
mod operator;

pub use accumulator::{AVG_STATE_SIZE, GroupedAccumulator, create_accumulator};
pub use function::{Aggregation, AggregationFunction, AggregationStep};
pub use group_by::{GroupByHash, GroupKeys};
pub use operator::{HashAggregationOperator, HashAggregationOperatorFactory};
