//! Pull-driven execution engine for Quarry.
//!
//! This crate runs chains of operators over Quarry pages. Operators never
//! call each other: a driver moves pages between adjacent operators, one
//! pass at a time, until the whole chain reports finished.

#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)] // Counters and sizes are cast on purpose
#![allow(clippy::missing_const_for_fn)] // Builder patterns often can't be const
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't always need must_use
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  instantiate  ┌────────────────────────────────────────┐
//! │   Pipeline   │ ────────────▶ │ Driver                                 │
//! │ (factories)  │               │  Alignment ─▶ FilterProject ─▶ HashAgg │
//! └──────────────┘               └────────────────────────────────────────┘
//!                                                 │
//!                                                 ▼
//!                                           DriverResult
//! ```
//!
//! # Key Components
//!
//! ## Operators ([`operators`], [`aggregation`])
//!
//! All operators implement the [`Operator`] contract and are created per
//! driver by an [`OperatorFactory`]:
//!
//! - **Source**: [`AlignmentOperator`] zips independent column sources
//! - **Streaming**: [`FilterProjectOperator`] runs a [`PageProcessor`]
//! - **Blocking**: [`HashAggregationOperator`] groups and aggregates, in
//!   single, partial or final steps
//!
//! ## Execution ([`driver`], [`context`])
//!
//! - [`Pipeline`]: immutable chain of factories, shared between drivers
//! - [`Driver`]: owns one operator chain and moves pages through it
//! - [`DriverContext`]: runtime config, memory manager, metrics sink and
//!   cancellation signal for one driver
//!
//! ## Resources ([`memory`], [`metrics`])
//!
//! - [`TrackingMemoryManager`]: pipeline-wide memory limit
//! - [`MetricsSink`]: per-operator stats collected at the end of a run
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quarry_engine::{
//!     Aggregation, AggregationStep, AlignmentOperatorFactory, DriverContext,
//!     HashAggregationOperatorFactory, Pipeline, RuntimeConfig,
//! };
//!
//! let source = AlignmentOperatorFactory::from_provider(&provider, "lineitem", &["flag", "qty"])?;
//! let aggregate = HashAggregationOperatorFactory::try_new(
//!     source.output_types().clone(),
//!     vec![0],
//!     AggregationStep::Single,
//!     vec![Aggregation::sum(1), Aggregation::count_all()],
//! )?;
//! let pipeline = Pipeline::new(vec![Arc::new(source), Arc::new(aggregate)])?;
//! let result = pipeline
//!     .instantiate(DriverContext::new(RuntimeConfig::default()))?
//!     .run_to_completion()?;
//! ```

pub mod aggregation;
pub mod context;
pub mod driver;
pub mod memory;
pub mod metrics;
pub mod operators;

// Re-export commonly used types
pub use aggregation::{
    Aggregation, AggregationFunction, AggregationStep, HashAggregationOperator,
    HashAggregationOperatorFactory,
};
pub use context::{CancellationHandle, DriverContext, OperatorContext, RuntimeConfig};
pub use driver::{Driver, DriverResult, Pipeline, Progress};
pub use memory::{MemoryManager, MemoryReservation, NoopMemoryManager, TrackingMemoryManager};
pub use metrics::{ExecutionTimer, MetricsSink, OperatorStats};
pub use operators::{
    AlignmentOperator, AlignmentOperatorFactory, BlockedFuture, BoxedOperator, ChannelProjection,
    FilterProjectOperator, FilterProjectOperatorFactory, Operator, OperatorFactory, PageProcessor,
    not_blocked,
};
