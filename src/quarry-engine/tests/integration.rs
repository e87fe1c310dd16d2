//! Integration tests for the quarry-engine crate.
//!
//! These tests run whole pipelines through a driver:
//! - Column sources registered from Arrow record batches
//! - Alignment, filter/project and hash aggregation chained together
//! - Result, metrics and failure verification
//!
//! ## Test Categories
//!
//! 1. **Pipeline Tests**: end-to-end queries
//! 2. **Aggregation Steps**: partial/final composition
//! 3. **Failure Tests**: alignment, memory and cancellation

use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use proptest::prelude::*;

use common_error::{QuarryError, QuarryResult};
use quarry_core::{
    Block, BlockIterable, ColumnType, InMemoryBlockIterable, InMemoryColumnProvider, Page,
    PageBuilder, TypeDescriptor, Value,
};
use quarry_engine::{
    Aggregation, AggregationStep, AlignmentOperatorFactory, CancellationHandle, DriverContext,
    DriverResult, FilterProjectOperatorFactory, HashAggregationOperatorFactory, MemoryManager,
    MetricsSink, OperatorFactory, PageProcessor, Pipeline, Progress, RuntimeConfig,
};

// ============================================================================
// Helpers
// ============================================================================

const LINEITEM_COLUMNS: [&str; 6] = [
    "returnflag",
    "quantity",
    "extendedprice",
    "discount",
    "tax",
    "shipdate",
];

/// Register a `lineitem` table with one record batch per row.
fn lineitem_provider(rows: &[(&str, f64, f64, f64, f64, &str)]) -> InMemoryColumnProvider {
    let schema = Arc::new(Schema::new(
        LINEITEM_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let data_type = if i == 0 || i == 5 {
                    DataType::Binary
                } else {
                    DataType::Float64
                };
                Field::new(*name, data_type, true)
            })
            .collect::<Vec<_>>(),
    ));

    let batches: Vec<RecordBatch> = rows
        .chunks(1)
        .map(|chunk| {
            let columns: Vec<ArrayRef> = vec![
                Arc::new(BinaryArray::from_iter_values(chunk.iter().map(|r| r.0))),
                Arc::new(Float64Array::from_iter_values(chunk.iter().map(|r| r.1))),
                Arc::new(Float64Array::from_iter_values(chunk.iter().map(|r| r.2))),
                Arc::new(Float64Array::from_iter_values(chunk.iter().map(|r| r.3))),
                Arc::new(Float64Array::from_iter_values(chunk.iter().map(|r| r.4))),
                Arc::new(BinaryArray::from_iter_values(chunk.iter().map(|r| r.5))),
            ];
            RecordBatch::try_new(Arc::clone(&schema), columns).unwrap()
        })
        .collect();

    let mut provider = InMemoryColumnProvider::new();
    provider.register_batches("lineitem", &batches).unwrap();
    provider
}

/// Keeps rows shipped on or before a date and drops the date column.
#[derive(Debug)]
struct ShipDateFilter {
    cutoff: &'static [u8],
    output_types: TypeDescriptor,
}

impl ShipDateFilter {
    const SHIPDATE: usize = 5;

    fn new(cutoff: &'static str) -> Self {
        Self {
            cutoff: cutoff.as_bytes(),
            output_types: TypeDescriptor::new([
                ColumnType::VarBinary,
                ColumnType::Float64,
                ColumnType::Float64,
                ColumnType::Float64,
                ColumnType::Float64,
            ]),
        }
    }
}

impl PageProcessor for ShipDateFilter {
    fn output_types(&self) -> &TypeDescriptor {
        &self.output_types
    }

    fn process(
        &self,
        page: &Page,
        start: usize,
        builder: &mut PageBuilder,
    ) -> QuarryResult<usize> {
        let shipdate = page.block(Self::SHIPDATE)?;
        let mut position = start;
        while position < page.position_count() && !builder.is_full() {
            if !shipdate.is_null(position)? && shipdate.get_bytes(position)? <= self.cutoff {
                for channel in 0..self.output_types.len() {
                    builder.append_from_block(channel, page.block(channel)?, position)?;
                }
            }
            position += 1;
        }
        Ok(position)
    }
}

fn q1_pipeline(provider: &InMemoryColumnProvider) -> QuarryResult<Pipeline> {
    let scan = AlignmentOperatorFactory::from_provider(provider, "lineitem", &LINEITEM_COLUMNS)?;
    let filter = FilterProjectOperatorFactory::new(
        scan.output_types().clone(),
        Arc::new(ShipDateFilter::new("1998-09-02")),
    );
    let aggregate = HashAggregationOperatorFactory::try_new(
        filter.output_types().clone(),
        vec![0],
        AggregationStep::Single,
        vec![
            Aggregation::sum(1),
            Aggregation::sum(2),
            Aggregation::avg(3),
            Aggregation::count_all(),
        ],
    )?;
    Pipeline::new(vec![Arc::new(scan), Arc::new(filter), Arc::new(aggregate)])
}

/// Source replaying `pages` as column sources.
fn replay(types: &TypeDescriptor, pages: &[Page]) -> AlignmentOperatorFactory {
    let sources = types
        .iter()
        .enumerate()
        .map(|(channel, column_type)| {
            let blocks = pages
                .iter()
                .map(|page| page.block(channel).unwrap().clone())
                .collect();
            Arc::new(InMemoryBlockIterable::try_new(column_type, blocks).unwrap())
                as Arc<dyn BlockIterable>
        })
        .collect();
    AlignmentOperatorFactory::try_new(types.clone(), sources).unwrap()
}

fn aggregate_pages(
    types: &TypeDescriptor,
    pages: &[Page],
    aggregate: &HashAggregationOperatorFactory,
) -> QuarryResult<DriverResult> {
    Pipeline::new(vec![
        Arc::new(replay(types, pages)),
        Arc::new(aggregate.clone()),
    ])?
    .instantiate(DriverContext::default())?
    .run_to_completion()
}

fn keyed_types() -> TypeDescriptor {
    TypeDescriptor::new([ColumnType::Int64, ColumnType::Int64, ColumnType::Float64])
}

fn keyed_page(rows: &[(i64, Option<i64>, Option<f64>)]) -> Page {
    Page::try_new(vec![
        Block::from_i64s(rows.iter().map(|r| Some(r.0))),
        Block::from_i64s(rows.iter().map(|r| r.1)),
        Block::from_f64s(rows.iter().map(|r| r.2)),
    ])
    .unwrap()
}

fn keyed_aggregations() -> Vec<Aggregation> {
    vec![
        Aggregation::sum(1),
        Aggregation::avg(2),
        Aggregation::count_all(),
        Aggregation::count(2),
        Aggregation::min(1),
        Aggregation::max(2),
    ]
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[test]
fn test_q1_filter_then_aggregate() {
    let provider = lineitem_provider(&[
        ("A", 10.0, 100.0, 0.1, 0.05, "1998-01-01"),
        ("A", 5.0, 50.0, 0.2, 0.0, "1999-01-01"),
    ]);
    let result = q1_pipeline(&provider)
        .unwrap()
        .instantiate(DriverContext::default())
        .unwrap()
        .run_to_completion()
        .unwrap();

    assert_eq!(
        result.rows().unwrap(),
        vec![vec![
            Value::from("A"),
            Value::Float64(10.0),
            Value::Float64(100.0),
            Value::Float64(0.1),
            Value::Int64(1),
        ]]
    );
    assert_eq!(result.types.len(), 5);
}

#[test]
fn test_q1_groups_in_first_seen_order() {
    let provider = lineitem_provider(&[
        ("R", 1.0, 10.0, 0.0, 0.0, "1995-01-01"),
        ("A", 2.0, 20.0, 0.0, 0.0, "1995-01-01"),
        ("R", 3.0, 30.0, 0.0, 0.0, "1995-01-01"),
        ("N", 4.0, 40.0, 0.0, 0.0, "1998-09-03"),
    ]);
    let result = q1_pipeline(&provider)
        .unwrap()
        .instantiate(DriverContext::default())
        .unwrap()
        .run_to_completion()
        .unwrap();

    let rows = result.rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Value::from("R"));
    assert_eq!(rows[0][1], Value::Float64(4.0));
    assert_eq!(rows[0][4], Value::Int64(2));
    assert_eq!(rows[1][0], Value::from("A"));
}

#[test]
fn test_driver_records_stats() {
    let provider = lineitem_provider(&[
        ("A", 10.0, 100.0, 0.1, 0.05, "1998-01-01"),
        ("A", 5.0, 50.0, 0.2, 0.0, "1999-01-01"),
    ]);
    let sink = MetricsSink::new();
    let ctx = DriverContext::default().with_metrics(sink.clone());
    let result = q1_pipeline(&provider)
        .unwrap()
        .instantiate(ctx)
        .unwrap()
        .run_to_completion()
        .unwrap();

    let stats = sink.all();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats[0].operator_type, "AlignmentOperator");
    assert_eq!(stats[0].output_rows, 2);
    assert_eq!(stats[1].input_rows, 2);
    assert_eq!(stats[1].output_rows, 1);
    assert_eq!(stats[2].input_rows, 1);
    assert_eq!(stats[2].output_rows, 1);
    assert!(stats[2].peak_memory_reservation > 0);
    assert_eq!(result.stats, stats);
    assert!(sink.format_summary().contains("HashAggregationOperator"));
}

#[test]
fn test_process_steps_to_finished() {
    let types = TypeDescriptor::new([ColumnType::Int64]);
    let pages = vec![Page::try_new(vec![Block::from_i64s([Some(1), Some(2)])]).unwrap()];
    let pipeline = Pipeline::new(vec![Arc::new(replay(&types, &pages))]).unwrap();
    assert_eq!(pipeline.output_types(), &types);

    let mut driver = pipeline.instantiate(DriverContext::default()).unwrap();
    assert!(matches!(driver.process().unwrap(), Progress::Moved | Progress::Finished));
    while !driver.process().unwrap().is_finished() {}
    assert!(driver.is_finished());
    assert!(driver.process().unwrap().is_finished());

    let output = driver.take_output();
    assert_eq!(output.iter().map(Page::position_count).sum::<usize>(), 2);
}

#[test]
fn test_global_aggregation_over_empty_source() {
    let aggregate = HashAggregationOperatorFactory::try_new(
        keyed_types(),
        vec![],
        AggregationStep::Single,
        keyed_aggregations(),
    )
    .unwrap();
    let result = aggregate_pages(&keyed_types(), &[], &aggregate).unwrap();
    assert_eq!(
        result.rows().unwrap(),
        vec![vec![
            Value::Null,
            Value::Null,
            Value::Int64(0),
            Value::Int64(0),
            Value::Null,
            Value::Null,
        ]]
    );
}

#[test]
fn test_empty_pipeline_rejected() {
    assert!(matches!(
        Pipeline::new(vec![]).unwrap_err(),
        QuarryError::InvalidParameter(_)
    ));
}

// ============================================================================
// Aggregation Steps
// ============================================================================

#[test]
fn test_partial_final_matches_single() {
    let p1 = keyed_page(&[(1, Some(3), Some(1.0)), (2, None, Some(2.0)), (1, Some(4), None)]);
    let p2 = keyed_page(&[(3, Some(-1), None), (1, Some(5), Some(6.0))]);

    let single = HashAggregationOperatorFactory::try_new(
        keyed_types(),
        vec![0],
        AggregationStep::Single,
        keyed_aggregations(),
    )
    .unwrap();
    let partial = HashAggregationOperatorFactory::try_new(
        keyed_types(),
        vec![0],
        AggregationStep::Partial,
        keyed_aggregations(),
    )
    .unwrap();
    let fin = partial.final_from_partial().unwrap();

    let expected = aggregate_pages(&keyed_types(), &[p1.clone(), p2.clone()], &single).unwrap();
    let mut partial_pages = aggregate_pages(&keyed_types(), &[p1], &partial).unwrap().pages;
    partial_pages.extend(aggregate_pages(&keyed_types(), &[p2], &partial).unwrap().pages);
    let merged = aggregate_pages(partial.output_types(), &partial_pages, &fin).unwrap();

    assert_eq!(merged.rows().unwrap(), expected.rows().unwrap());
    assert_eq!(
        expected.rows().unwrap()[0],
        vec![
            Value::Int64(1),
            Value::Int64(12),
            Value::Float64(3.5),
            Value::Int64(3),
            Value::Int64(2),
            Value::Int64(3),
            Value::Float64(6.0),
        ]
    );
}

proptest! {
    #[test]
    fn prop_partial_final_equals_single(
        rows in prop::collection::vec(
            (0i64..6, prop::option::of(-1000i64..1000), prop::option::of(-1000i32..1000)),
            0..60,
        ),
        split in 0usize..60,
    ) {
        let rows: Vec<(i64, Option<i64>, Option<f64>)> = rows
            .into_iter()
            .map(|(k, a, b)| (k, a, b.map(f64::from)))
            .collect();
        let split = split.min(rows.len());
        let (left, right) = rows.split_at(split);

        let single = HashAggregationOperatorFactory::try_new(
            keyed_types(),
            vec![0],
            AggregationStep::Single,
            keyed_aggregations(),
        )
        .unwrap();
        let partial = HashAggregationOperatorFactory::try_new(
            keyed_types(),
            vec![0],
            AggregationStep::Partial,
            keyed_aggregations(),
        )
        .unwrap();
        let fin = partial.final_from_partial().unwrap();

        let left_pages: Vec<Page> = (!left.is_empty()).then(|| keyed_page(left)).into_iter().collect();
        let right_pages: Vec<Page> = (!right.is_empty()).then(|| keyed_page(right)).into_iter().collect();
        let all_pages: Vec<Page> = left_pages.iter().chain(&right_pages).cloned().collect();

        let expected = aggregate_pages(&keyed_types(), &all_pages, &single).unwrap();
        let mut partial_pages = aggregate_pages(&keyed_types(), &left_pages, &partial).unwrap().pages;
        partial_pages.extend(aggregate_pages(&keyed_types(), &right_pages, &partial).unwrap().pages);
        let merged = aggregate_pages(partial.output_types(), &partial_pages, &fin).unwrap();

        // distinct keys in first-seen order on both paths
        prop_assert_eq!(merged.rows().unwrap(), expected.rows().unwrap());
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
fn test_finish_is_idempotent_for_every_operator() {
    let provider = lineitem_provider(&[("A", 10.0, 100.0, 0.1, 0.05, "1998-01-01")]);
    let pipeline = q1_pipeline(&provider).unwrap();
    let ctx = DriverContext::default();

    for factory in pipeline.factories() {
        let mut once = factory.create_operator(&ctx).unwrap();
        let mut twice = factory.create_operator(&ctx).unwrap();
        once.finish();
        twice.finish();
        twice.finish();
        assert_eq!(once.needs_input(), twice.needs_input());
        assert!(!twice.needs_input());

        let mut drained_once = Vec::new();
        while !once.is_finished() {
            drained_once.extend(once.get_output().unwrap());
        }
        let mut drained_twice = Vec::new();
        while !twice.is_finished() {
            drained_twice.extend(twice.get_output().unwrap());
        }
        assert_eq!(drained_once.len(), drained_twice.len());
    }
}

#[test]
fn test_misaligned_sources_fail() {
    let mut provider = InMemoryColumnProvider::new();
    provider.register(
        "t",
        "a",
        Arc::new(
            InMemoryBlockIterable::try_new(
                ColumnType::Int64,
                vec![Block::from_i64s([Some(1), Some(2), Some(3)])],
            )
            .unwrap(),
        ),
    );
    provider.register(
        "t",
        "b",
        Arc::new(
            InMemoryBlockIterable::try_new(
                ColumnType::Int64,
                vec![Block::from_i64s([Some(1)]), Block::from_i64s([Some(2)])],
            )
            .unwrap(),
        ),
    );

    let scan = AlignmentOperatorFactory::from_provider(&provider, "t", &["a", "b"]).unwrap();
    let err = Pipeline::new(vec![Arc::new(scan)])
        .unwrap()
        .instantiate(DriverContext::default())
        .unwrap()
        .run_to_completion()
        .unwrap_err();
    assert!(matches!(err, QuarryError::SchemaError(_)));
    assert!(!err.is_usage_defect());
}

#[test]
fn test_pipeline_memory_limit() {
    let rows: Vec<_> = (0..2_000).map(|k| (k, Some(k), None)).collect();
    let aggregate = HashAggregationOperatorFactory::try_new(
        keyed_types(),
        vec![0],
        AggregationStep::Single,
        vec![Aggregation::count_all()],
    )
    .unwrap();
    let pipeline = Pipeline::new(vec![
        Arc::new(replay(&keyed_types(), &[keyed_page(&rows)])),
        Arc::new(aggregate),
    ])
    .unwrap();

    let sink = MetricsSink::new();
    let ctx = DriverContext::new(RuntimeConfig::default().with_memory_limit(4096))
        .with_metrics(sink.clone());
    let memory = ctx.memory_manager();
    let err = pipeline.instantiate(ctx).unwrap().run_to_completion().unwrap_err();

    assert!(err.is_resource_exhausted());
    assert_eq!(memory.used(), 0);
    assert_eq!(sink.all()[1].output_rows, 0);
}

#[test]
fn test_aggregation_budget_from_config() {
    let rows: Vec<_> = (0..500).map(|k| (k, None, None)).collect();
    let aggregate = HashAggregationOperatorFactory::try_new(
        keyed_types(),
        vec![0],
        AggregationStep::Single,
        vec![Aggregation::count_all()],
    )
    .unwrap();
    let pipeline = Pipeline::new(vec![
        Arc::new(replay(&keyed_types(), &[keyed_page(&rows)])),
        Arc::new(aggregate),
    ])
    .unwrap();

    let config = RuntimeConfig::default()
        .with_aggregation_budget(1024)
        .with_expected_groups(1);
    let err = pipeline
        .instantiate(DriverContext::new(config))
        .unwrap()
        .run_to_completion()
        .unwrap_err();
    assert!(matches!(err, QuarryError::ResourceExhausted(_)));
}

#[test]
fn test_cancelled_driver_stops() {
    let provider = lineitem_provider(&[("A", 10.0, 100.0, 0.1, 0.05, "1998-01-01")]);
    let (handle, rx) = CancellationHandle::new();
    let driver = q1_pipeline(&provider)
        .unwrap()
        .instantiate(DriverContext::default().with_cancellation(rx))
        .unwrap();

    handle.cancel();
    let err = driver.run_to_completion().unwrap_err();
    assert!(matches!(err, QuarryError::Cancelled(_)));
}
