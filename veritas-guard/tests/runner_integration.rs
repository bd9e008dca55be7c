//! End-to-end runner tests against the embedded engine.

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use std::time::Duration;
use veritas_guard::prelude::*;
use veritas_guard::validators::{
    ColumnNotNull, ColumnValueInSet, PrimaryKeyUniquenessValidator, RowCountValidator,
};

fn users_engine() -> Arc<dyn Engine> {
    let engine = FusionEngine::new();
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("status", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(StringArray::from(vec![
                Some("active"),
                Some("active"),
                Some("inactive"),
            ])),
        ],
    )
    .unwrap();
    engine.register_batch("users", batch).unwrap();
    Arc::new(engine)
}

fn nullable_engine(values: Vec<Option<i64>>) -> Arc<dyn Engine> {
    let engine = FusionEngine::new();
    let schema = Arc::new(Schema::new(vec![Field::new("c", DataType::Int64, true)]));
    let batch =
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap();
    engine.register_batch("t", batch).unwrap();
    Arc::new(engine)
}

fn single_engine(name: &str, engine: Arc<dyn Engine>) -> ValidationRunner {
    let mut engines = EngineMap::new();
    engines.insert(name.to_string(), engine);
    ValidationRunner::new(engines)
}

/// Two filtered metrics answered by one scan.
#[tokio::test]
async fn test_filtered_metrics_fused_into_one_statement() {
    let requests = vec![
        MetricRequest::new("row_cnt", "*", "total"),
        MetricRequest::new("row_cnt", "*", "active").with_filter("status = 'active'"),
    ];
    let builder = MetricBatchBuilder::new("users", requests);
    let sql = builder.sql(Dialect::DataFusion).unwrap();
    assert_eq!(
        sql,
        "SELECT COUNT(*) AS total, \
         SUM(CASE WHEN (status = 'active') THEN 1 ELSE 0 END) AS active \
         FROM users"
    );

    let engine = users_engine();
    let rows = engine.run_sql(&sql).await.unwrap();
    assert_eq!(rows.value(0, "total"), Some(&Scalar::Int(3)));
    assert_eq!(rows.value(0, "active"), Some(&Scalar::Int(2)));
}

#[tokio::test]
async fn test_not_null_pass() {
    let runner = single_engine("duck", nullable_engine(vec![Some(1), Some(2), Some(3)]));
    let bindings = vec![Binding::new("duck", "t", Arc::new(ColumnNotNull::new("c")))];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert_eq!(result.status, Status::Pass);
    assert_eq!(result.metric_values["null_cnt"], Scalar::Int(0));
    assert_eq!(result.column.as_deref(), Some("c"));
}

#[tokio::test]
async fn test_not_null_fail() {
    let runner = single_engine("duck", nullable_engine(vec![Some(1), None, Some(3)]));
    let bindings = vec![Binding::new("duck", "t", Arc::new(ColumnNotNull::new("c")))];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    assert_eq!(report.results[0].status, Status::Fail);
    assert_eq!(report.results[0].metric_values["null_cnt"], Scalar::Int(1));
}

#[tokio::test]
async fn test_row_count_bounds() {
    let runner = single_engine(
        "duck",
        nullable_engine(vec![Some(1), Some(2), Some(3), Some(4), Some(5)]),
    );
    let bindings = vec![
        Binding::new(
            "duck",
            "t",
            Arc::new(RowCountValidator::new(Some(1), Some(10))),
        ),
        Binding::new("duck", "t", Arc::new(RowCountValidator::new(Some(6), None))),
    ];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    assert_eq!(report.results[0].status, Status::Pass);
    assert_eq!(report.results[1].status, Status::Fail);
    assert_eq!(report.results[1].metric_values["row_cnt"], Scalar::Int(5));
}

#[tokio::test]
async fn test_primary_key_uniqueness_fail() {
    let engine = FusionEngine::new();
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 1, 2])),
            Arc::new(StringArray::from(vec!["a", "b", "c"])),
        ],
    )
    .unwrap();
    engine.register_batch("t", batch).unwrap();

    let runner = single_engine("duck", Arc::new(engine));
    let bindings = vec![Binding::new(
        "duck",
        "t",
        Arc::new(PrimaryKeyUniquenessValidator::new(["id"])),
    )];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    let result = &report.results[0];
    assert_eq!(result.status, Status::Fail);
    assert_eq!(result.metric_values["row_cnt"], Scalar::Int(3));
    assert_eq!(result.metric_values["distinct_cnt"], Scalar::Int(2));
}

/// An engine error on one binding never prevents the others from running.
#[tokio::test]
async fn test_engine_error_survives() {
    let runner = single_engine("duck", nullable_engine(vec![Some(1), Some(2)]));
    let bindings = vec![
        Binding::new("duck", "t", Arc::new(ColumnNotNull::new("c"))),
        Binding::new("duck", "missing", Arc::new(ColumnNotNull::new("c"))),
        Binding::new("duck", "t", Arc::new(RowCountValidator::new(Some(1), None))),
    ];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].status, Status::Pass);
    assert_eq!(report.results[1].status, Status::Error);
    assert!(report.results[1].error_message.is_some());
    assert_eq!(report.results[2].status, Status::Pass);
    // Order matches binding order even though execution was grouped.
    let indices: Vec<usize> = report.results.iter().map(|r| r.binding_ix).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_value_in_set_collects_error_rows() {
    let runner = single_engine("duck", users_engine());
    let bindings = vec![Binding::new(
        "duck",
        "users",
        Arc::new(ColumnValueInSet::new("status", ["active"], false)),
    )];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    let result = &report.results[0];
    assert_eq!(result.status, Status::Fail);
    let sample = result.error_sample.as_ref().unwrap();
    assert_eq!(sample.rows.len(), 1);
    assert!(!sample.truncated);
    assert_eq!(sample.rows[0]["status"], "inactive");
}

#[tokio::test]
async fn test_where_filter_restricts_metric() {
    let runner = single_engine("duck", users_engine());
    let bindings = vec![Binding::new(
        "duck",
        "users",
        Arc::new(RowCountValidator::with_options(
            Some(3),
            None,
            ValidatorOptions::new().with_where("status = 'active'"),
        )),
    )];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    // Only two active rows, bound asks for three.
    assert_eq!(report.results[0].status, Status::Fail);
    assert_eq!(report.results[0].metric_values["row_cnt"], Scalar::Int(2));
}

#[tokio::test]
async fn test_tight_timeout_produces_error_result() {
    let mut engines = EngineMap::new();
    engines.insert("duck".to_string(), users_engine());
    let runner = ValidationRunner::with_options(
        engines,
        RunnerOptions {
            binding_timeout: Some(Duration::from_nanos(1)),
        },
    );
    let bindings = vec![Binding::new(
        "duck",
        "users",
        Arc::new(ColumnNotNull::new("id")),
    )];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, Status::Error);
    assert!(report.results[0]
        .error_message
        .as_ref()
        .unwrap()
        .contains("timed out"));
}

#[tokio::test]
async fn test_mixed_severities_are_recorded() {
    let runner = single_engine("duck", nullable_engine(vec![None, None]));
    let bindings = vec![Binding::new(
        "duck",
        "t",
        Arc::new(ColumnNotNull::with_options(
            "c",
            ValidatorOptions::new().with_severity(Severity::Warn),
        )),
    )];

    let report = runner.run(&bindings, "r1", None).await.unwrap();
    assert_eq!(report.results[0].status, Status::Fail);
    assert_eq!(report.results[0].severity, Severity::Warn);
}
