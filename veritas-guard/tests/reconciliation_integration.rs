//! Cross-engine reconciliation tests.

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use veritas_guard::prelude::*;
use veritas_guard::validators::{
    CoerceTo, ColumnMapping, ColumnReconciliationValidator, TableReconciliationValidator,
};

fn engine_with_ints(table: &str, column: &str, values: Vec<i64>) -> Arc<dyn Engine> {
    let engine = FusionEngine::new();
    let schema = Arc::new(Schema::new(vec![Field::new(
        column,
        DataType::Int64,
        false,
    )]));
    let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap();
    engine.register_batch(table, batch).unwrap();
    Arc::new(engine)
}

fn runner_for(primary: Arc<dyn Engine>) -> ValidationRunner {
    let mut engines = EngineMap::new();
    engines.insert("primary".to_string(), primary);
    ValidationRunner::new(engines)
}

#[tokio::test]
async fn test_table_reconciliation_matches() {
    let primary = engine_with_ints("t1", "a", vec![1, 2, 3]);
    let comparer = engine_with_ints("t2", "a", vec![9, 9, 9]);

    let validator = TableReconciliationValidator::new(comparer, "t2");
    let bindings = vec![Binding::new("primary", "t1", Arc::new(validator))];
    let report = runner_for(primary)
        .run(&bindings, "r1", None)
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, Status::Pass);
    assert_eq!(result.metric_values["primary_row_cnt"], Scalar::Int(3));
    assert_eq!(result.metric_values["comparer_row_cnt"], Scalar::Int(3));
}

#[tokio::test]
async fn test_table_reconciliation_mismatch() {
    let primary = engine_with_ints("t1", "a", vec![1, 2, 3]);
    let comparer = engine_with_ints("t2", "a", vec![1, 2]);

    let validator = TableReconciliationValidator::new(comparer, "t2");
    let bindings = vec![Binding::new("primary", "t1", Arc::new(validator))];
    let report = runner_for(primary)
        .run(&bindings, "r1", None)
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, Status::Fail);
    assert!(result
        .error_message
        .as_ref()
        .unwrap()
        .contains("row counts differ"));
}

#[tokio::test]
async fn test_column_reconciliation_same_values() {
    let primary = engine_with_ints("t1", "a", vec![1, 2, 3]);
    let comparer = engine_with_ints("t2", "a", vec![3, 1, 2]);

    let validator = ColumnReconciliationValidator::new(ColumnMapping::new("a"), comparer, "t2");
    let bindings = vec![Binding::new("primary", "t1", Arc::new(validator))];
    let report = runner_for(primary)
        .run(&bindings, "r1", None)
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, Status::Pass);
    assert_eq!(result.metric_values["primary_min"], Scalar::Int(1));
    assert_eq!(result.metric_values["comparer_max"], Scalar::Int(3));
}

#[tokio::test]
async fn test_column_reconciliation_renamed_and_coerced() {
    // Primary stores integers; comparer stores the same values as floats
    // under a different column name.
    let primary = engine_with_ints("t1", "amount", vec![10, 20, 30]);

    let comparer_engine = FusionEngine::new();
    let schema = Arc::new(Schema::new(vec![Field::new(
        "total",
        DataType::Float64,
        false,
    )]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(Float64Array::from(vec![10.0, 20.0, 30.0]))],
    )
    .unwrap();
    comparer_engine.register_batch("t2", batch).unwrap();

    let mapping = ColumnMapping::new("amount")
        .with_comparer("total")
        .with_comparer_coerce(CoerceTo::Float);
    let validator =
        ColumnReconciliationValidator::new(mapping, Arc::new(comparer_engine), "t2");
    let bindings = vec![Binding::new("primary", "t1", Arc::new(validator))];
    let report = runner_for(primary)
        .run(&bindings, "r1", None)
        .await
        .unwrap();

    assert_eq!(report.results[0].status, Status::Pass);
}

#[tokio::test]
async fn test_column_reconciliation_detects_divergence() {
    let primary = engine_with_ints("t1", "a", vec![1, 2, 3]);
    let comparer = engine_with_ints("t2", "a", vec![1, 2, 4]);

    let validator = ColumnReconciliationValidator::new(ColumnMapping::new("a"), comparer, "t2");
    let bindings = vec![Binding::new("primary", "t1", Arc::new(validator))];
    let report = runner_for(primary)
        .run(&bindings, "r1", None)
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, Status::Fail);
    assert!(result.error_message.as_ref().unwrap().contains("max"));
}

#[tokio::test]
async fn test_column_reconciliation_missing_column_is_error() {
    let primary = engine_with_ints("t1", "a", vec![1]);
    let comparer = engine_with_ints("t2", "b", vec![1]);

    // Mapping names a comparer column that does not exist on t2.
    let validator = ColumnReconciliationValidator::new(ColumnMapping::new("a"), comparer, "t2");
    let bindings = vec![Binding::new("primary", "t1", Arc::new(validator))];
    let report = runner_for(primary)
        .run(&bindings, "r1", None)
        .await
        .unwrap();

    assert_eq!(report.results[0].status, Status::Error);
}

#[tokio::test]
async fn test_reconciliation_with_side_filters() {
    // Comparer carries extra archived rows excluded by its filter.
    let primary = engine_with_ints("t1", "a", vec![1, 2, 3]);

    let comparer_engine = FusionEngine::new();
    let schema = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Int64, false),
        Field::new("state", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3, 99])),
            Arc::new(StringArray::from(vec!["live", "live", "live", "archived"])),
        ],
    )
    .unwrap();
    comparer_engine.register_batch("t2", batch).unwrap();

    let validator = TableReconciliationValidator::new(Arc::new(comparer_engine), "t2")
        .with_comparer_where("state = 'live'");
    let bindings = vec![Binding::new("primary", "t1", Arc::new(validator))];
    let report = runner_for(primary)
        .run(&bindings, "r1", None)
        .await
        .unwrap();

    assert_eq!(report.results[0].status, Status::Pass);
}
