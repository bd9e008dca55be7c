//! Suite configuration build and execution tests.

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use veritas_guard::prelude::*;

fn users_engines() -> EngineMap {
    let engine = FusionEngine::new();
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("email", DataType::Utf8, true),
        Field::new("status", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(StringArray::from(vec![
                Some("a@example.com"),
                None,
                Some("c@example.com"),
            ])),
            Arc::new(StringArray::from(vec![
                Some("active"),
                Some("active"),
                Some("inactive"),
            ])),
        ],
    )
    .unwrap();
    engine.register_batch("users", batch).unwrap();
    let mut map = EngineMap::new();
    map.insert("duck".to_string(), Arc::new(engine) as Arc<dyn Engine>);
    map
}

const SUITE_JSON: &str = r#"{
    "suite_name": "users_quality",
    "engine": "duck",
    "table": "users",
    "expectations": [
        {"expectation_type": "ColumnNotNull", "column": "id"},
        {"expectation_type": "ColumnNullPct", "column": "email", "max_null_pct": 0.5, "severity": "WARN"},
        {"expectation_type": "ColumnValueInSet", "column": "status",
         "allowed_values": ["active", "inactive"], "allow_null": false},
        {"expectation_type": "RowCountValidator", "min_rows": 1, "max_rows": 100},
        {"expectation_type": "ColumnMatchesRegex", "column": "email",
         "pattern": "^[^@]+@[^@]+$", "where": "email IS NOT NULL"}
    ]
}"#;

#[tokio::test]
async fn test_suite_builds_and_runs() {
    let engines = users_engines();
    let suite = SuiteConfig::from_json_str(SUITE_JSON).unwrap();
    let bindings = suite.build_bindings(&engines, None).await.unwrap();
    assert_eq!(bindings.len(), 5);

    let runner = ValidationRunner::new(engines);
    let store = MemoryResultStore::new();
    let (run, results) = run_validations(
        &suite.suite_name,
        &bindings,
        &runner,
        &store,
        None,
        None,
    )
    .await
    .unwrap();

    assert_eq!(run.status, RunStatus::Complete);
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.status == Status::Pass));
    // Severity from the envelope lands on the result.
    assert_eq!(results[1].severity, Severity::Warn);
}

#[tokio::test]
async fn test_missing_column_rejected_at_build() {
    let engines = users_engines();
    let json = r#"{
        "suite_name": "broken",
        "engine": "duck",
        "table": "users",
        "expectations": [
            {"expectation_type": "ColumnNotNull", "column": "no_such_column"}
        ]
    }"#;
    let suite = SuiteConfig::from_json_str(json).unwrap();
    let err = suite.build_bindings(&engines, None).await.unwrap_err();
    assert!(matches!(err, VeritasError::Config(_)));
    assert!(err.to_string().contains("no_such_column"));
}

#[tokio::test]
async fn test_unknown_engine_rejected_at_build() {
    let engines = users_engines();
    let json = r#"{
        "suite_name": "broken",
        "engine": "warehouse",
        "table": "users",
        "expectations": [
            {"expectation_type": "ColumnNotNull", "column": "id"}
        ]
    }"#;
    let suite = SuiteConfig::from_json_str(json).unwrap();
    assert!(suite.build_bindings(&engines, None).await.is_err());
}

#[tokio::test]
async fn test_sla_aggregates_suites() {
    let engines = users_engines();
    let json = format!(
        r#"{{"sla_name": "nightly", "suites": [{SUITE_JSON}, {SUITE_JSON}]}}"#
    );
    let sla = SlaConfig::from_json_str(&json).unwrap();
    let bindings = sla.build_bindings(&engines, None).await.unwrap();
    assert_eq!(bindings.len(), 10);
}

#[tokio::test]
async fn test_drift_requires_store() {
    let engines = users_engines();
    let json = r#"{
        "suite_name": "drifty",
        "engine": "duck",
        "table": "users",
        "expectations": [
            {"expectation_type": "MetricDriftValidator", "column": "email", "metric": "null_pct"}
        ]
    }"#;
    let suite = SuiteConfig::from_json_str(json).unwrap();
    assert!(suite.build_bindings(&engines, None).await.is_err());

    let store: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new());
    let bindings = suite.build_bindings(&engines, Some(&store)).await.unwrap();
    assert_eq!(bindings.len(), 1);
}
