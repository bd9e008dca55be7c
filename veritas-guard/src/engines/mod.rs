//! Execution engines: a uniform row-returning SQL interface over different
//! backends.
//!
//! The core talks to every backend through the [`Engine`] trait: run one
//! statement, get back an eagerly materialized table of typed scalars. Two
//! implementations ship here: [`FusionEngine`] wraps the embedded columnar
//! backend (DataFusion) and [`FileEngine`] exposes csv/parquet/ndjson files
//! as a named view over it. A warehouse adapter (anything ODBC-reachable)
//! implements the same four methods against its own client library; nothing
//! else in the engine contract changes.
//!
//! Engines own a bounded pool of backend connections. Each `run_sql` call
//! acquires one connection, runs one statement, and releases it on every
//! exit path.

use arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, LargeStringArray, StringArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use veritas_core::prelude::*;

mod file;
mod fusion;

pub use file::{FileEngine, FileFormat};
pub use fusion::FusionEngine;

/// A handle to a SQL-capable backend.
///
/// `run_sql` is the only suspension point in the whole engine; validators
/// perform no I/O outside it. Engines never swallow errors: a failed
/// statement surfaces as [`VeritasError::Engine`] and the runner decides what
/// to record.
#[async_trait]
pub trait Engine: Debug + Send + Sync {
    /// Executes one statement and returns the materialized result.
    async fn run_sql(&self, sql: &str) -> Result<Rows>;

    /// Returns the ordered column names of `table`.
    ///
    /// Used by configuration loading to reject suites that name nonexistent
    /// columns before anything runs.
    async fn list_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Returns the SQL dialect this engine understands.
    fn dialect(&self) -> Dialect;

    /// Releases the connection pool. Statements issued afterwards fail.
    async fn close(&self) -> Result<()>;
}

/// Named engines available to a runner.
pub type EngineMap = HashMap<String, Arc<dyn Engine>>;

/// An eagerly materialized query result: column names plus rows of scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct Rows {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl Rows {
    /// An empty result with no columns.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Materializes Arrow record batches into rows of scalars.
    ///
    /// Common primitive, string and boolean types convert losslessly; any
    /// other type arrives as [`Scalar::Text`] in its display form.
    pub fn from_batches(batches: &[RecordBatch]) -> Result<Self> {
        let Some(first) = batches.first() else {
            return Ok(Self::empty());
        };
        let columns: Vec<String> = first
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();

        let mut rows = Vec::new();
        for batch in batches {
            for row_ix in 0..batch.num_rows() {
                let mut row = Vec::with_capacity(batch.num_columns());
                for col in batch.columns() {
                    row.push(scalar_at(col.as_ref(), row_ix)?);
                }
                rows.push(row);
            }
        }
        Ok(Self { columns, rows })
    }

    /// Returns the column names in projection order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the result holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns one row as a slice of scalars.
    pub fn row(&self, ix: usize) -> Option<&[Scalar]> {
        self.rows.get(ix).map(|r| r.as_slice())
    }

    /// Returns the value at `(row, column name)`.
    pub fn value(&self, row: usize, column: &str) -> Option<&Scalar> {
        let col_ix = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(col_ix))
    }

    /// Returns the single scalar of a one-row, one-column result.
    pub fn scalar(&self) -> Option<&Scalar> {
        self.rows.first().and_then(|r| r.first())
    }

    /// Converts up to `limit` rows into JSON objects keyed by column name.
    pub fn json_rows(&self, limit: usize) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (name, value) in self.columns.iter().zip(row.iter()) {
                    let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                    obj.insert(name.clone(), json);
                }
                serde_json::Value::Object(obj)
            })
            .collect()
    }
}

fn scalar_at(array: &dyn Array, row: usize) -> Result<Scalar> {
    if array.is_null(row) {
        return Ok(Scalar::Null);
    }

    macro_rules! take {
        ($ty:ty, $variant:ident, $cast:ty) => {
            array
                .as_any()
                .downcast_ref::<$ty>()
                .map(|a| Scalar::$variant(a.value(row) as $cast))
        };
    }

    let scalar = match array.data_type() {
        DataType::Int8 => take!(Int8Array, Int, i64),
        DataType::Int16 => take!(Int16Array, Int, i64),
        DataType::Int32 => take!(Int32Array, Int, i64),
        DataType::Int64 => take!(Int64Array, Int, i64),
        DataType::UInt8 => take!(UInt8Array, Int, i64),
        DataType::UInt16 => take!(UInt16Array, Int, i64),
        DataType::UInt32 => take!(UInt32Array, Int, i64),
        DataType::UInt64 => take!(UInt64Array, Int, i64),
        DataType::Float32 => take!(Float32Array, Float, f64),
        DataType::Float64 => take!(Float64Array, Float, f64),
        DataType::Boolean => array
            .as_any()
            .downcast_ref::<BooleanArray>()
            .map(|a| Scalar::Bool(a.value(row))),
        DataType::Utf8 => array
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| Scalar::Text(a.value(row).to_string())),
        DataType::LargeUtf8 => array
            .as_any()
            .downcast_ref::<LargeStringArray>()
            .map(|a| Scalar::Text(a.value(row).to_string())),
        _ => None,
    };

    match scalar {
        Some(s) => Ok(s),
        None => {
            let text = array_value_to_string(&make_array_ref(array), row)
                .map_err(|e| VeritasError::Internal(format!("cannot display value: {e}")))?;
            Ok(Scalar::Text(text))
        }
    }
}

fn make_array_ref(array: &dyn Array) -> arrow::array::ArrayRef {
    arrow::array::make_array(array.to_data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Date32Array, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
            Field::new("day", DataType::Date32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
                Arc::new(Float64Array::from(vec![Some(0.5), Some(1.5)])),
                Arc::new(Date32Array::from(vec![Some(0), Some(1)])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_batches_types() {
        let rows = Rows::from_batches(&[sample_batch()]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.columns(), &["id", "name", "score", "day"]);
        assert_eq!(rows.value(0, "id"), Some(&Scalar::Int(1)));
        assert_eq!(rows.value(0, "name"), Some(&Scalar::Text("a".to_string())));
        assert_eq!(rows.value(1, "name"), Some(&Scalar::Null));
        assert_eq!(rows.value(1, "score"), Some(&Scalar::Float(1.5)));
        // Date falls back to its display form.
        assert_eq!(
            rows.value(0, "day"),
            Some(&Scalar::Text("1970-01-01".to_string()))
        );
    }

    #[test]
    fn test_json_rows() {
        let rows = Rows::from_batches(&[sample_batch()]).unwrap();
        let json = rows.json_rows(1);
        assert_eq!(json.len(), 1);
        assert_eq!(json[0]["id"], 1);
        assert_eq!(json[0]["name"], "a");
    }

    #[test]
    fn test_empty_batches() {
        let rows = Rows::from_batches(&[]).unwrap();
        assert!(rows.is_empty());
        assert!(rows.scalar().is_none());
    }
}
