use anyhow::Result;
use serde_json::{Map, Value};

pub mod bigquery;
#[cfg(test)]
pub mod sqlite;

/// One result row, column name to value, in select-list order.
pub type Row = Map<String, Value>;

/// Executes a SQL statement and returns every result row.
pub trait Warehouse {
    fn query(&self, sql: &str) -> Result<Vec<Row>>;
}
