use anyhow::{Context, Result};
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::Value;

use super::{Row, Warehouse};

/// In-memory stand-in for the hosted warehouse.
///
/// SQLite treats a backtick-quoted name as a single identifier, so a table
/// created as `"proj.map.mapping_suggestions"` answers to the same
/// three-part name the report queries use.
pub struct SqliteWarehouse {
    connection: Connection,
}

impl SqliteWarehouse {
    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory warehouse")?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Warehouse for SqliteWarehouse {
    fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let mut statement = self
            .connection
            .prepare(sql)
            .context("failed to prepare warehouse query")?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = statement.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (index, column) in columns.iter().enumerate() {
                record.insert(column.clone(), json_value(row.get_ref(index)?));
            }
            records.push(record);
        }

        Ok(records)
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Value::from(number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::from(bytes.to_vec()),
    }
}
