//! Row source backed by a DuckDB connection

use crate::config::{load_env_file, SourceConfig};
use crate::error::{Result, StatediffError};
use crate::source::RowSource;
use crate::value::{Row, Value};
use duckdb::types::ValueRef;
use duckdb::Connection;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Column types read natively; everything else is rendered by DuckDB as text
const NATIVE_TYPES: &[&str] = &[
    "BOOLEAN", "TINYINT", "SMALLINT", "INTEGER", "BIGINT", "HUGEINT", "UTINYINT", "USMALLINT",
    "UINTEGER", "UBIGINT", "FLOAT", "DOUBLE", "VARCHAR", "BLOB",
];

/// DuckDB database, optionally with an external database attached.
///
/// A MySQL, PostgreSQL or SQLite database can be compared by attaching it,
/// e.g. `ATTACH 'host=db user={DB_USER} database=shop' AS shop (TYPE mysql)`.
pub struct DuckDbSource {
    connection: Mutex<Connection>,
    /// Per-table `SELECT` list and column count, refreshed on each first page
    projections: Mutex<HashMap<String, (String, usize)>>,
}

impl DuckDbSource {
    pub fn open(config: &SourceConfig) -> Result<Self> {
        let connection = match &config.database {
            Some(path) => Connection::open(path).map_err(|e| {
                StatediffError::connectivity(format!("Failed to open '{}': {}", path.display(), e))
            })?,
            None => Connection::open_in_memory()
                .map_err(|e| StatediffError::connectivity(format!("Failed to open in-memory database: {}", e)))?,
        };

        if config.attach.is_some() {
            load_env_file()?;
        }
        if let Some(attach) = config.resolved_attach()? {
            connection
                .execute_batch(&attach)
                .map_err(|e| StatediffError::connectivity(format!("Failed to attach database: {}", e)))?;
            if let Some(alias) = attach_alias(&attach) {
                connection
                    .execute_batch(&format!("USE {}", quote_ident(&alias)))
                    .map_err(|e| StatediffError::connectivity(format!("Failed to use '{}': {}", alias, e)))?;
                log::info!("Attached external database as '{}'", alias);
            }
        }

        Ok(Self {
            connection: Mutex::new(connection),
            projections: Mutex::new(HashMap::new()),
        })
    }

    /// Run arbitrary statements against the connection
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock().execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Column names and DuckDB types of a table
    fn describe(&self, conn: &Connection, table: &str) -> Result<Vec<(String, String)>> {
        let sql = format!("DESCRIBE {}", quote_ident(table));
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StatediffError::query(table, format!("Failed to prepare describe query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| StatediffError::query(table, format!("Failed to query column info: {}", e)))?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.map_err(|e| StatediffError::query(table, e.to_string()))?);
        }
        Ok(columns)
    }

    /// `SELECT` list that reads native types as-is and casts the rest to text
    fn projection(columns: &[(String, String)]) -> String {
        columns
            .iter()
            .map(|(name, data_type)| {
                let ident = quote_ident(name);
                if NATIVE_TYPES.contains(&data_type.to_uppercase().as_str()) {
                    ident
                } else {
                    format!("CAST({} AS VARCHAR) AS {}", ident, ident)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Projection for `table`, described afresh unless this is a later page of a batched read
    fn cached_projection(
        &self,
        conn: &Connection,
        table: &str,
        page: Option<(u64, usize)>,
    ) -> Result<(String, usize)> {
        let mut projections = self.projections.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((offset, _)) = page {
            if offset > 0 {
                if let Some(cached) = projections.get(table) {
                    return Ok(cached.clone());
                }
            }
        }

        let columns = self.describe(conn, table)?;
        let entry = (Self::projection(&columns), columns.len());
        projections.insert(table.to_string(), entry.clone());
        Ok(entry)
    }

    fn select_rows(&self, table: &str, page: Option<(u64, usize)>) -> Result<Vec<Row>> {
        let conn = self.lock();
        let (projection, column_count) = self.cached_projection(&conn, table, page)?;
        if column_count == 0 {
            return Ok(Vec::new());
        }

        // full ordering keeps LIMIT/OFFSET pages consistent across calls
        let mut sql = format!("SELECT {} FROM {} ORDER BY ALL", projection, quote_ident(table));
        if let Some((offset, limit)) = page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StatediffError::query(table, format!("Failed to prepare row query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(convert_value(row.get_ref(i)?));
                }
                Ok(values)
            })
            .map_err(|e| StatediffError::query(table, format!("Failed to fetch rows: {}", e)))?;

        let mut data = Vec::new();
        for row in rows {
            data.push(row.map_err(|e| StatediffError::query(table, format!("Failed to read row: {}", e)))?);
        }
        Ok(data)
    }
}

impl RowSource for DuckDbSource {
    fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SHOW TABLES").map_err(list_failed)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(list_failed)?;

        let mut tables = Vec::new();
        for row in rows {
            tables.push(row.map_err(list_failed)?);
        }
        Ok(tables)
    }

    fn get_columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        Ok(self
            .describe(&conn, table)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        let conn = self.lock();
        let count: i64 = conn
            .prepare(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .and_then(|mut stmt| stmt.query_row([], |row| row.get(0)))
            .map_err(|e| StatediffError::query(table, format!("Failed to count rows: {}", e)))?;
        Ok(count.max(0) as u64)
    }

    fn fetch_rows(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Row>> {
        self.select_rows(table, Some((offset, limit)))
    }

    fn fetch_all_rows(&self, table: &str) -> Result<Vec<Row>> {
        self.select_rows(table, None)
    }
}

fn convert_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Boolean(b),
        ValueRef::TinyInt(i) => Value::Integer(i as i128),
        ValueRef::SmallInt(i) => Value::Integer(i as i128),
        ValueRef::Int(i) => Value::Integer(i as i128),
        ValueRef::BigInt(i) => Value::Integer(i as i128),
        ValueRef::HugeInt(i) => Value::Integer(i),
        ValueRef::UTinyInt(i) => Value::Integer(i as i128),
        ValueRef::USmallInt(i) => Value::Integer(i as i128),
        ValueRef::UInt(i) => Value::Integer(i as i128),
        ValueRef::UBigInt(i) => Value::Integer(i as i128),
        // go through the shortest f32 rendering so 0.1 stays 0.1
        ValueRef::Float(f) => Value::Real(f.to_string().parse::<f64>().unwrap_or(f as f64)),
        ValueRef::Double(f) => Value::Real(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        other => Value::Text(format!("{:?}", other)),
    }
}

fn list_failed(e: duckdb::Error) -> StatediffError {
    StatediffError::connectivity(format!("Failed to list tables: {}", e))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Alias named by `... AS alias ...` in an ATTACH statement
fn attach_alias(statement: &str) -> Option<String> {
    let tokens: Vec<&str> = statement.split_whitespace().collect();
    let pos = tokens.iter().rposition(|t| t.eq_ignore_ascii_case("AS"))?;
    let alias = tokens
        .get(pos + 1)?
        .split(|c: char| c == '(' || c == ';')
        .next()?
        .trim_matches('"');
    (!alias.is_empty()).then(|| alias.to_string())
}
