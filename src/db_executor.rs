//! DB executor (C9): adapter interface for `db` steps and pre/post
//! SQL blocks.
//!
//! Concrete database drivers are out of scope beyond a reference
//! adapter; `DbAdapter` is the real production interface. The
//! `SqliteAdapter` is grounded on `rusqlite` usage elsewhere in the
//! example pack and exists so the scheduler and its tests have a
//! concrete, runnable implementation to drive against.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("data source not found: {0}")]
    DatasourceNotFound(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("unsafe SQL rejected: statement contains a denylisted token")]
    UnsafeSql,
}

/// A small set of tokens that are never allowed in rendered SQL for
/// pre/post SQL blocks and `db` steps, since template-rendered
/// values are attacker-controlled input in many deployments. This is
/// a denylist guard, not a substitute for parameterized queries --
/// `DbAdapter` implementations should still bind parameters where
/// the concrete driver supports it.
const DENYLISTED_TOKENS: &[&str] = &[";--", "/*", "*/", "xp_cmdshell"];

pub fn check_sql_safety(sql: &str) -> Result<(), DbError> {
    let lowered = sql.to_lowercase();
    if DENYLISTED_TOKENS.iter().any(|t| lowered.contains(t)) {
        return Err(DbError::UnsafeSql);
    }
    Ok(())
}

/// Columns + rows result shape every adapter returns, matching what
/// `extractor::extract_from_db_result` and `validator`'s `db_result`
/// target expect.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn to_json(&self) -> Value {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Value::Object(obj)
            })
            .collect();
        Value::Array(rows)
    }
}

#[async_trait]
pub trait DbAdapter: Send + Sync {
    async fn query(&self, sql: &str) -> Result<QueryResult, DbError>;
}

/// Reference adapter backed by `rusqlite`. Intended for tests and
/// small local datasources; production drivers are a collaborator
/// concern per the adapter-interface design.
pub struct SqliteAdapter {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteAdapter {
    pub fn open(path: &str) -> Result<Self, DbError> {
        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(path)
        }
        .map_err(|e| DbError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl DbAdapter for SqliteAdapter {
    async fn query(&self, sql: &str) -> Result<QueryResult, DbError> {
        check_sql_safety(sql)?;
        let conn = self.conn.lock().map_err(|_| DbError::Connection("poisoned lock".into()))?;
        let mut stmt = conn.prepare(sql).map_err(|e| DbError::Query(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let column_count = columns.len();

        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let value: rusqlite::types::ValueRef = row.get_ref(i)?;
                    values.push(sqlite_value_to_json(value));
                }
                Ok(values)
            })
            .map_err(|e| DbError::Query(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(QueryResult { columns, rows })
    }
}

fn sqlite_value_to_json(value: rusqlite::types::ValueRef) -> Value {
    match value {
        rusqlite::types::ValueRef::Null => Value::Null,
        rusqlite::types::ValueRef::Integer(i) => Value::from(i),
        rusqlite::types::ValueRef::Real(f) => {
            serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }
        rusqlite::types::ValueRef::Text(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
        rusqlite::types::ValueRef::Blob(_) => Value::String("<blob>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_denylisted_token() {
        assert!(check_sql_safety("SELECT 1; -- drop everything").is_err());
    }

    #[test]
    fn accepts_plain_select() {
        assert!(check_sql_safety("SELECT id, name FROM users WHERE id = ?").is_ok());
    }

    #[tokio::test]
    async fn sqlite_adapter_round_trips_a_query() {
        let adapter = SqliteAdapter::open(":memory:").unwrap();
        adapter
            .conn
            .lock()
            .unwrap()
            .execute_batch("CREATE TABLE users (id INTEGER, name TEXT); INSERT INTO users VALUES (1, 'ada');")
            .unwrap();
        let result = adapter.query("SELECT id, name FROM users").await.unwrap();
        assert_eq!(result.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(result.rows.len(), 1);
    }
}
