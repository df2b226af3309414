use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, ErrorCode};

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, Statement, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
///
/// All statements run on one connection behind a mutex, so each call is
/// serialized against every other call on the same store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

/// Classify a rusqlite write error, keeping constraint violations distinct.
fn write_error(e: rusqlite::Error) -> SQLError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            SQLError::Constraint(e.to_string())
        }
        _ => SQLError::Execution(e.to_string()),
    }
}

impl SQLStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Query(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| SQLError::Query(e.to_string()))?;

        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        // `UPDATE … RETURNING` is driven through here too, so row errors
        // may be write failures.
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let mut columns = Vec::new();
                for (i, name) in column_names.iter().enumerate() {
                    let val = row_value_at(row, i);
                    columns.push((name.clone(), val));
                }
                Ok(Row { columns })
            })
            .map_err(write_error)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(write_error)?);
        }
        Ok(result)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let affected = conn
            .execute(sql, param_refs.as_slice())
            .map_err(write_error)?;

        Ok(affected as u64)
    }

    fn exec_batch(&self, statements: &[Statement]) -> Result<Vec<u64>, SQLError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        // Dropping `tx` without commit rolls the batch back.
        let tx = conn
            .transaction()
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        let mut counts = Vec::with_capacity(statements.len());
        for (i, stmt) in statements.iter().enumerate() {
            let bound = bind_params(&stmt.params);
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                bound.iter().map(|b| b.as_ref()).collect();

            let affected = tx
                .execute(&stmt.sql, param_refs.as_slice())
                .map_err(write_error)? as u64;

            if stmt.require_rows && affected == 0 {
                return Err(SQLError::NoRowsAffected(i));
            }
            counts.push(affected);
        }

        tx.commit()
            .map_err(|e| SQLError::Execution(e.to_string()))?;
        Ok(counts)
    }
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> Value {
    use rusqlite::types::ValueRef;

    match row.get_ref(idx) {
        Ok(ValueRef::Integer(i)) => Value::Integer(i),
        Ok(ValueRef::Real(f)) => Value::Real(f),
        Ok(ValueRef::Text(t)) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        Ok(ValueRef::Blob(b)) => Value::Blob(b.to_vec()),
        Ok(ValueRef::Null) | Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec(
                "CREATE TABLE items (seq INTEGER PRIMARY KEY AUTOINCREMENT, \
                 name TEXT NOT NULL UNIQUE, taken INTEGER NOT NULL DEFAULT 0)",
                &[],
            )
            .unwrap();
        for name in ["a", "b", "c"] {
            store
                .exec("INSERT INTO items (name) VALUES (?1)", &[Value::from(name)])
                .unwrap();
        }
        store
    }

    #[test]
    fn update_returning_yields_post_update_row() {
        let store = store_with_table();
        let rows = store
            .query(
                "UPDATE items SET taken = 1 WHERE seq = \
                 (SELECT seq FROM items WHERE taken = 0 ORDER BY seq LIMIT 1) \
                 RETURNING name, taken",
                &[],
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("name"), Some("a"));
        assert_eq!(rows[0].get_i64("taken"), Some(1));
    }

    #[test]
    fn numeric_looking_text_stays_text() {
        let store = store_with_table();
        store
            .exec("INSERT INTO items (name) VALUES (?1)", &[Value::from("12345")])
            .unwrap();
        let rows = store
            .query("SELECT name FROM items WHERE name = ?1", &[Value::from("12345")])
            .unwrap();
        assert_eq!(rows[0].get_str("name"), Some("12345"));
    }

    #[test]
    fn unique_violation_is_constraint_error() {
        let store = store_with_table();
        let err = store
            .exec("INSERT INTO items (name) VALUES (?1)", &[Value::from("a")])
            .unwrap_err();
        assert!(matches!(err, SQLError::Constraint(_)));
    }

    #[test]
    fn batch_commits_all_statements() {
        let store = store_with_table();
        let counts = store
            .exec_batch(&[
                Statement::new("UPDATE items SET taken = 1 WHERE name = ?1", vec!["a".into()]),
                Statement::new("DELETE FROM items WHERE name = ?1", vec!["zzz".into()]),
                Statement::new("INSERT INTO items (name) VALUES (?1)", vec!["d".into()]),
            ])
            .unwrap();
        assert_eq!(counts, vec![1, 0, 1]);

        let rows = store.query("SELECT COUNT(*) AS cnt FROM items", &[]).unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(4));
    }

    #[test]
    fn guarded_batch_rolls_back_on_zero_rows() {
        let store = store_with_table();
        let err = store
            .exec_batch(&[
                Statement::new("INSERT INTO items (name) VALUES (?1)", vec!["d".into()]),
                Statement::new("UPDATE items SET taken = 1 WHERE name = ?1", vec!["nope".into()])
                    .require_rows(),
            ])
            .unwrap_err();
        assert!(matches!(err, SQLError::NoRowsAffected(1)));

        let rows = store
            .query("SELECT COUNT(*) AS cnt FROM items WHERE name = 'd'", &[])
            .unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(0));
    }

    #[test]
    fn batch_rolls_back_on_constraint_error() {
        let store = store_with_table();
        let err = store
            .exec_batch(&[
                Statement::new("UPDATE items SET taken = 1", vec![]),
                Statement::new("INSERT INTO items (name) VALUES (?1)", vec!["b".into()]),
            ])
            .unwrap_err();
        assert!(matches!(err, SQLError::Constraint(_)));

        let rows = store
            .query("SELECT COUNT(*) AS cnt FROM items WHERE taken = 1", &[])
            .unwrap();
        assert_eq!(rows[0].get_i64("cnt"), Some(0));
    }
}
