use crate::error::SQLError;

/// A dynamically-typed SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row returned from a SQL query: column name to value.
#[derive(Debug, Clone)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a text column value by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get an integer column value by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get a real column value by name.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(Value::Real(f)) => Some(*f),
            _ => None,
        }
    }
}

/// One statement of an [`SQLStore::exec_batch`] transaction.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Abort the whole batch if this statement affects zero rows.
    pub require_rows: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            require_rows: false,
        }
    }

    /// Guard: the enclosing batch rolls back with
    /// [`SQLError::NoRowsAffected`] when this statement matches nothing.
    pub fn require_rows(mut self) -> Self {
        self.require_rows = true;
        self
    }
}

/// SQLStore provides a SQL execution interface backed by an embedded database.
///
/// Every single statement is atomic. `UPDATE … RETURNING` through [`query`]
/// is the find-and-update primitive: the row selection and the write happen
/// in one indivisible step.
///
/// [`query`]: SQLStore::query
pub trait SQLStore: Send + Sync {
    /// Execute a query and return rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError>;

    /// Execute a statement (INSERT/UPDATE/DELETE) and return affected row count.
    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError>;

    /// Execute statements in order inside one transaction and return each
    /// affected row count. Any error rolls back every statement of the batch.
    fn exec_batch(&self, statements: &[Statement]) -> Result<Vec<u64>, SQLError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_accessors() {
        let row = Row {
            columns: vec![
                ("name".into(), Value::Text("a1".into())),
                ("seq".into(), Value::Integer(3)),
                ("ratio".into(), Value::Real(0.5)),
                ("ref".into(), Value::Null),
            ],
        };
        assert_eq!(row.get_str("name"), Some("a1"));
        assert_eq!(row.get_i64("seq"), Some(3));
        assert_eq!(row.get_f64("ratio"), Some(0.5));
        assert_eq!(row.get_str("ref"), None);
        assert_eq!(row.get_i64("name"), None);
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn optional_values_become_null() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("tx-1")), Value::Text("tx-1".into()));
    }
}
