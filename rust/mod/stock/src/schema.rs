use stockroom_core::ServiceError;
use stockroom_sql::{Row, SQLError, SQLStore, Value};

use crate::model::BotId;

/// SQL DDL statements to initialize the stock database schema.
///
/// All fields map directly to columns. `stock_units.seq` gives the
/// insertion order used for FIFO draining; the CHECK keeps a stamped
/// transaction reference from ever sitting on an available unit.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS bots (
        bot_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        create_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS products (
        bot_id INTEGER NOT NULL,
        product_id TEXT NOT NULL,
        name TEXT NOT NULL,
        price INTEGER NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        terms TEXT NOT NULL DEFAULT '',
        sold INTEGER NOT NULL DEFAULT 0,
        create_at TEXT NOT NULL,
        update_at TEXT NOT NULL,
        PRIMARY KEY (bot_id, product_id)
    )",
    "CREATE TABLE IF NOT EXISTS stock_units (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        bot_id INTEGER NOT NULL,
        product_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        consumed INTEGER NOT NULL DEFAULT 0,
        transaction_ref TEXT,
        create_at TEXT NOT NULL,
        consumed_at TEXT,
        CHECK (transaction_ref IS NULL OR consumed = 1)
    )",
    "CREATE INDEX IF NOT EXISTS idx_stock_available ON stock_units(bot_id, product_id, consumed, seq)",
    "CREATE INDEX IF NOT EXISTS idx_stock_transaction ON stock_units(transaction_ref)",
    "CREATE TABLE IF NOT EXISTS categories (
        bot_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        create_at TEXT NOT NULL,
        update_at TEXT NOT NULL,
        PRIMARY KEY (bot_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS category_members (
        bot_id INTEGER NOT NULL,
        category TEXT NOT NULL,
        position INTEGER NOT NULL,
        product_id TEXT NOT NULL,
        PRIMARY KEY (bot_id, category, position)
    )",
    "CREATE INDEX IF NOT EXISTS idx_member_product ON category_members(bot_id, product_id)",
];

/// Initialize all stock tables. Idempotent.
pub fn init_schema(sql: &dyn SQLStore) -> Result<(), ServiceError> {
    for ddl in SCHEMA {
        sql.exec(ddl, &[])
            .map_err(|e| ServiceError::Storage(format!("stock schema init: {e}")))?;
    }
    Ok(())
}

/// Map a storage failure onto the service taxonomy.
pub(crate) fn sql_error(e: SQLError) -> ServiceError {
    match e {
        SQLError::Constraint(msg) => ServiceError::Conflict(msg),
        other => ServiceError::Storage(other.to_string()),
    }
}

/// Whether a product row exists.
pub(crate) fn product_exists(
    sql: &dyn SQLStore,
    bot_id: BotId,
    product_id: &str,
) -> Result<bool, ServiceError> {
    let rows = sql
        .query(
            "SELECT 1 AS found FROM products WHERE bot_id = ?1 AND product_id = ?2",
            &[Value::Integer(bot_id), Value::from(product_id)],
        )
        .map_err(sql_error)?;
    Ok(!rows.is_empty())
}

/// Read the `cnt` column of a `SELECT COUNT(*) AS cnt` result.
pub(crate) fn count_of(rows: &[Row]) -> u64 {
    rows.first()
        .and_then(|r| r.get_i64("cnt"))
        .unwrap_or(0)
        .max(0) as u64
}

pub(crate) fn required_str(row: &Row, col: &str) -> Result<String, ServiceError> {
    row.get_str(col)
        .map(String::from)
        .ok_or_else(|| ServiceError::Storage(format!("missing {col} column")))
}

pub(crate) fn required_i64(row: &Row, col: &str) -> Result<i64, ServiceError> {
    row.get_i64(col)
        .ok_or_else(|| ServiceError::Storage(format!("missing {col} column")))
}

/// `?{start}, ?{start+1}, …` for `n` parameters.
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
