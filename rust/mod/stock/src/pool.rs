use std::sync::Arc;

use tracing::{debug, info, warn};

use stockroom_core::{ServiceError, StockLimits, new_id, now_rfc3339};
use stockroom_sql::{Row, SQLStore, Statement, Value};

use crate::model::{BotId, RemovalEntry, RemovalOutcome, StockUnit};
use crate::schema::{count_of, placeholders, product_exists, required_i64, required_str, sql_error};

const UNIT_COLUMNS: &str =
    "id, bot_id, product_id, payload, consumed, transaction_ref, create_at, consumed_at";

/// The persisted pool of stock units per `(bot, product)`.
///
/// Sole writer of `consumed` / `transaction_ref`. Every mutation is one
/// SQL statement (or one guarded batch), so no in-process lock is taken.
pub struct StockPool {
    sql: Arc<dyn SQLStore>,
    limits: StockLimits,
}

impl StockPool {
    pub fn new(sql: Arc<dyn SQLStore>, limits: StockLimits) -> Self {
        Self { sql, limits }
    }

    // -----------------------------------------------------------------------
    // Ingestion / removal
    // -----------------------------------------------------------------------

    /// Persist one available unit per payload, in the given order.
    ///
    /// The batch is all-or-nothing: either every payload becomes a unit or
    /// none does.
    pub fn insert(
        &self,
        bot_id: BotId,
        product_id: &str,
        payloads: &[String],
    ) -> Result<Vec<StockUnit>, ServiceError> {
        if payloads.is_empty() {
            return Err(ServiceError::Validation("payload list is empty".into()));
        }
        self.check_payload_lengths(payloads.iter().map(String::as_str))?;
        if !product_exists(self.sql.as_ref(), bot_id, product_id)? {
            return Err(ServiceError::NotFound(format!("product {bot_id}/{product_id}")));
        }

        let now = now_rfc3339();
        let units: Vec<StockUnit> = payloads
            .iter()
            .map(|payload| StockUnit {
                id: new_id(),
                bot_id,
                product_id: product_id.to_string(),
                payload: payload.clone(),
                consumed: false,
                transaction_ref: None,
                create_at: now.clone(),
                consumed_at: None,
            })
            .collect();

        let statements: Vec<Statement> = units
            .iter()
            .map(|u| {
                Statement::new(
                    "INSERT INTO stock_units (id, bot_id, product_id, payload, consumed, create_at) \
                     VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                    vec![
                        Value::from(u.id.as_str()),
                        Value::Integer(u.bot_id),
                        Value::from(u.product_id.as_str()),
                        Value::from(u.payload.as_str()),
                        Value::from(u.create_at.as_str()),
                    ],
                )
            })
            .collect();
        self.sql.exec_batch(&statements).map_err(sql_error)?;

        info!(bot_id, product_id, count = units.len(), "stock units inserted");
        Ok(units)
    }

    /// Delete available units matching any entry, by id or exact payload.
    ///
    /// Consumed units are order history and never match.
    pub fn remove_by_identity(
        &self,
        bot_id: BotId,
        product_id: &str,
        entries: &[RemovalEntry],
    ) -> Result<RemovalOutcome, ServiceError> {
        if entries.is_empty() {
            return Err(ServiceError::Validation("removal list is empty".into()));
        }
        if entries.len() > self.limits.max_batch {
            return Err(ServiceError::Validation(format!(
                "too many entries in one removal: {} (max {})",
                entries.len(),
                self.limits.max_batch
            )));
        }
        self.check_payload_lengths(entries.iter().map(|e| match e {
            RemovalEntry::ById(s) | RemovalEntry::ByPayload(s) => s.as_str(),
        }))?;
        if !product_exists(self.sql.as_ref(), bot_id, product_id)? {
            return Err(ServiceError::NotFound(format!("product {bot_id}/{product_id}")));
        }

        let mut ids = Vec::new();
        let mut payloads = Vec::new();
        for entry in entries {
            match entry {
                RemovalEntry::ById(id) => ids.push(Value::from(id.as_str())),
                RemovalEntry::ByPayload(p) => payloads.push(Value::from(p.as_str())),
            }
        }

        let mut params = vec![Value::Integer(bot_id), Value::from(product_id)];
        let mut matchers = Vec::new();
        if !ids.is_empty() {
            matchers.push(format!("id IN ({})", placeholders(params.len() + 1, ids.len())));
            params.extend(ids);
        }
        if !payloads.is_empty() {
            matchers.push(format!(
                "payload IN ({})",
                placeholders(params.len() + 1, payloads.len())
            ));
            params.extend(payloads);
        }

        let sql = format!(
            "DELETE FROM stock_units WHERE bot_id = ?1 AND product_id = ?2 AND consumed = 0 AND ({})",
            matchers.join(" OR ")
        );
        let removed = self.sql.exec(&sql, &params).map_err(sql_error)?;

        if removed != entries.len() as u64 {
            warn!(
                bot_id,
                product_id,
                requested = entries.len(),
                removed,
                "stock removal count differs from request"
            );
        }
        info!(bot_id, product_id, removed, "stock units removed");

        Ok(RemovalOutcome {
            requested: entries.len(),
            removed,
            remaining: self.list_available(bot_id, product_id, None)?,
        })
    }

    fn check_payload_lengths<'a>(
        &self,
        payloads: impl Iterator<Item = &'a str>,
    ) -> Result<(), ServiceError> {
        let max = self.limits.max_payload_len;
        for (i, p) in payloads.enumerate() {
            let len = p.chars().count();
            if len > max {
                return Err(ServiceError::Validation(format!(
                    "entry {i} is too long: {len} characters (max {max})"
                )));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Number of available units. Recounted on every call.
    pub fn count_available(&self, bot_id: BotId, product_id: &str) -> Result<u64, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT COUNT(*) AS cnt FROM stock_units \
                 WHERE bot_id = ?1 AND product_id = ?2 AND consumed = 0",
                &[Value::Integer(bot_id), Value::from(product_id)],
            )
            .map_err(sql_error)?;
        Ok(count_of(&rows))
    }

    /// Available units, oldest first. Inspection only, nothing is claimed.
    pub fn list_available(
        &self,
        bot_id: BotId,
        product_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StockUnit>, ServiceError> {
        let limit = limit.and_then(|l| i64::try_from(l).ok()).unwrap_or(-1);
        let rows = self
            .sql
            .query(
                &format!(
                    "SELECT {UNIT_COLUMNS} FROM stock_units \
                     WHERE bot_id = ?1 AND product_id = ?2 AND consumed = 0 \
                     ORDER BY seq ASC LIMIT ?3"
                ),
                &[Value::Integer(bot_id), Value::from(product_id), Value::Integer(limit)],
            )
            .map_err(sql_error)?;
        rows.iter().map(row_to_unit).collect()
    }

    /// Units stamped with a transaction reference, in claim order.
    pub fn units_by_transaction(&self, transaction_ref: &str) -> Result<Vec<StockUnit>, ServiceError> {
        let rows = self
            .sql
            .query(
                &format!(
                    "SELECT {UNIT_COLUMNS} FROM stock_units \
                     WHERE transaction_ref = ?1 ORDER BY seq ASC"
                ),
                &[Value::from(transaction_ref)],
            )
            .map_err(sql_error)?;
        rows.iter().map(row_to_unit).collect()
    }

    pub fn count_by_transaction(&self, transaction_ref: &str) -> Result<u64, ServiceError> {
        let rows = self
            .sql
            .query(
                "SELECT COUNT(*) AS cnt FROM stock_units WHERE transaction_ref = ?1",
                &[Value::from(transaction_ref)],
            )
            .map_err(sql_error)?;
        Ok(count_of(&rows))
    }

    // -----------------------------------------------------------------------
    // Claim primitives
    // -----------------------------------------------------------------------

    /// Atomically flip the oldest available unit to consumed and stamp it.
    ///
    /// Selection and flip are one `UPDATE … RETURNING` statement, so two
    /// concurrent callers can never receive the same unit. `Ok(None)` means
    /// the product has no available unit left.
    pub fn consume_one(
        &self,
        bot_id: BotId,
        product_id: &str,
        transaction_ref: &str,
    ) -> Result<Option<StockUnit>, ServiceError> {
        let rows = self
            .sql
            .query(
                &format!(
                    "UPDATE stock_units SET consumed = 1, transaction_ref = ?3, consumed_at = ?4 \
                     WHERE seq = (SELECT seq FROM stock_units \
                                  WHERE bot_id = ?1 AND product_id = ?2 AND consumed = 0 \
                                  ORDER BY seq ASC LIMIT 1) \
                       AND consumed = 0 \
                     RETURNING {UNIT_COLUMNS}"
                ),
                &[
                    Value::Integer(bot_id),
                    Value::from(product_id),
                    Value::from(transaction_ref),
                    Value::from(now_rfc3339()),
                ],
            )
            .map_err(sql_error)?;

        match rows.first() {
            Some(row) => {
                let unit = row_to_unit(row)?;
                debug!(bot_id, product_id, transaction_ref, unit_id = %unit.id, "stock unit consumed");
                Ok(Some(unit))
            }
            None => Ok(None),
        }
    }

    /// Return every unit stamped with `transaction_ref` to the available
    /// pool. A second call finds nothing and returns 0.
    pub fn release_by_transaction(&self, transaction_ref: &str) -> Result<u64, ServiceError> {
        let released = self
            .sql
            .exec(
                "UPDATE stock_units SET consumed = 0, transaction_ref = NULL, consumed_at = NULL \
                 WHERE transaction_ref = ?1 AND consumed = 1",
                &[Value::from(transaction_ref)],
            )
            .map_err(sql_error)?;

        if released > 0 {
            info!(transaction_ref, released, "stock units released");
        }
        Ok(released)
    }

    // -----------------------------------------------------------------------
    // Cascades
    // -----------------------------------------------------------------------

    /// Repoint every unit (any state) from `old_product_id` to `new_product_id`.
    pub fn reassign_product(
        &self,
        bot_id: BotId,
        old_product_id: &str,
        new_product_id: &str,
    ) -> Result<u64, ServiceError> {
        let stmt = Self::reassign_statement(bot_id, old_product_id, new_product_id);
        self.sql.exec(&stmt.sql, &stmt.params).map_err(sql_error)
    }

    /// Delete every unit (any state) of a product.
    pub fn delete_all_for_product(&self, bot_id: BotId, product_id: &str) -> Result<u64, ServiceError> {
        let stmt = Self::delete_all_statement(bot_id, product_id);
        self.sql.exec(&stmt.sql, &stmt.params).map_err(sql_error)
    }

    /// [`reassign_product`](Self::reassign_product) as a statement, for
    /// callers composing a cascade batch.
    pub(crate) fn reassign_statement(
        bot_id: BotId,
        old_product_id: &str,
        new_product_id: &str,
    ) -> Statement {
        Statement::new(
            "UPDATE stock_units SET product_id = ?3 WHERE bot_id = ?1 AND product_id = ?2",
            vec![
                Value::Integer(bot_id),
                Value::from(old_product_id),
                Value::from(new_product_id),
            ],
        )
    }

    pub(crate) fn delete_all_statement(bot_id: BotId, product_id: &str) -> Statement {
        Statement::new(
            "DELETE FROM stock_units WHERE bot_id = ?1 AND product_id = ?2",
            vec![Value::Integer(bot_id), Value::from(product_id)],
        )
    }
}

fn row_to_unit(row: &Row) -> Result<StockUnit, ServiceError> {
    Ok(StockUnit {
        id: required_str(row, "id")?,
        bot_id: required_i64(row, "bot_id")?,
        product_id: required_str(row, "product_id")?,
        payload: required_str(row, "payload")?,
        consumed: required_i64(row, "consumed")? != 0,
        transaction_ref: row.get_str("transaction_ref").map(String::from),
        create_at: required_str(row, "create_at")?,
        consumed_at: row.get_str("consumed_at").map(String::from),
    })
}
