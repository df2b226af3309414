//! Operational backstop for stock and category rows whose product is gone.
//!
//! Rename and delete cascades commit atomically, so orphans only appear
//! from data written outside this module (imports, manual edits).

use std::sync::Arc;

use tracing::{info, warn};

use stockroom_core::ServiceError;
use stockroom_sql::{SQLStore, Value};

use crate::model::{BotId, OrphanReport};
use crate::pool::StockPool;
use crate::schema::{product_exists, required_i64, required_str, sql_error};

pub struct RepairSweep {
    sql: Arc<dyn SQLStore>,
    pool: Arc<StockPool>,
}

impl RepairSweep {
    pub fn new(sql: Arc<dyn SQLStore>, pool: Arc<StockPool>) -> Self {
        Self { sql, pool }
    }

    pub fn scan(&self, bot_id: BotId) -> Result<OrphanReport, ServiceError> {
        let stock_rows = self
            .sql
            .query(
                "SELECT s.product_id AS product_id, COUNT(*) AS cnt FROM stock_units s \
                 WHERE s.bot_id = ?1 AND NOT EXISTS \
                   (SELECT 1 FROM products p WHERE p.bot_id = s.bot_id AND p.product_id = s.product_id) \
                 GROUP BY s.product_id ORDER BY s.product_id ASC",
                &[Value::Integer(bot_id)],
            )
            .map_err(sql_error)?;
        let stock = stock_rows
            .iter()
            .map(|r| Ok((required_str(r, "product_id")?, required_i64(r, "cnt")?.max(0) as u64)))
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let member_rows = self
            .sql
            .query(
                "SELECT m.category AS category, m.product_id AS product_id FROM category_members m \
                 WHERE m.bot_id = ?1 AND NOT EXISTS \
                   (SELECT 1 FROM products p WHERE p.bot_id = m.bot_id AND p.product_id = m.product_id) \
                 ORDER BY m.category ASC, m.position ASC",
                &[Value::Integer(bot_id)],
            )
            .map_err(sql_error)?;
        let category_refs = member_rows
            .iter()
            .map(|r| Ok((required_str(r, "category")?, required_str(r, "product_id")?)))
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let report = OrphanReport { stock, category_refs };
        if !report.is_clean() {
            warn!(
                bot_id,
                stock = report.stock.len(),
                category_refs = report.category_refs.len(),
                "orphaned rows found"
            );
        }
        Ok(report)
    }

    /// Delete every unit, in any state, of a product id with no product row.
    pub fn purge_orphan_stock(&self, bot_id: BotId, product_id: &str) -> Result<u64, ServiceError> {
        if product_exists(self.sql.as_ref(), bot_id, product_id)? {
            return Err(ServiceError::Conflict(format!(
                "product {bot_id}/{product_id} exists, its stock is not orphaned"
            )));
        }
        let purged = self.pool.delete_all_for_product(bot_id, product_id)?;
        info!(bot_id, product_id, purged, "orphaned stock purged");
        Ok(purged)
    }

    /// Repoint orphaned units of `from_id` at the existing product `to_id`.
    pub fn reattach_orphan_stock(
        &self,
        bot_id: BotId,
        from_id: &str,
        to_id: &str,
    ) -> Result<u64, ServiceError> {
        if !product_exists(self.sql.as_ref(), bot_id, to_id)? {
            return Err(ServiceError::NotFound(format!("product {bot_id}/{to_id}")));
        }
        if product_exists(self.sql.as_ref(), bot_id, from_id)? {
            return Err(ServiceError::Conflict(format!(
                "product {bot_id}/{from_id} exists, its stock is not orphaned"
            )));
        }
        let moved = self.pool.reassign_product(bot_id, from_id, to_id)?;
        info!(bot_id, from_id, to_id, moved, "orphaned stock reattached");
        Ok(moved)
    }
}
