use std::sync::Arc;

use tracing::{error, info, warn};

use stockroom_core::ServiceError;

use crate::catalog::CatalogIndex;
use crate::model::{AllocationResult, BotId};
use crate::pool::StockPool;

/// All-or-nothing claims of N units against one transaction reference.
///
/// Each unit is taken with a single conditional update, so concurrent
/// claims on the same product never hand out the same unit. When the pool
/// runs dry partway through, every unit already stamped with the reference
/// is released before the claim reports exhaustion.
pub struct AllocationEngine {
    pool: Arc<StockPool>,
    catalog: Arc<CatalogIndex>,
}

impl AllocationEngine {
    pub fn new(pool: Arc<StockPool>, catalog: Arc<CatalogIndex>) -> Self {
        Self { pool, catalog }
    }

    pub fn claim(
        &self,
        bot_id: BotId,
        product_id: &str,
        quantity: i64,
        transaction_ref: &str,
    ) -> Result<AllocationResult, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::Validation(format!(
                "quantity must be at least 1, got {quantity}"
            )));
        }
        let transaction_ref = transaction_ref.trim();
        if transaction_ref.is_empty() {
            return Err(ServiceError::Validation("transaction reference is required".into()));
        }
        if !self.catalog.product_exists(bot_id, product_id)? {
            return Err(ServiceError::NotFound(format!("product {bot_id}/{product_id}")));
        }
        // A rollback releases by reference, so a reused reference would
        // also release the earlier claim's units.
        if self.pool.count_by_transaction(transaction_ref)? > 0 {
            return Err(ServiceError::Conflict(format!(
                "transaction {transaction_ref} already holds units"
            )));
        }

        let mut units = Vec::new();
        while (units.len() as i64) < quantity {
            match self.pool.consume_one(bot_id, product_id, transaction_ref) {
                Ok(Some(unit)) => units.push(unit),
                Ok(None) => {
                    let released = self.pool.release_by_transaction(transaction_ref)?;
                    warn!(
                        bot_id,
                        product_id,
                        transaction_ref,
                        requested = quantity,
                        claimed = units.len(),
                        released,
                        "claim exhausted stock, rolled back"
                    );
                    return Err(ServiceError::StockExhausted(format!(
                        "product {product_id}: requested {quantity}, only {} available",
                        units.len()
                    )));
                }
                Err(e) => {
                    if let Err(release_err) = self.pool.release_by_transaction(transaction_ref) {
                        error!(
                            transaction_ref,
                            error = %release_err,
                            "rollback after failed claim did not complete"
                        );
                    }
                    return Err(e);
                }
            }
        }

        info!(bot_id, product_id, transaction_ref, quantity, "stock claimed");
        Ok(AllocationResult {
            transaction_ref: transaction_ref.to_string(),
            units,
        })
    }

    /// Return every unit stamped with `transaction_ref` to the pool.
    pub fn release(&self, transaction_ref: &str) -> Result<u64, ServiceError> {
        let transaction_ref = transaction_ref.trim();
        if transaction_ref.is_empty() {
            return Err(ServiceError::Validation("transaction reference is required".into()));
        }
        let released = self.pool.release_by_transaction(transaction_ref)?;
        info!(transaction_ref, released, "transaction released");
        Ok(released)
    }

    /// Units a transaction currently holds, in claim order.
    pub fn transaction_units(&self, transaction_ref: &str) -> Result<AllocationResult, ServiceError> {
        let transaction_ref = transaction_ref.trim();
        if transaction_ref.is_empty() {
            return Err(ServiceError::Validation("transaction reference is required".into()));
        }
        Ok(AllocationResult {
            transaction_ref: transaction_ref.to_string(),
            units: self.pool.units_by_transaction(transaction_ref)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_product, payloads, test_module};
    use crate::StockModule;

    fn stocked(items: &[&str]) -> StockModule {
        let m = test_module();
        m.catalog().create_product(1, new_product("X", 100)).unwrap();
        m.pool().insert(1, "X", &payloads(items)).unwrap();
        m
    }

    #[test]
    fn claim_takes_oldest_first() {
        let m = stocked(&["u1", "u2", "u3"]);
        let result = m.allocation().claim(1, "X", 2, "T1").unwrap();

        assert_eq!(result.payloads(), vec!["u1", "u2"]);
        assert!(result.units.iter().all(|u| u.consumed));
        assert!(result
            .units
            .iter()
            .all(|u| u.transaction_ref.as_deref() == Some("T1")));
        assert_eq!(m.pool().count_available(1, "X").unwrap(), 1);
    }

    #[test]
    fn shortfall_rolls_back_everything() {
        let m = stocked(&["u1", "u2", "u3"]);
        m.allocation().claim(1, "X", 2, "T1").unwrap();

        let err = m.allocation().claim(1, "X", 2, "T2").unwrap_err();
        assert!(matches!(err, ServiceError::StockExhausted(_)));
        assert_eq!(m.pool().count_available(1, "X").unwrap(), 1);
        assert!(m.pool().units_by_transaction("T2").unwrap().is_empty());

        // The released unit is claimable again.
        let again = m.allocation().claim(1, "X", 1, "T3").unwrap();
        assert_eq!(again.payloads(), vec!["u3"]);
    }

    #[test]
    fn claim_exact_pool_then_empty() {
        let m = stocked(&["u1", "u2"]);
        let result = m.allocation().claim(1, "X", 2, "T1").unwrap();
        assert_eq!(result.units.len(), 2);
        assert!(matches!(
            m.allocation().claim(1, "X", 1, "T2"),
            Err(ServiceError::StockExhausted(_))
        ));
    }

    #[test]
    fn invalid_arguments() {
        let m = stocked(&["u1"]);
        let engine = m.allocation();
        assert!(matches!(engine.claim(1, "X", 0, "T1"), Err(ServiceError::Validation(_))));
        assert!(matches!(engine.claim(1, "X", -3, "T1"), Err(ServiceError::Validation(_))));
        assert!(matches!(engine.claim(1, "X", 1, "  "), Err(ServiceError::Validation(_))));
        assert!(matches!(engine.claim(1, "NOPE", 1, "T1"), Err(ServiceError::NotFound(_))));
        assert!(matches!(engine.claim(2, "X", 1, "T1"), Err(ServiceError::NotFound(_))));
        assert_eq!(m.pool().count_available(1, "X").unwrap(), 1);
    }

    #[test]
    fn reused_reference_is_rejected() {
        let m = stocked(&["u1", "u2"]);
        m.allocation().claim(1, "X", 1, "T1").unwrap();
        assert!(matches!(
            m.allocation().claim(1, "X", 1, "T1"),
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(m.pool().units_by_transaction("T1").unwrap().len(), 1);
    }

    #[test]
    fn release_returns_units() {
        let m = stocked(&["u1", "u2", "u3"]);
        m.allocation().claim(1, "X", 2, "T1").unwrap();

        let held = m.allocation().transaction_units("T1").unwrap();
        assert_eq!(held.payloads(), vec!["u1", "u2"]);

        assert_eq!(m.allocation().release("T1").unwrap(), 2);
        assert_eq!(m.pool().count_available(1, "X").unwrap(), 3);
        assert_eq!(m.allocation().release("T1").unwrap(), 0);

        // Original FIFO order survives the release.
        let again = m.allocation().claim(1, "X", 1, "T1").unwrap();
        assert_eq!(again.payloads(), vec!["u1"]);
    }

    #[test]
    fn transaction_lookup_trims_reference() {
        let m = stocked(&["u1", "u2"]);
        m.allocation().claim(1, "X", 1, " tx-1 ").unwrap();

        let held = m.allocation().transaction_units(" tx-1 ").unwrap();
        assert_eq!(held.transaction_ref, "tx-1");
        assert_eq!(held.payloads(), vec!["u1"]);
        assert!(matches!(
            m.allocation().transaction_units("   "),
            Err(ServiceError::Validation(_))
        ));
    }
}
