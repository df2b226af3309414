use std::sync::Arc;

use stockroom_core::ServiceError;

use crate::model::{BotId, IngestOutcome, RemovalEntry, RemovalOutcome};
use crate::pool::StockPool;

/// Validation front for bulk stock ingestion and removal.
///
/// Cleans raw admin input, then hands a batch the pool accepts whole or
/// not at all.
pub struct BulkMutator {
    pool: Arc<StockPool>,
}

impl BulkMutator {
    pub fn new(pool: Arc<StockPool>) -> Self {
        Self { pool }
    }

    /// Trim every entry and drop the ones left empty.
    pub fn normalize<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
        raw.iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn add_stock<S: AsRef<str>>(
        &self,
        bot_id: BotId,
        product_id: &str,
        raw: &[S],
    ) -> Result<IngestOutcome, ServiceError> {
        let payloads = Self::normalize(raw);
        if payloads.is_empty() {
            return Err(ServiceError::Validation(
                "no stock entries left after trimming blanks".into(),
            ));
        }

        let inserted = self.pool.insert(bot_id, product_id, &payloads)?;
        let available = self.pool.count_available(bot_id, product_id)?;
        Ok(IngestOutcome { inserted, available })
    }

    /// Remove available units named by id or by exact payload.
    pub fn remove_stock<S: AsRef<str>>(
        &self,
        bot_id: BotId,
        product_id: &str,
        raw: &[S],
    ) -> Result<RemovalOutcome, ServiceError> {
        let entries: Vec<RemovalEntry> = Self::normalize(raw)
            .iter()
            .map(|e| RemovalEntry::classify(e))
            .collect();
        if entries.is_empty() {
            return Err(ServiceError::Validation(
                "no removal entries left after trimming blanks".into(),
            ));
        }
        self.pool.remove_by_identity(bot_id, product_id, &entries)
    }
}
