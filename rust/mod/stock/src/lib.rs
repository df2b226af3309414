pub mod allocation;
pub mod bot;
pub mod bulk;
pub mod catalog;
pub mod model;
pub mod pool;
pub mod repair;
pub mod schema;

use std::sync::Arc;

use stockroom_core::{ServiceError, StockLimits};
use stockroom_sql::SQLStore;

use allocation::AllocationEngine;
use bot::BotDirectory;
use bulk::BulkMutator;
use catalog::CatalogIndex;
use pool::StockPool;
use repair::RepairSweep;

/// The stock module: pooled inventory, catalog cascades and claims.
///
/// All components share one store; build it once per process and hand out
/// the component you need.
pub struct StockModule {
    pool: Arc<StockPool>,
    catalog: Arc<CatalogIndex>,
    allocation: Arc<AllocationEngine>,
    bulk: BulkMutator,
    repair: RepairSweep,
}

impl StockModule {
    /// Initialise the schema and wire the components together.
    pub fn new(
        sql: Arc<dyn SQLStore>,
        limits: StockLimits,
        bots: Arc<dyn BotDirectory>,
    ) -> Result<Self, ServiceError> {
        schema::init_schema(sql.as_ref())?;

        let pool = Arc::new(StockPool::new(Arc::clone(&sql), limits));
        let catalog = Arc::new(CatalogIndex::new(Arc::clone(&sql), Arc::clone(&pool), bots));
        let allocation = Arc::new(AllocationEngine::new(Arc::clone(&pool), Arc::clone(&catalog)));

        Ok(Self {
            bulk: BulkMutator::new(Arc::clone(&pool)),
            repair: RepairSweep::new(sql, Arc::clone(&pool)),
            pool,
            catalog,
            allocation,
        })
    }

    pub fn pool(&self) -> &Arc<StockPool> {
        &self.pool
    }

    pub fn catalog(&self) -> &Arc<CatalogIndex> {
        &self.catalog
    }

    pub fn allocation(&self) -> &Arc<AllocationEngine> {
        &self.allocation
    }

    pub fn bulk(&self) -> &BulkMutator {
        &self.bulk
    }

    pub fn repair(&self) -> &RepairSweep {
        &self.repair
    }
}
