// Billing modules that sit on top of the bus. Route tables are descriptive:
// the HTTP layer that mounts them lives outside this crate.

pub mod definitions;
pub mod modules;

use crate::adapters::memory::MemoryTransaction;
use crate::config::BusConfig;
use crate::core::context::ExecutionContext;
use crate::core::lifecycle::{App, LifecycleManager};
use crate::domain::ports::{ConnectionPool, Storage};
use crate::utils::error::Result;
use definitions::Definitions;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: &'static str,
    pub path: &'static str,
    pub procedure: String,
}

impl RouteSpec {
    pub fn new(method: &'static str, path: &'static str, procedure: &str) -> Self {
        Self {
            method,
            path,
            procedure: procedure.to_string(),
        }
    }
}

pub type Routes = Vec<RouteSpec>;

/// 依序啟動 debts、payments、reports 三個模組
pub async fn boot_billing(
    pool: Arc<dyn ConnectionPool>,
    config: Arc<BusConfig>,
    storage: Option<Arc<dyn Storage>>,
) -> Result<(Arc<Definitions>, App<Routes>)> {
    let defs = Definitions::new()?;

    let mut manager = LifecycleManager::new(pool, config)
        .module(modules::debts::DebtsModule::new(Arc::clone(&defs)))
        .module(modules::payments::PaymentsModule::new(Arc::clone(&defs)))
        .module(modules::reports::ReportsModule::new(Arc::clone(&defs)));
    if let Some(storage) = storage {
        manager = manager.with_storage(storage);
    }

    let app = manager.boot().await?;
    Ok((defs, app))
}

pub(crate) fn memory_tx(ctx: &ExecutionContext) -> Result<&MemoryTransaction> {
    ctx.transaction_as::<MemoryTransaction>()
}
