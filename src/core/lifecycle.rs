//! Module lifecycle: one-time setup, registry freeze, route hand-off and the
//! per-request transaction boundary.

use crate::config::BusConfig;
use crate::core::context::{ExecutionContext, StaticServices};
use crate::core::dispatcher::Bus;
use crate::core::registry::{Registrar, Registry};
use crate::domain::ports::{ConnectionPool, Storage, Transaction};
use crate::utils::error::{BusError, Result};
use crate::utils::validation;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Instrument;

/// Data each module's `setup` chose to export, keyed by module name.
pub type Exports = HashMap<String, Value>;

/// Shared dependencies handed to every module during setup.
pub struct SetupDeps<'a> {
    registrar: &'a mut Registrar,
    pool: Arc<dyn ConnectionPool>,
    config: Arc<BusConfig>,
    storage: Option<Arc<dyn Storage>>,
}

impl SetupDeps<'_> {
    pub fn registrar(&mut self) -> &mut Registrar {
        &mut *self.registrar
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    pub fn config(&self) -> &Arc<BusConfig> {
        &self.config
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }
}

/// `R` is whatever the HTTP layer mounts (a router, a route table...).
#[async_trait]
pub trait Module<R = ()>: Send + Sync {
    fn name(&self) -> &str;

    /// 只在啟動時執行一次；所有註冊與訂閱都必須在這裡完成
    async fn setup(&self, deps: &mut SetupDeps<'_>) -> Result<Option<Value>>;

    fn routes(&self, _exports: &Exports) -> Option<R> {
        None
    }
}

pub struct Mount<R> {
    pub module: String,
    pub prefix: String,
    pub routes: R,
}

pub struct LifecycleManager<R = ()> {
    modules: Vec<Box<dyn Module<R>>>,
    pool: Arc<dyn ConnectionPool>,
    config: Arc<BusConfig>,
    storage: Option<Arc<dyn Storage>>,
}

impl<R: 'static> LifecycleManager<R> {
    pub fn new(pool: Arc<dyn ConnectionPool>, config: Arc<BusConfig>) -> Self {
        Self {
            modules: Vec::new(),
            pool,
            config,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn module<M>(mut self, module: M) -> Self
    where
        M: Module<R> + 'static,
    {
        self.modules.push(Box::new(module));
        self
    }

    fn check_module_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            validation::validate_identifier("module.name", module.name())?;
            if !seen.insert(module.name()) {
                return Err(BusError::Config {
                    message: format!("module '{}' is declared twice", module.name()),
                });
            }
        }
        Ok(())
    }

    /// Runs every `setup` once, in declaration order. Any failure aborts the
    /// whole boot; no partially initialized `App` is ever returned.
    pub async fn boot(self) -> Result<App<R>> {
        self.check_module_names()?;

        let mut registrar =
            Registrar::new().with_subscriber_failure(self.config.subscriber_failure());
        let mut exports = Exports::new();

        for module in &self.modules {
            let name = module.name().to_string();
            tracing::info!("⚙️  Setting up module '{}'", name);

            let mut deps = SetupDeps {
                registrar: &mut registrar,
                pool: Arc::clone(&self.pool),
                config: Arc::clone(&self.config),
                storage: self.storage.clone(),
            };
            let exported = module
                .setup(&mut deps)
                .await
                .map_err(|e| BusError::SetupFailed {
                    module: name.clone(),
                    source: Box::new(e),
                })?;

            if let Some(value) = exported {
                exports.insert(name, value);
            }
        }

        let registry = Arc::new(registrar.freeze());
        tracing::info!(
            "✅ Booted {} modules ({} handlers registered)",
            self.modules.len(),
            registry.handler_count()
        );

        let mounts = self
            .modules
            .iter()
            .filter_map(|module| {
                module.routes(&exports).map(|routes| Mount {
                    module: module.name().to_string(),
                    prefix: format!("/{}", module.name()),
                    routes,
                })
            })
            .collect();

        let mut services = StaticServices::new(self.config);
        if let Some(storage) = self.storage {
            services = services.with_storage(storage);
        }

        Ok(App {
            registry,
            pool: self.pool,
            services,
            mounts,
            exports,
            next_request: AtomicU64::new(0),
        })
    }
}

/// A booted system: frozen registry plus the request boundary.
pub struct App<R = ()> {
    registry: Arc<Registry>,
    pool: Arc<dyn ConnectionPool>,
    services: StaticServices,
    mounts: Vec<Mount<R>>,
    exports: Exports,
    next_request: AtomicU64,
}

impl<R> App<R> {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn mounts(&self) -> &[Mount<R>] {
        &self.mounts
    }

    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    pub fn services(&self) -> &StaticServices {
        &self.services
    }

    /// 為外部請求建立上下文（交易由呼叫端持有）
    pub fn context(&self, transaction: Arc<dyn Transaction>, session: Option<Value>) -> Arc<ExecutionContext> {
        let id = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(ExecutionContext::new(
            format!("req-{}", id),
            transaction,
            session,
            self.services.clone(),
        ))
    }

    pub fn bind(&self, context: Arc<ExecutionContext>) -> Bus {
        Bus::new(Arc::clone(&self.registry), context)
    }

    /// One external request: begin a transaction, run `f` with a bus bound
    /// to a fresh context, commit on `Ok`, roll back on `Err`.
    pub async fn execute<T, F, Fut>(&self, session: Option<Value>, f: F) -> Result<T>
    where
        F: FnOnce(Bus) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let transaction = self.pool.begin().await?;
        let context = self.context(Arc::clone(&transaction), session);
        let span = tracing::info_span!("request", request_id = %context.request_id());
        let bus = self.bind(context);

        async move {
            match f(bus).await {
                Ok(value) => {
                    transaction.commit().await?;
                    tracing::debug!("Request committed");
                    Ok(value)
                }
                Err(e) => {
                    tracing::warn!("Request failed, rolling back: {}", e);
                    if let Err(rollback_err) = transaction.rollback().await {
                        tracing::error!("❌ Rollback failed: {}", rollback_err);
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
