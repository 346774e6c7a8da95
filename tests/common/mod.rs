#![allow(dead_code)]

use async_trait::async_trait;
use billing_bus::adapters::MemoryDatabase;
use billing_bus::core::registry::Registrar;
use billing_bus::{App, BusConfig, LifecycleManager, Module, Result, SetupDeps};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Test module whose setup is a plain closure over the registrar.
pub struct SetupFn<F> {
    name: &'static str,
    setup: F,
}

impl<F> SetupFn<F> {
    pub fn new(name: &'static str, setup: F) -> Self {
        Self { name, setup }
    }
}

#[async_trait]
impl<F> Module for SetupFn<F>
where
    F: Fn(&mut Registrar) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn setup(&self, deps: &mut SetupDeps<'_>) -> Result<Option<Value>> {
        (self.setup)(deps.registrar())?;
        Ok(None)
    }
}

pub async fn boot_with<F>(setup: F) -> Result<(App, MemoryDatabase)>
where
    F: Fn(&mut Registrar) -> Result<()> + Send + Sync + 'static,
{
    boot_with_config(BusConfig::default(), setup).await
}

pub async fn boot_with_config<F>(config: BusConfig, setup: F) -> Result<(App, MemoryDatabase)>
where
    F: Fn(&mut Registrar) -> Result<()> + Send + Sync + 'static,
{
    let db = MemoryDatabase::new();
    let app = LifecycleManager::new(Arc::new(db.clone()), Arc::new(config))
        .module(SetupFn::new("test", setup))
        .boot()
        .await?;
    Ok((app, db))
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
