use crate::app::definitions::{CenterSummary, Debt, Definitions};
use crate::app::{memory_tx, RouteSpec, Routes};
use crate::core::lifecycle::{Exports, Module, SetupDeps};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

fn summary_key(center: &str) -> String {
    format!("reports/centers/{}", center)
}

pub struct ReportsModule {
    defs: Arc<Definitions>,
}

impl ReportsModule {
    pub fn new(defs: Arc<Definitions>) -> Self {
        Self { defs }
    }
}

#[async_trait]
impl Module<Routes> for ReportsModule {
    fn name(&self) -> &str {
        "reports"
    }

    async fn setup(&self, deps: &mut SetupDeps<'_>) -> Result<Option<Value>> {
        deps.registrar()
            .on(&self.defs.debts.procedures.created, |debt: Debt, ctx, _bus| async move {
                let tx = memory_tx(&ctx)?;
                let key = summary_key(&debt.center);
                let mut summary = tx
                    .get_as::<CenterSummary>(&key)
                    .await?
                    .unwrap_or_else(|| CenterSummary {
                        center: debt.center.clone(),
                        ..CenterSummary::default()
                    });
                summary.debt_count += 1;
                summary.total_cents += debt.amount_cents;
                tx.put_as(&key, &summary).await
            })?;

        let api = &self.defs.reports;
        let defs = Arc::clone(&self.defs);
        deps.registrar()
            .provide(api)
            .handle(&api.procedures.center_summary, |center: String, ctx, _bus| async move {
                let summary = memory_tx(&ctx)?
                    .get_as::<CenterSummary>(&summary_key(&center))
                    .await?;
                Ok(summary.unwrap_or(CenterSummary {
                    center,
                    ..CenterSummary::default()
                }))
            })?
            .handle(&api.procedures.export_summary, move |center: String, ctx, bus| {
                let defs = Arc::clone(&defs);
                async move {
                    let summary = bus
                        .exec(&defs.reports.procedures.center_summary, center.clone())
                        .await?;
                    let path = format!("reports/{}.json", center);
                    let body = serde_json::to_vec_pretty(&summary)?;
                    ctx.services().storage()?.write_file(&path, &body).await?;
                    tracing::info!("📁 Report for '{}' saved to {}", center, path);
                    Ok(path)
                }
            })?;

        Ok(None)
    }

    fn routes(&self, _exports: &Exports) -> Option<Routes> {
        Some(vec![
            RouteSpec::new("GET", "/centers/:center", "reports.center_summary"),
            RouteSpec::new("POST", "/centers/:center/export", "reports.export_summary"),
        ])
    }
}
