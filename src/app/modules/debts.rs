use crate::app::definitions::{Debt, DebtId, DebtStatus, Definitions};
use crate::app::{memory_tx, RouteSpec, Routes};
use crate::core::lifecycle::{Exports, Module, SetupDeps};
use crate::utils::error::{BusError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const NEXT_ID_KEY: &str = "debts/next_id";

fn debt_key(id: DebtId) -> String {
    format!("debts/{:08}", id)
}

pub struct DebtsModule {
    defs: Arc<Definitions>,
}

impl DebtsModule {
    pub fn new(defs: Arc<Definitions>) -> Self {
        Self { defs }
    }
}

#[async_trait]
impl Module<Routes> for DebtsModule {
    fn name(&self) -> &str {
        "debts"
    }

    async fn setup(&self, deps: &mut SetupDeps<'_>) -> Result<Option<Value>> {
        let api = &self.defs.debts;
        let defs = Arc::clone(&self.defs);

        deps.registrar()
            .provide(api)
            .handle(&api.procedures.create, move |new_debt, ctx, bus| {
                let defs = Arc::clone(&defs);
                async move {
                    let tx = memory_tx(&ctx)?;
                    let id = tx.get_as::<DebtId>(NEXT_ID_KEY).await?.unwrap_or(0) + 1;
                    tx.put_as(NEXT_ID_KEY, &id).await?;

                    let debt = Debt {
                        id,
                        center: new_debt.center,
                        debtor: new_debt.debtor,
                        amount_cents: new_debt.amount_cents,
                        status: DebtStatus::Unpaid,
                    };
                    tx.put_as(&debt_key(id), &debt).await?;
                    tracing::debug!("Created debt #{} for {}", id, debt.debtor);

                    // 訂閱者與本次寫入共用同一個交易
                    bus.emit(&defs.debts.procedures.created, debt.clone()).await?;
                    Ok(debt)
                }
            })?
            .handle(&api.procedures.get, |id, ctx, _bus| async move {
                memory_tx(&ctx)?.get_as::<Debt>(&debt_key(id)).await
            })?
            .handle(&api.procedures.mark_paid, |id, ctx, _bus| async move {
                let tx = memory_tx(&ctx)?;
                let mut debt = tx
                    .get_as::<Debt>(&debt_key(id))
                    .await?
                    .ok_or_else(|| BusError::handler_msg(format!("debt #{} not found", id)))?;
                if debt.status == DebtStatus::Paid {
                    return Err(BusError::handler_msg(format!("debt #{} is already paid", id)));
                }
                debt.status = DebtStatus::Paid;
                tx.put_as(&debt_key(id), &debt).await?;
                Ok(debt)
            })?;

        Ok(Some(json!({ "procedures": api.procedure_names() })))
    }

    fn routes(&self, _exports: &Exports) -> Option<Routes> {
        Some(vec![
            RouteSpec::new("POST", "/", "debts.create"),
            RouteSpec::new("GET", "/:id", "debts.get"),
            RouteSpec::new("POST", "/:id/mark-paid", "debts.mark_paid"),
        ])
    }
}
