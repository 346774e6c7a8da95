use crate::app::definitions::{Definitions, PaymentReceipt, PaymentRequest};
use crate::app::{memory_tx, RouteSpec, Routes};
use crate::core::lifecycle::{Exports, Module, SetupDeps};
use crate::utils::error::{BusError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const CASH: &str = "cash";
pub const INVOICE: &str = "invoice";

/// 付款模組：`payment_type` 介面的每個付款方式以標籤註冊
pub struct PaymentsModule {
    defs: Arc<Definitions>,
}

impl PaymentsModule {
    pub fn new(defs: Arc<Definitions>) -> Self {
        Self { defs }
    }

    fn register_cash(&self, deps: &mut SetupDeps<'_>) -> Result<()> {
        let api = &self.defs.payment_types;
        let defs = Arc::clone(&self.defs);
        deps.registrar()
            .provide_named(api, CASH)
            .handle(&api.procedures.pay, move |req: PaymentRequest, _ctx, bus| {
                let defs = Arc::clone(&defs);
                async move {
                    let debt = bus
                        .exec(&defs.debts.procedures.get, req.debt_id)
                        .await?
                        .ok_or_else(|| BusError::handler_msg(format!("debt #{} not found", req.debt_id)))?;
                    if req.amount_cents < debt.amount_cents {
                        return Err(BusError::handler_msg(format!(
                            "cash payment of {} does not cover debt #{} ({})",
                            req.amount_cents, debt.id, debt.amount_cents
                        )));
                    }
                    bus.exec(&defs.debts.procedures.mark_paid, debt.id).await?;
                    Ok(PaymentReceipt {
                        debt_id: debt.id,
                        method: CASH.to_string(),
                        reference: format!("CASH-{:06}", debt.id),
                        settled: true,
                    })
                }
            })?;
        Ok(())
    }

    fn register_invoice(&self, deps: &mut SetupDeps<'_>) -> Result<()> {
        let api = &self.defs.payment_types;
        let defs = Arc::clone(&self.defs);
        deps.registrar()
            .provide_named(api, INVOICE)
            .handle(&api.procedures.pay, move |req: PaymentRequest, ctx, bus| {
                let defs = Arc::clone(&defs);
                async move {
                    let debt = bus
                        .exec(&defs.debts.procedures.get, req.debt_id)
                        .await?
                        .ok_or_else(|| BusError::handler_msg(format!("debt #{} not found", req.debt_id)))?;
                    let receipt = PaymentReceipt {
                        debt_id: debt.id,
                        method: INVOICE.to_string(),
                        reference: format!("RF{:02}{:010}", debt.id % 97, debt.id),
                        settled: false,
                    };
                    memory_tx(&ctx)?
                        .put_as(&format!("invoices/{:08}", debt.id), &receipt)
                        .await?;
                    Ok(receipt)
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl Module<Routes> for PaymentsModule {
    fn name(&self) -> &str {
        "payments"
    }

    async fn setup(&self, deps: &mut SetupDeps<'_>) -> Result<Option<Value>> {
        self.register_cash(deps)?;
        self.register_invoice(deps)?;

        let api = &self.defs.payments;
        let defs = Arc::clone(&self.defs);
        let methods_defs = Arc::clone(&self.defs);

        deps.registrar()
            .provide(api)
            .handle(&api.procedures.create, move |create, _ctx, bus| {
                let defs = Arc::clone(&defs);
                async move {
                    // 未註冊的付款方式直接回報 NoSuchHandler，沒有預設實作
                    let variant = bus.get_interface(&defs.payment_types, &create.method)?;
                    let debt = bus
                        .exec(&defs.debts.procedures.get, create.debt_id)
                        .await?
                        .ok_or_else(|| BusError::handler_msg(format!("debt #{} not found", create.debt_id)))?;
                    variant
                        .exec(
                            &variant.procedures().pay,
                            PaymentRequest {
                                debt_id: debt.id,
                                amount_cents: debt.amount_cents,
                            },
                        )
                        .await
                }
            })?
            .handle(&api.procedures.methods, move |(), _ctx, bus| {
                let defs = Arc::clone(&methods_defs);
                async move { Ok(bus.variants(&defs.payment_types)) }
            })?;

        Ok(Some(json!({ "methods": [CASH, INVOICE] })))
    }

    fn routes(&self, _exports: &Exports) -> Option<Routes> {
        Some(vec![
            RouteSpec::new("POST", "/", "payments.create"),
            RouteSpec::new("GET", "/methods", "payments.methods"),
        ])
    }
}
