//! Interface tokens shared by the billing modules. Nothing here depends on
//! a module implementation, so modules can call each other without import
//! cycles.

use crate::core::definition::{Event, Interface, Procedure};
use crate::core::schema::{self, Refined};
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type DebtId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDebt {
    pub center: String,
    pub debtor: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: DebtId,
    pub center: String,
    pub debtor: String,
    pub amount_cents: i64,
    pub status: DebtStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub debt_id: DebtId,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePayment {
    pub debt_id: DebtId,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub debt_id: DebtId,
    pub method: String,
    pub reference: String,
    pub settled: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CenterSummary {
    pub center: String,
    pub debt_count: u64,
    pub total_cents: i64,
}

pub struct DebtsApi {
    pub create: Procedure<NewDebt, Debt>,
    pub get: Procedure<DebtId, Option<Debt>>,
    pub mark_paid: Procedure<DebtId, Debt>,
    pub created: Event<Debt>,
}

/// Tagged variants: one implementation per payment method.
pub struct PaymentTypeApi {
    pub pay: Procedure<PaymentRequest, PaymentReceipt>,
}

pub struct PaymentsApi {
    pub create: Procedure<CreatePayment, PaymentReceipt>,
    pub methods: Procedure<(), Vec<String>>,
}

pub struct ReportsApi {
    pub center_summary: Procedure<String, CenterSummary>,
    pub export_summary: Procedure<String, String>,
}

pub struct Definitions {
    pub debts: Interface<DebtsApi>,
    pub payment_types: Interface<PaymentTypeApi>,
    pub payments: Interface<PaymentsApi>,
    pub reports: Interface<ReportsApi>,
}

fn positive_amount(amount_cents: i64) -> std::result::Result<(), String> {
    if amount_cents > 0 {
        Ok(())
    } else {
        Err(format!("amount_cents must be positive, got {}", amount_cents))
    }
}

impl Definitions {
    pub fn new() -> Result<Arc<Self>> {
        let debts = Interface::create("debts", |scope| {
            Ok(DebtsApi {
                create: scope.procedure_with(
                    "create",
                    Arc::new(Refined::<NewDebt>::new(|debt| {
                        if debt.center.trim().is_empty() {
                            return Err("center is required".to_string());
                        }
                        positive_amount(debt.amount_cents)
                    })),
                    schema::typed::<Debt>(),
                )?,
                get: scope.procedure("get")?,
                mark_paid: scope.procedure("mark_paid")?,
                created: scope.event("debt_created")?,
            })
        })?;

        let payment_types = Interface::create("payment_type", |scope| {
            Ok(PaymentTypeApi {
                pay: scope.procedure_with(
                    "pay",
                    Arc::new(Refined::<PaymentRequest>::new(|req| positive_amount(req.amount_cents))),
                    schema::typed::<PaymentReceipt>(),
                )?,
            })
        })?;

        let payments = Interface::create("payments", |scope| {
            Ok(PaymentsApi {
                create: scope.procedure("create")?,
                methods: scope.procedure("methods")?,
            })
        })?;

        let reports = Interface::create("reports", |scope| {
            Ok(ReportsApi {
                center_summary: scope.procedure("center_summary")?,
                export_summary: scope.procedure("export_summary")?,
            })
        })?;

        Ok(Arc::new(Self {
            debts,
            payment_types,
            payments,
            reports,
        }))
    }
}
