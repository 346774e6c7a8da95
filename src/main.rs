use billing_bus::adapters::{LocalStorage, MemoryDatabase};
use billing_bus::app::definitions::{CreatePayment, NewDebt};
use billing_bus::app::{boot_billing, modules::payments};
use billing_bus::domain::ports::Storage;
use billing_bus::utils::{logger, validation::Validate};
use billing_bus::{BusConfig, BusError, CliArgs};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // 載入配置（未指定時使用預設值）
    let config = match &args.config {
        Some(path) => BusConfig::from_file(path)?,
        None => BusConfig::default(),
    };

    // 初始化日誌
    logger::init_logger(&config, args.verbose, args.json_logs);

    tracing::info!("Starting {}", config.app.name);
    if args.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let storage: Option<Arc<dyn Storage>> = config
        .storage
        .as_ref()
        .map(|s| Arc::new(LocalStorage::new(&s.base_path)) as Arc<dyn Storage>);

    let db = MemoryDatabase::new();
    let (defs, app) = match boot_billing(Arc::new(db.clone()), Arc::new(config), storage).await {
        Ok(booted) => booted,
        Err(e) => {
            // 啟動失敗：不允許部分初始化的系統
            tracing::error!("❌ Boot failed: {} (Category: {:?})", e, e.category());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(3);
        }
    };

    for mount in app.mounts() {
        for route in &mount.routes {
            tracing::info!(
                "🔗 {} {}{} -> {}",
                route.method,
                mount.prefix,
                route.path,
                route.procedure
            );
        }
    }

    let session = Some(json!({ "user_id": 1, "is_admin": true }));

    let debt = app
        .execute(session.clone(), |bus| {
            let defs = Arc::clone(&defs);
            async move {
                bus.exec(
                    &defs.debts.procedures.create,
                    NewDebt {
                        center: "membership".to_string(),
                        debtor: "Aino Virtanen".to_string(),
                        amount_cents: 2500,
                    },
                )
                .await
            }
        })
        .await?;
    println!("✅ Created debt #{} ({} cents)", debt.id, debt.amount_cents);

    // 已註冊與未註冊的付款方式各試一次
    for method in [payments::CASH, "stripe"] {
        let result = app
            .execute(session.clone(), |bus| {
                let defs = Arc::clone(&defs);
                let create = CreatePayment {
                    debt_id: debt.id,
                    method: method.to_string(),
                };
                async move { bus.exec(&defs.payments.procedures.create, create).await }
            })
            .await;

        match result {
            Ok(receipt) => println!("✅ Paid with {}: {}", receipt.method, receipt.reference),
            Err(e @ BusError::NoSuchHandler { .. }) => {
                println!("⚠️  {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let summary = app
        .execute(session, |bus| {
            let defs = Arc::clone(&defs);
            async move {
                bus.exec(&defs.reports.procedures.center_summary, "membership".to_string())
                    .await
            }
        })
        .await?;
    println!(
        "📊 {}: {} debts, {} cents total",
        summary.center, summary.debt_count, summary.total_cents
    );
    println!(
        "📊 Transactions: {} committed, {} rolled back",
        db.commit_count(),
        db.rollback_count()
    );

    Ok(())
}
