//! Seed data script - stocks the component ledger for local runs
//!
//! Run with: cargo run --bin seed-data -- --units 200 --back-model Aero
//!
//! This creates or tops up:
//! - factory-level stock for every generic chair component
//! - one `back` record per `--back-model`
//! - one active handler with the factory role

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use furnishop_api::{
    config, db,
    entities::handler,
    models::ComponentType,
    services::requirements::CHAIR_BILL_OF_MATERIALS,
    services::stock_ledger::{ReplenishStockRequest, StockLedgerService},
};

#[derive(Debug, Parser)]
#[command(name = "seed-data", about = "Seed component stock and a factory handler")]
struct Args {
    /// Database URL; defaults to the configured one
    #[arg(long)]
    database_url: Option<String>,

    /// Chairs worth of generic components to add
    #[arg(long, default_value_t = 100)]
    units: i32,

    /// Back models to stock (repeatable)
    #[arg(long = "back-model")]
    back_models: Vec<String>,

    /// Name of the factory handler to create
    #[arg(long, default_value = "Main factory")]
    handler_name: String,

    /// Skip creating the factory handler
    #[arg(long)]
    no_handler: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut cfg = config::load_config().context("loading configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);
    if let Some(url) = args.database_url.clone() {
        cfg.database_url = url;
    }
    anyhow::ensure!(args.units > 0, "--units must be positive");

    info!("Connecting to database: {}", cfg.database_url);
    let pool = db::establish_connection_from_app_config(&cfg).await?;
    db::run_migrations(&pool).await?;
    let pool = Arc::new(pool);
    let ledger = StockLedgerService::new(pool.clone());

    info!("Stocking generic components...");
    for (component, per_chair) in CHAIR_BILL_OF_MATERIALS
        .iter()
        .copied()
        .chain(std::iter::once((ComponentType::Headrest, 1)))
    {
        let record = ledger
            .replenish(ReplenishStockRequest {
                component_type: component,
                model: None,
                furniture_type: None,
                shop: None,
                quantity: per_chair * args.units,
            })
            .await?;
        info!("  {:<10} -> {}", component.as_str(), record.quantity);
    }

    for model in &args.back_models {
        let record = ledger
            .replenish(ReplenishStockRequest {
                component_type: ComponentType::Back,
                model: Some(model.clone()),
                furniture_type: None,
                shop: None,
                quantity: args.units,
            })
            .await?;
        info!("  back model {:<10} -> {}", model, record.quantity);
    }

    if !args.no_handler {
        let created = handler::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(args.handler_name.clone()),
            role: Set(cfg.factory_role.clone()),
            active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*pool)
        .await?;
        info!("Created {} handler {} ({})", created.role, created.name, created.id);
    }

    info!("Seed data complete");
    Ok(())
}
