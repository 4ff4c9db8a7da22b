//! # Seed Data Generator
//!
//! Populates a database with a small retail network for development.
//!
//! ## Usage
//! ```bash
//! # Seed with defaults (2 warehouses, 4 merchants)
//! cargo run -p stockline-db --bin seed
//!
//! # Custom merchant count
//! cargo run -p stockline-db --bin seed -- --merchants 10
//!
//! # Specify database path (otherwise STOCKLINE_DATABASE_PATH or ./stockline_dev.db)
//! cargo run -p stockline-db --bin seed -- --db ./data/stockline.db
//! ```
//!
//! ## What Gets Created
//! - Warehouses `W-01`, `W-02`
//! - Merchants `M-01` .. `M-NN`
//! - One product per catalog entry
//! - Goods receipt into each warehouse (manual adjustment)
//! - An assignment from warehouse to every merchant (transfer)
//!
//! Ends with a drift check: every snapshot row must equal its ledger balance.

use std::env;
use stockline_core::{Direction, Location, TransferRequest};
use stockline_db::{Database, LedgerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Demo catalog: (name, price in cents)
const CATALOG: &[(&str, i64)] = &[
    ("Sparkling Water 500ml", 129),
    ("Cola 330ml", 199),
    ("Orange Juice 1L", 349),
    ("Potato Chips 150g", 279),
    ("Dark Chocolate 100g", 249),
    ("Espresso Beans 250g", 899),
    ("Oat Milk 1L", 319),
    ("Greek Yogurt 500g", 459),
    ("Basmati Rice 1kg", 529),
    ("Olive Oil 500ml", 1099),
];

const WAREHOUSES: &[(&str, &str)] = &[("W-01", "North Depot"), ("W-02", "South Depot")];

const SEED_ACTOR: &str = "seed";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut merchants: usize = 4;
    let mut db_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--merchants" | "-m" => {
                if i + 1 < args.len() {
                    merchants = args[i + 1].parse().unwrap_or(4);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockline Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -m, --merchants <N>  Number of merchant stores (default: 4)");
                println!("  -d, --db <PATH>      Database file path (default: ./stockline_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::from_env()?;
    config.database_path = db_path
        .or_else(|| env::var("STOCKLINE_DATABASE_PATH").ok())
        .unwrap_or_else(|| "./stockline_dev.db".to_string());

    info!(path = %config.database_path, merchants, "Seeding stockline database");

    let db = Database::new(config.into_db_config()).await?;

    if !db.stock().all_levels().await?.is_empty() {
        info!("Database already holds stock; skipping seed. Delete the file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    for (id, name) in WAREHOUSES {
        db.locations().insert_warehouse(id, name).await?;
    }

    let merchant_ids: Vec<String> = (1..=merchants).map(|n| format!("M-{:02}", n)).collect();
    for (n, id) in merchant_ids.iter().enumerate() {
        db.locations()
            .insert_merchant(id, &format!("Store #{}", n + 1))
            .await?;
    }

    let mut transfers = 0usize;
    for (seed, (name, price_cents)) in CATALOG.iter().enumerate() {
        let product = db.products().create(name, *price_cents, None).await?;

        let (warehouse_id, _) = WAREHOUSES[seed % WAREHOUSES.len()];
        let received = 200 + ((seed * 37) % 300) as i64;

        db.recorder()
            .adjust(
                &product.id,
                &Location::warehouse(warehouse_id),
                Direction::In,
                received,
                SEED_ACTOR,
                Some("initial goods receipt"),
            )
            .await?;

        for (n, merchant_id) in merchant_ids.iter().enumerate() {
            let amount = 5 + ((seed + n * 7) % 20) as i64;
            let request = TransferRequest::new(&product.id, amount, SEED_ACTOR);
            match db
                .transfers()
                .assign_to_merchant(warehouse_id, merchant_id, &request)
                .await
            {
                Ok(_) => transfers += 1,
                Err(e) => error!(product = %product.name, merchant = %merchant_id, error = %e, "Assignment failed"),
            }
        }
    }

    info!(
        products = CATALOG.len(),
        transfers,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Seed data written"
    );

    // Verify the ledger
    let drift = db.reports().find_drift().await?;
    if drift.is_empty() {
        info!("Ledger check passed: every stock level matches its ledger balance");
    } else {
        for r in &drift {
            error!(
                product_id = %r.product_id,
                location = %r.location,
                snapshot = r.snapshot,
                ledger_balance = r.ledger_balance,
                "Drift detected"
            );
        }
        return Err(format!("{} stock levels drifted from the ledger", drift.len()).into());
    }

    db.close().await;
    Ok(())
}
