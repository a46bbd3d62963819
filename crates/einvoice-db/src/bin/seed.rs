//! # Resolution Seeder
//!
//! Registers a DIAN test-set numbering resolution for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default test resolution for tenant "dev"
//! cargo run -p einvoice-db --bin seed
//!
//! # Custom tenant, range and database
//! cargo run -p einvoice-db --bin seed -- --tenant shop-7 --from 1 --to 5000 --db ./data/einvoice.db
//! ```
//!
//! ## Seeded Resolution
//! - Resolution number `18760000001`, prefix `SETP`
//! - Valid from today for one year
//! - The technical key DIAN publishes for its habilitación test set

use chrono::{Months, Utc};
use einvoice_core::NewResolution;
use einvoice_db::{Database, DbConfig};
use std::env;

/// Technical key of the DIAN habilitación test set.
const TEST_SET_TECHNICAL_KEY: &str = "fc8eac422eba16e22ffd8c6f94b3f40a6e38162c";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut tenant_id = String::from("dev");
    let mut db_path = String::from("./einvoice_dev.db");
    let mut range_start: i64 = 990_000_000;
    let mut range_end: i64 = 995_000_000;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-t" | "--tenant" => {
                if i + 1 < args.len() {
                    tenant_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "-d" | "--db" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--from" => {
                if i + 1 < args.len() {
                    range_start = args[i + 1].parse().unwrap_or(range_start);
                    i += 1;
                }
            }
            "--to" => {
                if i + 1 < args.len() {
                    range_end = args[i + 1].parse().unwrap_or(range_end);
                    i += 1;
                }
            }
            "-h" | "--help" => {
                println!("E-Invoice Resolution Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -t, --tenant <ID>    Tenant to seed (default: dev)");
                println!("  -d, --db <PATH>      Database file path (default: ./einvoice_dev.db)");
                println!("      --from <N>       First number of the range (default: 990000000)");
                println!("      --to <N>         Last number of the range (default: 995000000)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 E-Invoice Resolution Seeder");
    println!("==============================");
    println!("Database: {}", db_path);
    println!("Tenant:   {}", tenant_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let today = Utc::now().date_naive();
    if let Some(active) = db.resolutions().active_for(&tenant_id, today).await? {
        println!(
            "⚠ Tenant already has active resolution {} ({} numbers left)",
            active.resolution_number,
            active.remaining()
        );
        println!("  Skipping seed.");
        return Ok(());
    }

    let valid_to = today
        .checked_add_months(Months::new(12))
        .ok_or("validity window out of range")?;

    let resolution = db
        .resolutions()
        .create(&NewResolution {
            tenant_id: tenant_id.clone(),
            resolution_number: "18760000001".to_string(),
            prefix: Some("SETP".to_string()),
            range_start,
            range_end,
            valid_from: today,
            valid_to,
            technical_key: TEST_SET_TECHNICAL_KEY.to_string(),
            active: true,
        })
        .await?;

    println!();
    println!("✓ Resolution {} registered", resolution.id);
    println!(
        "  SETP{} … SETP{}, valid {} to {}",
        resolution.range_start, resolution.range_end, resolution.valid_from, resolution.valid_to
    );

    db.close().await;
    Ok(())
}
