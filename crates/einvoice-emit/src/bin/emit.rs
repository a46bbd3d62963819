//! # Emission CLI
//!
//! Emits one sale from a JSON snapshot, or inspects an invoice record.
//!
//! ## Usage
//! ```bash
//! # Emit the invoice of a sale snapshot
//! cargo run -p einvoice-emit --bin emit -- --config ./einvoice.toml --sale ./sale.json
//!
//! # Retry transient failures per [emission] max_retries
//! cargo run -p einvoice-emit --bin emit -- --sale ./sale.json --retry
//!
//! # Show the stored record of a sale
//! cargo run -p einvoice-emit --bin emit -- --status sale-123
//!
//! # Check a tenant's provider credentials
//! cargo run -p einvoice-emit --bin emit -- --check --tenant tenant-1
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr (`RUST_LOG` filters them).
//! A failed emission exits with 2 when the configuration is at fault, 1
//! otherwise.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use einvoice_core::SaleSnapshot;
use einvoice_db::Database;
use einvoice_emit::{EmissionConfig, EmissionService, FailureKind};
use serde_json::json;
use tracing_subscriber::EnvFilter;

enum Command {
    Emit { sale: PathBuf, retry: bool },
    Status { sale_id: String },
    Check { tenant_id: String },
}

fn print_help() {
    println!("E-Invoice Emission CLI");
    println!();
    println!("Usage: emit [OPTIONS] <--sale <PATH> | --status <SALE_ID> | --check --tenant <ID>>");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>    Configuration file (default: platform config dir)");
    println!("  -s, --sale <PATH>      Emit the sale snapshot stored in PATH (JSON)");
    println!("      --retry            Retry transient failures with backoff");
    println!("      --status <SALE_ID> Print the invoice record of a sale");
    println!("      --check            Check provider credentials (needs --tenant)");
    println!("  -t, --tenant <ID>      Tenant for --check");
    println!("  -h, --help             Show this help message");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,einvoice=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut sale_path: Option<PathBuf> = None;
    let mut status_id: Option<String> = None;
    let mut tenant_id: Option<String> = None;
    let mut check = false;
    let mut retry = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "-s" | "--sale" => {
                if i + 1 < args.len() {
                    sale_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--status" => {
                if i + 1 < args.len() {
                    status_id = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "-t" | "--tenant" => {
                if i + 1 < args.len() {
                    tenant_id = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--check" => check = true,
            "--retry" => retry = true,
            "-h" | "--help" => {
                print_help();
                return Ok(ExitCode::SUCCESS);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_help();
                return Ok(ExitCode::from(2));
            }
        }
        i += 1;
    }

    let command = match (sale_path, status_id, check, tenant_id) {
        (Some(sale), None, false, _) => Command::Emit { sale, retry },
        (None, Some(sale_id), false, _) => Command::Status { sale_id },
        (None, None, true, Some(tenant_id)) => Command::Check { tenant_id },
        _ => {
            print_help();
            return Ok(ExitCode::from(2));
        }
    };

    init_tracing();

    let config = EmissionConfig::load(config_path)?;
    let db = Database::new(config.database.to_db_config()).await?;

    let code = match command {
        Command::Emit { sale, retry } => {
            let contents = std::fs::read_to_string(&sale)?;
            let sale: SaleSnapshot = serde_json::from_str(&contents)?;

            let service = EmissionService::from_config(db.clone(), &config, &sale.tenant_id)?;
            let outcome = if retry {
                service.emit_with_retry(&sale).await
            } else {
                service.emit(&sale).await
            };

            match outcome {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    ExitCode::SUCCESS
                }
                Err(failure) => {
                    println!("{}", serde_json::to_string_pretty(&failure.report())?);
                    match failure.kind() {
                        FailureKind::Config => ExitCode::from(2),
                        _ => ExitCode::FAILURE,
                    }
                }
            }
        }
        Command::Status { sale_id } => match db.invoices().get_by_sale(&sale_id).await? {
            Some(record) => {
                let history = db.invoices().history(&record.id).await?;
                let report = json!({ "record": record, "history": history });
                println!("{}", serde_json::to_string_pretty(&report)?);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("No invoice for sale {sale_id}");
                ExitCode::FAILURE
            }
        },
        Command::Check { tenant_id } => {
            let service = EmissionService::from_config(db.clone(), &config, &tenant_id)?;
            match service.check_credentials().await {
                Ok(()) => {
                    println!("✓ {} credentials accepted", service.provider_kind());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("✗ {} credentials check failed: {}", service.provider_kind(), e);
                    ExitCode::FAILURE
                }
            }
        }
    };

    db.close().await;
    Ok(code)
}
