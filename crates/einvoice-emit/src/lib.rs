//! # einvoice-emit: Emission Pipeline for Electronic Invoices
//!
//! Turns a completed sale into a legally valid electronic invoice, either by
//! stamping it ourselves against the DIAN (Direct) or by handing it to Alegra
//! (Delegated).
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Emission Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                 EmissionService (orchestrator)                   │   │
//! │  │                                                                  │   │
//! │  │  emit / emit_sale / emit_for / emit_with_retry                   │   │
//! │  │  status / record_confirmation                                    │   │
//! │  └──────────┬──────────────────────┬─────────────────────┬──────────┘   │
//! │             ▼                      ▼                     ▼              │
//! │  ┌────────────────────┐  ┌──────────────────┐  ┌──────────────────┐     │
//! │  │ einvoice-db        │  │  Reconciler      │  │ InvoiceProvider  │     │
//! │  │                    │  │                  │  │                  │     │
//! │  │ allocate numbers   │  │ client/product → │  │ DirectProvider   │     │
//! │  │ record transitions │  │ provider id,     │  │ DelegatedProvider│     │
//! │  │ mapping store      │  │ single-flight    │  │                  │     │
//! │  └────────────────────┘  └──────────────────┘  └──────────────────┘     │
//! │                                                                         │
//! │  ┌────────────────────┐  ┌──────────────────┐                           │
//! │  │ EmissionConfig     │  │ KeyedLocks       │                           │
//! │  │ TOML + EINVOICE_*  │  │ per-sale and     │                           │
//! │  │ provider_for()     │  │ per-entity locks │                           │
//! │  └────────────────────┘  └──────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Emission configuration (database, timeouts, providers)
//! - [`error`] - Emission error types
//! - [`locks`] - Per-key async locks
//! - [`orchestrator`] - The `EmissionService` pipeline
//! - [`provider`] - Direct and Delegated adapters
//! - [`reconciler`] - Client/product reconciliation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use einvoice_db::Database;
//! use einvoice_emit::{EmissionConfig, EmissionService};
//!
//! let config = EmissionConfig::load(None)?;
//! let db = Database::new(config.database.to_db_config()).await?;
//!
//! let service = EmissionService::from_config(db, &config, "tenant-1")?;
//! let result = service.emit(&sale).await?;
//! println!("{} {:?}", result.status, result.legal_code);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod provider;
pub mod reconciler;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{
    DatabaseSettings, DelegatedSettings, DirectSettings, EmissionConfig, EmissionSettings,
    ProviderSettings, ProvidersConfig,
};
pub use error::{EmitError, EmitResult};
pub use locks::KeyedLocks;
pub use orchestrator::{
    EmissionFailure, EmissionService, FailureKind, FailureReport, InvoiceResult, RetryPolicy,
    SaleSource,
};
pub use provider::{
    DelegatedProvider, DirectProvider, InvoiceProvider, RemoteCatalog, SubmissionOutcome,
    SubmissionStatus,
};
pub use reconciler::{Candidate, Reconciler};
