//! # einvoice-db: Database Layer for Electronic Invoicing
//!
//! Persistence for numbering resolutions, invoice records and reconciliation
//! mappings, on SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Emission Data Flow                                 │
//! │                                                                         │
//! │  EmissionService (einvoice-emit)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  einvoice-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ ResolutionRepo     │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│   allocate()       │  │ 001_init   │  │   │
//! │  │   │ Connection    │    │ InvoiceRepo        │  │            │  │   │
//! │  │   │ Management    │    │   transition()     │  │            │  │   │
//! │  │   │               │    │ MappingRepo        │  │            │  │   │
//! │  │   └───────────────┘    │   insert_or_get()  │  └────────────┘  │   │
//! │  │                        └────────────────────┘                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (einvoice.db)                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Numbering authority, invoice store, mapping store
//!
//! ## Usage
//!
//! ```rust,ignore
//! use einvoice_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("einvoice.db")).await?;
//! let number = db.resolutions().allocate(&resolution_id, today).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::invoice::{InvoiceRepository, Transition};
pub use repository::mapping::MappingRepository;
pub use repository::resolution::{Allocation, ResolutionRepository};
