//! # einvoice-core: Pure Logic for Electronic Invoice Emission
//!
//! This crate holds the domain model of fiscal invoice emission as pure
//! types and functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    E-Invoicing Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              einvoice-emit (Emission Orchestrator)              │   │
//! │  │    DirectProvider ── DelegatedProvider ── EntityReconciler      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ einvoice-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ lifecycle │  │ document  │  │ validation│  │   │
//! │  │   │Resolution │  │ Invoice   │  │ DIAN doc  │  │   rules   │  │   │
//! │  │   │ Snapshot  │  │  Status   │  │   CUFE    │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  einvoice-db (Database Layer)                   │   │
//! │  │        Numbering authority, invoice records, mappings           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Resolutions, invoice records, mappings, sale snapshots
//! - [`lifecycle`] - Invoice status state machine
//! - [`document`] - DIAN invoice document and CUFE digest
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use einvoice_core::{InvoiceStatus, ProviderKind};
//!
//! // Only the direct channel signs a document locally.
//! assert!(InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Signed, ProviderKind::Direct));
//! assert!(!InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Signed, ProviderKind::Delegated));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod document;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use document::{DianDocument, IssuerInfo};
pub use error::{CoreResult, InvoiceError, ValidationError};
pub use lifecycle::InvoiceStatus;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Permission an [`ActorContext`] must carry to emit invoices.
pub const EMIT_PERMISSION: &str = "einvoice.emit";

/// Maximum line items accepted on a single invoice.
///
/// ## Business Reason
/// Keeps provider payloads bounded; POS carts are capped well below this.
pub const MAX_LINE_ITEMS: usize = 500;

/// Maximum quantity of a single line item.
pub const MAX_ITEM_QUANTITY: i64 = 99_999;

/// Maximum length of a resolution prefix (DIAN allows up to 4 characters).
pub const MAX_PREFIX_LEN: usize = 4;
