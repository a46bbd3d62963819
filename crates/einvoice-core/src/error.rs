//! # Error Types
//!
//! Domain-specific error types for einvoice-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  einvoice-core errors (this file)                                       │
//! │  ├── InvoiceError     - Numbering + lifecycle rule violations           │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  einvoice-db errors (separate crate)                                    │
//! │  └── DbError          - Database failures, wraps InvoiceError           │
//! │                                                                         │
//! │  einvoice-emit errors (separate crate)                                  │
//! │  └── EmitError        - Provider + orchestration failures               │
//! │                                                                         │
//! │  Flow: ValidationError → InvoiceError → DbError → EmitError → caller   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Categories
//! - Configuration/business: `ResolutionInvalid`, `NumberingExhausted`,
//!   `OverlappingResolution`. Surfaced verbatim, never retried.
//! - Invariant protection: `InvalidTransition`, `DuplicateLegalCode`,
//!   `LegalCodeImmutable`, `AlreadyAccepted`, `PendingConfirmation`,
//!   `ProviderMismatch`. A caller bug or a race another attempt already won.

use thiserror::Error;

use crate::lifecycle::InvoiceStatus;
use crate::types::ProviderKind;

// =============================================================================
// Invoice Error
// =============================================================================

/// Fiscal numbering and invoice lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvoiceError {
    /// The resolution cannot issue numbers right now.
    ///
    /// ## When This Occurs
    /// - Resolution is inactive
    /// - Today is outside `[valid_from, valid_to]`
    /// - Tenant has no active resolution at all
    #[error("Resolution {resolution} cannot issue numbers: {reason}")]
    ResolutionInvalid { resolution: String, reason: String },

    /// Every number of the resolution has already been issued.
    #[error("Resolution {resolution} is exhausted (last number {range_end})")]
    NumberingExhausted { resolution: String, range_end: i64 },

    /// An active resolution already covers part of the requested window.
    #[error("Tenant {tenant_id} already has active resolution {existing} overlapping this validity window")]
    OverlappingResolution { tenant_id: String, existing: String },

    /// The invoice state machine does not allow this edge.
    #[error("Invalid invoice transition {from} -> {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    /// Another invoice already holds this fiscal stamp.
    #[error("Legal code '{legal_code}' is already assigned to another invoice")]
    DuplicateLegalCode { legal_code: String },

    /// The invoice already has a different fiscal stamp.
    #[error("Invoice for sale {sale_id} already has legal code '{current}'")]
    LegalCodeImmutable { sale_id: String, current: String },

    /// The invoice was accepted; emitting again would double bill.
    #[error("Invoice for sale {sale_id} is already accepted")]
    AlreadyAccepted { sale_id: String },

    /// The provider holds the invoice and the fiscal stamp is still pending.
    #[error("Invoice for sale {sale_id} was sent and awaits provider confirmation")]
    PendingConfirmation { sale_id: String },

    /// The record belongs to a different provider and can no longer move.
    #[error("Invoice for sale {sale_id} was started with the {recorded} provider, not {requested}")]
    ProviderMismatch {
        sale_id: String,
        recorded: ProviderKind,
        requested: ProviderKind,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a sale snapshot or a resolution definition does
/// not meet requirements. Checked before any number is allocated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid document number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with InvoiceError.
pub type CoreResult<T> = Result<T, InvoiceError>;

// =============================================================================
// Unit Tests
// =============================================================================
