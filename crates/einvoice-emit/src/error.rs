//! # Emission Error Types
//!
//! Error types for the emission pipeline.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Emission Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Provider     │  │     Business rules      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Rejected       │  │  Invoice(InvoiceError)  │ │
//! │  │  NotConfigured  │  │  Unreachable    │  │  Forbidden              │ │
//! │  │  InvalidUrl     │  │  ExternalProv.  │  │  SaleNotFound           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Only `ProviderUnreachable` (directly, or as the cause of an            │
//! │  `ExternalProvider` failure) is retryable: the outcome is unknown and   │
//! │  the next attempt runs the recovery query before resubmitting.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use einvoice_core::{EntityKind, InvoiceError};
use einvoice_db::DbError;
use thiserror::Error;

/// Result type alias for emission operations.
pub type EmitResult<T> = Result<T, EmitError>;

/// Everything that can stop an emission.
#[derive(Debug, Error)]
pub enum EmitError {
    // =========================================================================
    // Business Rule Errors
    // =========================================================================
    /// Numbering, lifecycle or validation rule violated.
    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    /// Actor lacks the emit permission or belongs to another tenant.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The sale source has no sale with this id.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// The provider answered and said no.
    #[error("Provider rejected the request: {reason}")]
    ProviderRejected { reason: String },

    /// The provider could not be reached, timed out, or answered garbage.
    /// Whether it acted on the request is unknown.
    #[error("Provider unreachable: {cause}")]
    ProviderUnreachable { cause: String },

    /// A client or product could not be reconciled with the provider.
    #[error("Could not reconcile {entity_kind} '{internal_id}': {cause}")]
    ExternalProvider {
        entity_kind: EntityKind,
        internal_id: String,
        #[source]
        cause: Box<EmitError>,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// No provider configuration applies to this tenant.
    #[error("No provider configured for tenant '{tenant_id}'")]
    NotConfigured { tenant_id: String },

    /// Invalid emission configuration.
    #[error("Invalid emission configuration: {0}")]
    InvalidConfig(String),

    /// Invalid provider URL.
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Storage failure.
    #[error("Database error: {0}")]
    Database(DbError),

    /// Failed to (de)serialize a payload.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Pipeline invariant broken.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for EmitError {
    fn from(err: DbError) -> Self {
        // Rule violations detected in SQL surface as the domain error itself.
        match err {
            DbError::Invoice(invoice) => EmitError::Invoice(invoice),
            other => EmitError::Database(other),
        }
    }
}

impl From<serde_json::Error> for EmitError {
    fn from(err: serde_json::Error) -> Self {
        EmitError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for EmitError {
    fn from(err: url::ParseError) -> Self {
        EmitError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for EmitError {
    fn from(err: std::io::Error) -> Self {
        EmitError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EmitError {
    fn from(err: toml::de::Error) -> Self {
        EmitError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EmitError {
    fn from(err: toml::ser::Error) -> Self {
        EmitError::ConfigSaveFailed(err.to_string())
    }
}

impl From<reqwest::Error> for EmitError {
    fn from(err: reqwest::Error) -> Self {
        // Every transport-level failure leaves the remote outcome unknown.
        EmitError::ProviderUnreachable {
            cause: err.to_string(),
        }
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl EmitError {
    /// Wraps a remote failure that happened while reconciling an entity.
    pub fn external(entity_kind: EntityKind, internal_id: impl Into<String>, cause: EmitError) -> Self {
        EmitError::ExternalProvider {
            entity_kind,
            internal_id: internal_id.into(),
            cause: Box::new(cause),
        }
    }

    /// Returns true if the same emission may succeed when tried again.
    ///
    /// ## Retryable Errors
    /// - Provider unreachable (timeout, connection refused, garbled reply)
    /// - Reconciliation failures caused by an unreachable provider
    ///
    /// ## Non-Retryable Errors
    /// - Provider rejections
    /// - Numbering exhausted, invalid resolution, state machine violations
    /// - Configuration and authorization errors
    pub fn is_retryable(&self) -> bool {
        match self {
            EmitError::ProviderUnreachable { .. } => true,
            EmitError::ExternalProvider { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EmitError::InvalidConfig(_)
                | EmitError::NotConfigured { .. }
                | EmitError::InvalidUrl(_)
                | EmitError::ConfigLoadFailed(_)
                | EmitError::ConfigSaveFailed(_)
        )
    }

    /// Returns the domain error, if this is one.
    pub fn as_invoice_error(&self) -> Option<&InvoiceError> {
        match self {
            EmitError::Invoice(err) => Some(err),
            _ => None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
