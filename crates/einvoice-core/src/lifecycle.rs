//! # Invoice Lifecycle
//!
//! The status state machine every invoice record moves through.
//!
//! ## State Diagram
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌───────┐  direct  ┌────────┐       ┌──────┐       ┌──────────┐       │
//! │   │ draft │─────────►│ signed │──────►│ sent │──────►│ accepted │       │
//! │   └───┬───┘          └───┬────┘       └──┬───┘       └──────────┘       │
//! │       │    delegated     │               │  ▲                           │
//! │       ├──────────────────┼───────────────┼──┘        ┌──────────┐       │
//! │       │                  │               └──────────►│ rejected │       │
//! │       │                  │               │           └──────────┘       │
//! │       ▼                  ▼               ▼                              │
//! │   ┌──────────────────────────────────────────┐                          │
//! │   │                  error                   │  retry re-enters any     │
//! │   └──────────────────────────────────────────┘  non-error state         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `accepted` is terminal. `rejected` is terminal for the provider; only an
//! explicit re-emission reopens it. `error` is retry-eligible.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ProviderKind;

// =============================================================================
// Invoice Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Record exists, nothing submitted.
    Draft,
    /// Number allocated and document built locally (direct channel).
    Signed,
    /// Provider holds the invoice, fiscal stamp pending.
    Sent,
    /// Fiscal stamp obtained.
    Accepted,
    /// Provider explicitly refused the invoice.
    Rejected,
    /// Last attempt failed; retry-eligible.
    Error,
}

impl InvoiceStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Signed => "signed",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Accepted => "accepted",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Error => "error",
        }
    }

    /// Checks whether the edge `self -> next` is allowed for `provider`.
    ///
    /// ## Allowed Edges
    /// | from                 | to                                      |
    /// |----------------------|-----------------------------------------|
    /// | draft                | signed*, sent, error                    |
    /// | signed               | sent, error                             |
    /// | sent                 | accepted, rejected, error               |
    /// | error                | draft, signed*, sent, accepted, rejected|
    /// | rejected             | draft, signed*                          |
    /// | accepted             | (none)                                  |
    ///
    /// `*` direct channel only: delegated invoices never hold a local number.
    pub fn can_transition_to(&self, next: InvoiceStatus, provider: ProviderKind) -> bool {
        use InvoiceStatus::*;

        match (self, next) {
            (Draft, Signed) | (Error, Signed) | (Rejected, Signed) => {
                provider == ProviderKind::Direct
            }
            (Draft, Sent) | (Signed, Sent) => true,
            (Sent, Accepted) | (Sent, Rejected) => true,
            (Draft, Error) | (Signed, Error) | (Sent, Error) => true,
            (Error, Draft) | (Error, Sent) => true,
            (Error, Accepted) | (Error, Rejected) => true,
            (Rejected, Draft) => true,
            _ => false,
        }
    }

    /// No further provider interaction happens from this state on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Accepted | InvoiceStatus::Rejected)
    }

    /// An explicit emission may restart the pipeline from this state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Draft | InvoiceStatus::Signed | InvoiceStatus::Error | InvoiceStatus::Rejected
        )
    }
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        InvoiceStatus::Draft
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
