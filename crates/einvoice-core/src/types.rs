//! # Domain Types
//!
//! Core domain types of invoice emission.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ Numbering       │   │ InvoiceRecord   │   │ Reconciliation  │       │
//! │  │ Resolution      │◄──│  ─────────────  │   │ Mapping         │       │
//! │  │  ─────────────  │   │  sale_id (uniq) │   │  ─────────────  │       │
//! │  │  range, current │   │  status         │   │  tenant, kind,  │       │
//! │  │  validity, key  │   │  legal_code     │   │  internal → ext │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │ 1:N                                   │
//! │                        ┌────────▼────────┐                              │
//! │                        │InvoiceTransition│  audit trail                 │
//! │                        └─────────────────┘                              │
//! │                                                                         │
//! │  Collaborator inputs (read-only):                                       │
//! │  SaleSnapshot ──► ClientSnapshot, SaleLineItem ──► ProductRef           │
//! │  ActorContext                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Rows owned here use UUID v4 strings as `id`. Sale, client and product ids
//! belong to the POS and are carried as opaque strings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lifecycle::InvoiceStatus;
use crate::money::Money;
use crate::document::COLOMBIA_OFFSET_HOURS;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01%. Colombian IVA of 19% is 1900 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Percentage with two decimals, as DIAN prints it ("19.00").
    pub fn percent_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Provider Kind
// =============================================================================

/// Which channel emits the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The tax authority's own channel (DIAN). Numbers come from a resolution.
    Direct,
    /// A billing intermediary (Alegra). The intermediary numbers the invoice.
    Delegated,
}

impl ProviderKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Direct => "direct",
            ProviderKind::Delegated => "delegated",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Entity Kind
// =============================================================================

/// Internal entity kinds that have a provider-side counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Client,
    Product,
}

impl EntityKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Product => "product",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Numbering Resolution
// =============================================================================

/// A government-authorized block of invoice numbers for one tenant.
///
/// ## Counter Semantics
/// ```text
/// range_start = 1, range_end = 5
///
///   current = 0  → nothing issued yet, next number is 1
///   current = 3  → 1,2,3 issued, next number is 4
///   current = 5  → exhausted
/// ```
/// `current` only ever moves up, one step per allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct NumberingResolution {
    pub id: String,
    pub tenant_id: String,
    /// The authority's resolution identifier, printed on documents.
    pub resolution_number: String,
    pub prefix: Option<String>,
    pub range_start: i64,
    /// Inclusive.
    pub range_end: i64,
    /// Last issued number (`range_start - 1` when fresh).
    pub current: i64,
    pub valid_from: NaiveDate,
    /// Inclusive.
    pub valid_to: NaiveDate,
    pub active: bool,
    /// Opaque key hashed into every CUFE issued under this resolution.
    pub technical_key: String,
    pub created_at: DateTime<Utc>,
}

impl NumberingResolution {
    /// Checks whether `date` falls inside the validity window.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_to
    }

    /// Whether this resolution may issue a number on `date`.
    pub fn can_issue_on(&self, date: NaiveDate) -> bool {
        self.active && self.covers(date) && !self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current >= self.range_end
    }

    /// Numbers still available.
    pub fn remaining(&self) -> i64 {
        (self.range_end - self.current).max(0)
    }

    /// Formats an issued number with the resolution prefix ("SETP" + 42).
    pub fn format_number(&self, number: i64) -> String {
        format_invoice_number(self.prefix.as_deref(), number)
    }
}

/// Input for registering a new resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResolution {
    pub tenant_id: String,
    pub resolution_number: String,
    #[serde(default)]
    pub prefix: Option<String>,
    pub range_start: i64,
    pub range_end: i64,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub technical_key: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Joins an optional prefix and a number into the printed invoice number.
pub fn format_invoice_number(prefix: Option<&str>, number: i64) -> String {
    format!("{}{}", prefix.unwrap_or(""), number)
}

// =============================================================================
// Invoice Record
// =============================================================================

/// Persisted lifecycle of the electronic invoice for one sale.
///
/// Created lazily on the first emission attempt and never deleted. A retry
/// is a new attempt on the same row, since `sale_id` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InvoiceRecord {
    pub id: String,
    pub sale_id: String,
    pub tenant_id: String,
    /// Resolution the number was drawn from. Direct only.
    pub resolution_ref: Option<String>,
    /// Number drawn from `resolution_ref`, kept across retries.
    pub invoice_number: Option<i64>,
    pub invoice_prefix: Option<String>,
    pub provider: ProviderKind,
    /// The provider's own id for the invoice.
    pub external_id: Option<String>,
    /// Fiscal stamp (CUFE). Immutable and globally unique once set.
    pub legal_code: Option<String>,
    pub status: InvoiceStatus,
    /// Last error or rejection reason.
    pub status_message: Option<String>,
    /// Emission attempts started for this record.
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceRecord {
    /// A number has been burned onto this record.
    pub fn has_number(&self) -> bool {
        self.invoice_number.is_some()
    }

    /// Printed invoice number, when one was allocated.
    pub fn full_number(&self) -> Option<String> {
        self.invoice_number
            .map(|n| format_invoice_number(self.invoice_prefix.as_deref(), n))
    }
}

/// One row of an invoice's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InvoiceTransition {
    pub id: String,
    pub invoice_id: String,
    pub from_status: InvoiceStatus,
    pub to_status: InvoiceStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Reconciliation Mapping
// =============================================================================

/// Cached translation of an internal entity to its provider-side id.
///
/// Unique on (`tenant_id`, `entity_kind`, `internal_id`). Never updated in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReconciliationMapping {
    pub tenant_id: String,
    pub entity_kind: EntityKind,
    pub internal_id: String,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale Snapshot (collaborator input)
// =============================================================================

/// Read-only view of a completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSnapshot {
    pub id: String,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub client: ClientSnapshot,
    pub line_items: Vec<SaleLineItem>,
}

impl SaleSnapshot {
    /// Sum of line subtotals before tax.
    pub fn subtotal(&self) -> Money {
        self.line_items.iter().map(SaleLineItem::subtotal).sum()
    }

    /// Sum of per-line taxes.
    pub fn tax_total(&self) -> Money {
        self.line_items.iter().map(SaleLineItem::tax).sum()
    }

    pub fn total(&self) -> Money {
        self.subtotal() + self.tax_total()
    }

    /// Calendar date of the sale in Colombian local time.
    pub fn local_date(&self) -> NaiveDate {
        (self.created_at.naive_utc() - chrono::Duration::hours(COLOMBIA_OFFSET_HOURS)).date()
    }

    /// Catalog products referenced by the sale, deduplicated by id.
    pub fn linked_products(&self) -> Vec<&ProductRef> {
        let mut seen: Vec<&ProductRef> = Vec::new();
        for product in self.line_items.iter().filter_map(|l| l.product_ref.as_ref()) {
            if !seen.iter().any(|p| p.id == product.id) {
                seen.push(product);
            }
        }
        seen
    }
}

/// The buyer of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub id: String,
    pub name: String,
    /// DIAN identification type code ("13" cédula, "31" NIT).
    #[serde(default = "default_document_type")]
    pub document_type: String,
    pub document_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

fn default_document_type() -> String {
    "13".to_string()
}

/// A line of a sale, frozen at the time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineItem {
    /// Catalog product, when the line was sold from the catalog.
    #[serde(default)]
    pub product_ref: Option<ProductRef>,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    #[serde(default)]
    pub tax_rate_bps: u32,
}

impl SaleLineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// unit_price × quantity.
    pub fn subtotal(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }

    pub fn tax(&self) -> Money {
        self.subtotal().calculate_tax(self.tax_rate())
    }
}

/// Catalog product linked from a sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
}

impl ProductRef {
    /// Natural key used to find the product at a provider.
    ///
    /// Blank SKUs count as missing.
    pub fn natural_key(&self) -> Option<&str> {
        self.sku.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Reference sent when creating the product remotely.
    pub fn reference(&self) -> String {
        match self.natural_key() {
            Some(sku) => sku.to_string(),
            None => format!("INT-{}", self.id),
        }
    }
}

// =============================================================================
// Actor Context (collaborator input)
// =============================================================================

/// Pre-validated caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub tenant_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl ActorContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
