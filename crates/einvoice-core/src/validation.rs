//! # Validation Module
//!
//! Business rule validation for sale snapshots and numbering resolutions.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (before any number is burned)                     │
//! │  ├── Sale snapshot: client identity, line items, amounts                │
//! │  └── Resolution: range, validity window, prefix                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                             │
//! │  ├── CHECK constraints on ranges                                        │
//! │  ├── UNIQUE sale_id, legal_code, mapping keys                           │
//! │  └── Foreign keys with ON DELETE RESTRICT                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Provider (authority / intermediary validation)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Numbers are not reversible, so a sale the authority would bounce for a
//! missing document number must fail here, not after allocation.
//!
//! ## Usage
//! ```rust
//! use einvoice_core::validation::{validate_prefix, validate_quantity};
//!
//! assert!(validate_prefix(Some("SETP")).is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{ClientSnapshot, NewResolution, SaleLineItem, SaleSnapshot};
use crate::{MAX_ITEM_QUANTITY, MAX_LINE_ITEMS, MAX_PREFIX_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// DIAN identification type codes accepted for a buyer.
const DOCUMENT_TYPES: [&str; 8] = ["11", "12", "13", "21", "22", "31", "41", "42"];

// =============================================================================
// Field Validators
// =============================================================================

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a resolution prefix.
///
/// ## Rules
/// - Optional
/// - At most 4 characters
/// - ASCII letters and digits only
pub fn validate_prefix(prefix: Option<&str>) -> ValidationResult<()> {
    let Some(prefix) = prefix else {
        return Ok(());
    };

    if prefix.len() > MAX_PREFIX_LEN {
        return Err(ValidationError::TooLong {
            field: "prefix".to_string(),
            max: MAX_PREFIX_LEN,
        });
    }

    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "prefix".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a line quantity (1..=MAX_ITEM_QUANTITY).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 1 || qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a unit price. Zero is allowed (courtesy items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: "unit_price_cents".to_string(),
        });
    }
    Ok(())
}

/// Validates a tax rate (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate_bps".to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Validates the buyer of an invoice.
///
/// ## Rules
/// - Name and document number required
/// - Document number is digits only (NIT check digit travels separately)
/// - Document type is a DIAN identification code
pub fn validate_client(client: &ClientSnapshot) -> ValidationResult<()> {
    require("client.name", &client.name)?;
    require("client.document_number", &client.document_number)?;

    if !client.document_number.trim().chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "client.document_number".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    if !DOCUMENT_TYPES.contains(&client.document_type.as_str()) {
        return Err(ValidationError::NotAllowed {
            field: "client.document_type".to_string(),
            allowed: DOCUMENT_TYPES.iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(())
}

pub fn validate_line_item(item: &SaleLineItem) -> ValidationResult<()> {
    require("line_items.name", &item.name)?;
    validate_quantity(item.quantity)?;
    validate_price_cents(item.unit_price_cents)?;
    validate_tax_rate_bps(item.tax_rate_bps)?;
    Ok(())
}

/// Validates a sale before it is turned into an invoice.
///
/// ## Example
/// ```rust,ignore
/// validate_sale(&snapshot)?; // before allocating a number
/// ```
pub fn validate_sale(sale: &SaleSnapshot) -> ValidationResult<()> {
    require("sale.id", &sale.id)?;
    require("sale.tenant_id", &sale.tenant_id)?;
    validate_client(&sale.client)?;

    if sale.line_items.is_empty() {
        return Err(ValidationError::Required {
            field: "line_items".to_string(),
        });
    }

    if sale.line_items.len() > MAX_LINE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "line_items".to_string(),
            min: 1,
            max: MAX_LINE_ITEMS as i64,
        });
    }

    for item in &sale.line_items {
        validate_line_item(item)?;
    }

    Ok(())
}

/// Validates a resolution before it is stored.
///
/// ## Rules
/// - `1 <= range_start <= range_end`
/// - `valid_from <= valid_to`
/// - Resolution number and technical key required
/// - Prefix per [`validate_prefix`]
pub fn validate_new_resolution(res: &NewResolution) -> ValidationResult<()> {
    require("tenant_id", &res.tenant_id)?;
    require("resolution_number", &res.resolution_number)?;
    require("technical_key", &res.technical_key)?;
    validate_prefix(res.prefix.as_deref())?;

    if res.range_start < 1 {
        return Err(ValidationError::MustBePositive {
            field: "range_start".to_string(),
        });
    }

    if res.range_end < res.range_start {
        return Err(ValidationError::OutOfRange {
            field: "range_end".to_string(),
            min: res.range_start,
            max: i64::MAX,
        });
    }

    if res.valid_to < res.valid_from {
        return Err(ValidationError::InvalidFormat {
            field: "valid_to".to_string(),
            reason: "must not be before valid_from".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
