//! # Money Module
//!
//! Provides the `Money` type for invoice amounts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  FISCAL AMOUNTS MUST RECONCILE EXACTLY                                  │
//! │                                                                         │
//! │  The CUFE digest hashes the subtotal, tax and total as decimal text.    │
//! │  If our total differs from the authority's by one centavo the stamp     │
//! │  does not verify.                                                       │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (centavos)                           │
//! │    119000 centavos = $1190.00                                           │
//! │    Tax is rounded ONCE per line, half-up, with integer math             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use einvoice_core::money::Money;
//! use einvoice_core::types::TaxRate;
//!
//! let unit = Money::from_cents(1000_00);
//! let line = unit.multiply_quantity(2);
//! let iva = line.calculate_tax(TaxRate::from_bps(1900));
//! assert_eq!(iva.to_decimal_string(), "380.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (centavos for COP).
///
/// ## Where Money is Used
/// ```text
/// SaleLineItem.unit_price_cents ──► line subtotal ──► line tax
///                                         │              │
///                                         ▼              ▼
///                                  DianDocument.subtotal / tax_total
///                                         │
///                                         ▼
///                             CUFE digest + provider payload
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Calculates tax with half-up rounding.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`. The +5000 is the half.
    ///
    /// ## Example
    /// ```rust
    /// use einvoice_core::money::Money;
    /// use einvoice_core::types::TaxRate;
    ///
    /// // 10.05 at 19% = 1.9095 → 1.91
    /// let tax = Money::from_cents(1005).calculate_tax(TaxRate::from_bps(1900));
    /// assert_eq!(tax.cents(), 191);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        // i128 keeps large invoices from overflowing
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Formats the value as a plain decimal with two fraction digits.
    ///
    /// This is the representation both providers expect and the one hashed
    /// into the CUFE: no currency symbol, no thousands separator.
    ///
    /// ```rust
    /// use einvoice_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(119000).to_decimal_string(), "1190.00");
    /// assert_eq!(Money::from_cents(-550).to_decimal_string(), "-5.50");
    /// ```
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.major().abs(), self.minor())
    }

    /// Converts to a JSON number in major units.
    ///
    /// Alegra's API takes prices as JSON numbers. Going through the decimal
    /// string avoids `cents as f64 / 100.0` drift.
    pub fn to_json_number(&self) -> serde_json::Value {
        self.to_decimal_string()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the amount with a currency sign, for logs only.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
