//! # DIAN Invoice Document
//!
//! The structured document the direct channel submits, plus its CUFE.
//!
//! ## CUFE (Código Único de Factura Electrónica)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CUFE = SHA-384( NumFac + FecFac + HorFac + ValFac                      │
//! │                + "01" + ValIVA + "04" + ValINC + "03" + ValICA          │
//! │                + ValTot + NitOFE + NumAdq + ClTec + TipoAmbiente )      │
//! │                                                                         │
//! │  Amounts are plain decimals with two fraction digits ("1190.00").       │
//! │  ClTec is the resolution's technical key. TipoAmbiente: 1 production,   │
//! │  2 test. Output is lowercase hex (96 chars).                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! INC and ICA are not charged by the POS, so they hash as `0.00`.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};

use crate::error::{CoreResult, InvoiceError};
use crate::money::Money;
use crate::types::{NumberingResolution, SaleSnapshot};

/// DIAN tax scheme codes hashed into the CUFE.
const TAX_CODE_IVA: &str = "01";
const TAX_CODE_INC: &str = "04";
const TAX_CODE_ICA: &str = "03";

/// Colombia is UTC-5 year round.
pub(crate) const COLOMBIA_OFFSET_HOURS: i64 = 5;
const COLOMBIA_OFFSET_SUFFIX: &str = "-05:00";

// =============================================================================
// Issuer
// =============================================================================

/// The selling company as the authority knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerInfo {
    pub nit: String,
    /// Verification digit of the NIT.
    pub dv: String,
    /// "1" production, "2" test.
    pub environment: String,
    /// Habilitación test set, sent while emitting in environment "2".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_set_id: Option<String>,
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCustomer {
    pub document_type: String,
    pub document_number: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub position: usize,
    pub description: String,
    pub quantity: i64,
    pub unit_price: String,
    pub line_extension: String,
    pub tax_percent: String,
    pub tax_amount: String,
}

/// Invoice document for the DIAN gateway.
///
/// Built once the number is allocated; everything in it is derived from the
/// sale, the resolution and the issuer, so rebuilding it on a retry yields
/// the same CUFE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DianDocument {
    /// Printed number, prefix included.
    pub number: String,
    pub prefix: Option<String>,
    pub sequence: i64,
    pub resolution_number: String,
    pub issue_date: NaiveDate,
    /// `HH:MM:SS-05:00`
    pub issue_time: String,
    pub issuer: IssuerInfo,
    pub customer: DocumentCustomer,
    pub lines: Vec<DocumentLine>,
    pub subtotal: String,
    pub tax_total: String,
    pub total: String,
    pub cufe: String,
}

impl DianDocument {
    /// Builds the document for `sale` numbered `number` under `resolution`.
    ///
    /// ## Errors
    /// `ResolutionInvalid` if `number` lies outside the resolution range.
    pub fn build(
        sale: &SaleSnapshot,
        resolution: &NumberingResolution,
        number: i64,
        issuer: &IssuerInfo,
    ) -> CoreResult<Self> {
        if number < resolution.range_start || number > resolution.range_end {
            return Err(InvoiceError::ResolutionInvalid {
                resolution: resolution.resolution_number.clone(),
                reason: format!(
                    "number {} outside range {}-{}",
                    number, resolution.range_start, resolution.range_end
                ),
            });
        }

        let local = sale.created_at.naive_utc() - Duration::hours(COLOMBIA_OFFSET_HOURS);
        let issue_date = local.date();
        let issue_time = format!("{}{}", local.format("%H:%M:%S"), COLOMBIA_OFFSET_SUFFIX);

        let lines = sale
            .line_items
            .iter()
            .enumerate()
            .map(|(i, item)| DocumentLine {
                position: i + 1,
                description: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price().to_decimal_string(),
                line_extension: item.subtotal().to_decimal_string(),
                tax_percent: item.tax_rate().percent_string(),
                tax_amount: item.tax().to_decimal_string(),
            })
            .collect();

        let subtotal = sale.subtotal();
        let tax_total = sale.tax_total();
        let total = sale.total();
        let full_number = resolution.format_number(number);

        let cufe = compute_cufe(&CufeInput {
            number: &full_number,
            issue_date,
            issue_time: &issue_time,
            subtotal,
            iva: tax_total,
            inc: Money::zero(),
            ica: Money::zero(),
            total,
            issuer_nit: &issuer.nit,
            customer_document: &sale.client.document_number,
            technical_key: &resolution.technical_key,
            environment: &issuer.environment,
        });

        Ok(DianDocument {
            number: full_number,
            prefix: resolution.prefix.clone(),
            sequence: number,
            resolution_number: resolution.resolution_number.clone(),
            issue_date,
            issue_time,
            issuer: issuer.clone(),
            customer: DocumentCustomer {
                document_type: sale.client.document_type.clone(),
                document_number: sale.client.document_number.clone(),
                name: sale.client.name.clone(),
                email: sale.client.email.clone(),
            },
            lines,
            subtotal: subtotal.to_decimal_string(),
            tax_total: tax_total.to_decimal_string(),
            total: total.to_decimal_string(),
            cufe,
        })
    }
}

// =============================================================================
// CUFE
// =============================================================================

/// Fields hashed into a CUFE, in DIAN order.
#[derive(Debug, Clone)]
pub struct CufeInput<'a> {
    pub number: &'a str,
    pub issue_date: NaiveDate,
    pub issue_time: &'a str,
    pub subtotal: Money,
    pub iva: Money,
    pub inc: Money,
    pub ica: Money,
    pub total: Money,
    pub issuer_nit: &'a str,
    pub customer_document: &'a str,
    pub technical_key: &'a str,
    pub environment: &'a str,
}

impl CufeInput<'_> {
    /// The exact string that gets hashed.
    pub fn canonical(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str(self.number);
        out.push_str(&self.issue_date.format("%Y-%m-%d").to_string());
        out.push_str(self.issue_time);
        out.push_str(&self.subtotal.to_decimal_string());
        out.push_str(TAX_CODE_IVA);
        out.push_str(&self.iva.to_decimal_string());
        out.push_str(TAX_CODE_INC);
        out.push_str(&self.inc.to_decimal_string());
        out.push_str(TAX_CODE_ICA);
        out.push_str(&self.ica.to_decimal_string());
        out.push_str(&self.total.to_decimal_string());
        out.push_str(self.issuer_nit);
        out.push_str(self.customer_document);
        out.push_str(self.technical_key);
        out.push_str(self.environment);
        out
    }
}

/// SHA-384 of the canonical CUFE string, lowercase hex.
pub fn compute_cufe(input: &CufeInput<'_>) -> String {
    let digest = Sha384::digest(input.canonical().as_bytes());
    hex::encode(digest)
}

// =============================================================================
// Unit Tests
// =============================================================================
