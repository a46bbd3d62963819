//! # Repository Module
//!
//! Database repositories for electronic invoicing.
//!
//! ## Where The Atomicity Lives
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ResolutionRepository::allocate                                         │
//! │    UPDATE ... SET current = current + 1 WHERE <preconditions>           │
//! │    RETURNING current         ← one statement, no read-modify-write      │
//! │                                                                         │
//! │  InvoiceRepository::transition                                          │
//! │    UPDATE ... WHERE id = ? AND status = <expected>                      │
//! │    + INSERT invoice_transitions          ← same transaction             │
//! │                                                                         │
//! │  MappingRepository::insert_or_get                                       │
//! │    INSERT ... ON CONFLICT DO NOTHING, then SELECT                       │
//! │    ← losing writer reads the winner's row                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ResolutionRepository`](resolution::ResolutionRepository) - Numbering authority
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoice record store
//! - [`MappingRepository`](mapping::MappingRepository) - Reconciliation mappings

pub mod invoice;
pub mod mapping;
pub mod resolution;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, Utc};
    use einvoice_core::NewResolution;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Active resolution valid from 2020 through 2098.
    pub fn new_resolution(tenant_id: &str, start: i64, end: i64) -> NewResolution {
        NewResolution {
            tenant_id: tenant_id.to_string(),
            resolution_number: format!("1876{start:07}"),
            prefix: Some("SETP".to_string()),
            range_start: start,
            range_end: end,
            valid_from: date(2020, 1, 1),
            valid_to: date(2098, 12, 31),
            technical_key: "fc8eac422eba16e22ffd8c6f94b3f40a6e38162c".to_string(),
            active: true,
        }
    }
}
