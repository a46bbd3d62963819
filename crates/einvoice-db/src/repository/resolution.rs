//! # Resolution Repository (Numbering Authority)
//!
//! Owns the tenant's numbering resolutions and hands out numbers.
//!
//! ## Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  allocate(resolution_id, today)                         │
//! │                                                                         │
//! │  UPDATE numbering_resolutions                                           │
//! │     SET current = current + 1                                           │
//! │   WHERE id = ?                                                          │
//! │     AND active = 1                                                      │
//! │     AND ? BETWEEN valid_from AND valid_to                               │
//! │     AND current < range_end                                             │
//! │  RETURNING current          ──► the issued number                       │
//! │       │                                                                 │
//! │       │ no row?                                                         │
//! │       ▼                                                                 │
//! │  re-read the resolution to say why:                                     │
//! │     missing / inactive / outside window ──► ResolutionInvalid           │
//! │     current == range_end               ──► NumberingExhausted           │
//! │                                                                         │
//! │  SQLite serializes writers, so two callers can never both see the same  │
//! │  `current`. There is no decrement: a failed submission burns its        │
//! │  number (gaps are legal, duplicates are not).                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::invoice::{apply_transition, fetch_invoice, NumberAssignment, Transition};
use einvoice_core::validation::validate_new_resolution;
use einvoice_core::{InvoiceError, InvoiceRecord, InvoiceStatus, NewResolution, NumberingResolution};

const RESOLUTION_COLUMNS: &str = "id, tenant_id, resolution_number, prefix, range_start, range_end, \
     current, valid_from, valid_to, active, technical_key, created_at";

/// Result of [`ResolutionRepository::allocate_for_invoice`].
#[derive(Debug, Clone)]
pub struct Allocation {
    pub number: i64,
    /// Resolution state right after the allocation.
    pub resolution: NumberingResolution,
    /// The record, now `signed` and holding `number`.
    pub record: InvoiceRecord,
}

/// Repository for numbering resolutions.
#[derive(Debug, Clone)]
pub struct ResolutionRepository {
    pool: SqlitePool,
}

impl ResolutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ResolutionRepository { pool }
    }

    /// Registers a resolution.
    ///
    /// ## Errors
    /// - `Invoice(Validation)` for a malformed range, window or prefix
    /// - `Invoice(OverlappingResolution)` when `new.active` and another
    ///   active resolution of the tenant shares at least one day
    pub async fn create(&self, new: &NewResolution) -> DbResult<NumberingResolution> {
        validate_new_resolution(new).map_err(InvoiceError::from)?;

        let resolution = NumberingResolution {
            id: Uuid::new_v4().to_string(),
            tenant_id: new.tenant_id.clone(),
            resolution_number: new.resolution_number.clone(),
            prefix: new.prefix.clone(),
            range_start: new.range_start,
            range_end: new.range_end,
            current: new.range_start - 1,
            valid_from: new.valid_from,
            valid_to: new.valid_to,
            active: new.active,
            technical_key: new.technical_key.clone(),
            created_at: Utc::now(),
        };

        // Insert first so the transaction holds the write lock while the
        // overlap check runs.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO numbering_resolutions (
                id, tenant_id, resolution_number, prefix, range_start, range_end,
                current, valid_from, valid_to, active, technical_key, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&resolution.id)
        .bind(&resolution.tenant_id)
        .bind(&resolution.resolution_number)
        .bind(&resolution.prefix)
        .bind(resolution.range_start)
        .bind(resolution.range_end)
        .bind(resolution.current)
        .bind(resolution.valid_from)
        .bind(resolution.valid_to)
        .bind(resolution.active)
        .bind(&resolution.technical_key)
        .bind(resolution.created_at)
        .execute(&mut *tx)
        .await?;

        if resolution.active {
            ensure_no_overlap(&mut tx, &resolution).await?;
        }

        tx.commit().await?;

        info!(
            resolution_id = %resolution.id,
            tenant_id = %resolution.tenant_id,
            range_start = resolution.range_start,
            range_end = resolution.range_end,
            "Resolution registered"
        );
        Ok(resolution)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<NumberingResolution>> {
        let mut conn = self.pool.acquire().await?;
        fetch_resolution(&mut conn, id).await
    }

    /// The tenant's active resolution covering `date`, if any.
    pub async fn active_for(
        &self,
        tenant_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<NumberingResolution>> {
        let sql = format!(
            "SELECT {RESOLUTION_COLUMNS} FROM numbering_resolutions \
             WHERE tenant_id = ?1 AND active = 1 AND ?2 BETWEEN valid_from AND valid_to \
             ORDER BY created_at LIMIT 1"
        );
        let resolution = sqlx::query_as::<_, NumberingResolution>(&sql)
            .bind(tenant_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(resolution)
    }

    /// All resolutions of a tenant, newest window first.
    pub async fn list_for_tenant(&self, tenant_id: &str) -> DbResult<Vec<NumberingResolution>> {
        let sql = format!(
            "SELECT {RESOLUTION_COLUMNS} FROM numbering_resolutions \
             WHERE tenant_id = ?1 ORDER BY valid_from DESC, created_at DESC"
        );
        let resolutions = sqlx::query_as::<_, NumberingResolution>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(resolutions)
    }

    /// Re-activates a resolution, subject to the same overlap rule as `create`.
    pub async fn activate(&self, id: &str) -> DbResult<NumberingResolution> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE numbering_resolutions SET active = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Resolution", id));
        }

        let resolution = fetch_resolution(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Resolution", id))?;
        ensure_no_overlap(&mut tx, &resolution).await?;

        tx.commit().await?;
        info!(resolution_id = %id, "Resolution activated");
        Ok(resolution)
    }

    /// Stops a resolution from issuing numbers. Issued numbers stay valid.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE numbering_resolutions SET active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Resolution", id));
        }

        info!(resolution_id = %id, "Resolution deactivated");
        Ok(())
    }

    /// Numbers still available on a resolution.
    pub async fn remaining(&self, id: &str) -> DbResult<i64> {
        self.get(id)
            .await?
            .map(|r| r.remaining())
            .ok_or_else(|| DbError::not_found("Resolution", id))
    }

    /// Issues the next number of a resolution.
    ///
    /// ## Errors
    /// - `Invoice(NumberingExhausted)` when `current == range_end`
    /// - `Invoice(ResolutionInvalid)` when missing, inactive, or `today` is
    ///   outside the validity window
    pub async fn allocate(&self, resolution_id: &str, today: NaiveDate) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        allocate_on(&mut conn, resolution_id, today).await
    }

    /// Allocates a number and moves `record` from draft to signed, atomically.
    ///
    /// Either the number is burned onto this record or nothing changes. A
    /// record that already holds a number is refused before touching the
    /// counter.
    pub async fn allocate_for_invoice(
        &self,
        record: &InvoiceRecord,
        resolution_id: &str,
        today: NaiveDate,
    ) -> DbResult<Allocation> {
        if record.has_number()
            || !record
                .status
                .can_transition_to(InvoiceStatus::Signed, record.provider)
        {
            return Err(InvoiceError::InvalidTransition {
                from: record.status,
                to: InvoiceStatus::Signed,
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;

        let number = allocate_on(&mut tx, resolution_id, today).await?;
        let resolution = fetch_resolution(&mut tx, resolution_id)
            .await?
            .ok_or_else(|| DbError::not_found("Resolution", resolution_id))?;

        apply_transition(
            &mut tx,
            record,
            &Transition::to(InvoiceStatus::Signed),
            Some(NumberAssignment {
                resolution_id,
                number,
                prefix: resolution.prefix.as_deref(),
            }),
        )
        .await?;

        let record = fetch_invoice(&mut tx, &record.id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", &record.id))?;

        tx.commit().await?;

        info!(
            sale_id = %record.sale_id,
            resolution_id = %resolution_id,
            number,
            "Invoice number allocated"
        );

        Ok(Allocation {
            number,
            resolution,
            record,
        })
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

pub(crate) async fn fetch_resolution(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<NumberingResolution>> {
    let sql = format!("SELECT {RESOLUTION_COLUMNS} FROM numbering_resolutions WHERE id = ?1");
    let resolution = sqlx::query_as::<_, NumberingResolution>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(resolution)
}

/// The single-statement allocation. Runs on whatever connection or
/// transaction the caller holds.
pub(crate) async fn allocate_on(
    conn: &mut SqliteConnection,
    resolution_id: &str,
    today: NaiveDate,
) -> DbResult<i64> {
    let issued: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE numbering_resolutions
           SET current = current + 1
         WHERE id = ?1
           AND active = 1
           AND ?2 BETWEEN valid_from AND valid_to
           AND current < range_end
        RETURNING current
        "#,
    )
    .bind(resolution_id)
    .bind(today)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(number) = issued {
        debug!(resolution_id = %resolution_id, number, "Number issued");
        return Ok(number);
    }

    let err = classify_refusal(conn, resolution_id, today).await?;
    warn!(resolution_id = %resolution_id, error = %err, "Allocation refused");
    Err(err.into())
}

async fn classify_refusal(
    conn: &mut SqliteConnection,
    resolution_id: &str,
    today: NaiveDate,
) -> DbResult<InvoiceError> {
    let Some(res) = fetch_resolution(conn, resolution_id).await? else {
        return Ok(InvoiceError::ResolutionInvalid {
            resolution: resolution_id.to_string(),
            reason: "resolution does not exist".to_string(),
        });
    };

    let err = if !res.active {
        InvoiceError::ResolutionInvalid {
            resolution: res.resolution_number,
            reason: "resolution is inactive".to_string(),
        }
    } else if !res.covers(today) {
        InvoiceError::ResolutionInvalid {
            resolution: res.resolution_number,
            reason: format!(
                "{} is outside validity window {} to {}",
                today, res.valid_from, res.valid_to
            ),
        }
    } else if res.is_exhausted() {
        InvoiceError::NumberingExhausted {
            resolution: res.resolution_number,
            range_end: res.range_end,
        }
    } else {
        return Err(DbError::Internal(format!(
            "allocation on resolution {} refused without a cause",
            resolution_id
        )));
    };
    Ok(err)
}

async fn ensure_no_overlap(
    conn: &mut SqliteConnection,
    resolution: &NumberingResolution,
) -> DbResult<()> {
    let existing: Option<String> = sqlx::query_scalar(
        r#"
        SELECT resolution_number FROM numbering_resolutions
         WHERE tenant_id = ?1
           AND active = 1
           AND id != ?2
           AND valid_from <= ?4
           AND valid_to >= ?3
         LIMIT 1
        "#,
    )
    .bind(&resolution.tenant_id)
    .bind(&resolution.id)
    .bind(resolution.valid_from)
    .bind(resolution.valid_to)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some(existing) => Err(InvoiceError::OverlappingResolution {
            tenant_id: resolution.tenant_id.clone(),
            existing,
        }
        .into()),
        None => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
