//! # Mapping Repository
//!
//! Internal entity → provider id cache used by the entity reconciler.
//!
//! The primary key (`tenant_id`, `entity_kind`, `internal_id`) is the
//! compare-and-set: the first writer wins, a later writer gets the stored
//! row back instead of an error. Rows are never updated in place.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use einvoice_core::{EntityKind, ReconciliationMapping};

/// Repository for reconciliation mappings.
#[derive(Debug, Clone)]
pub struct MappingRepository {
    pool: SqlitePool,
}

impl MappingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MappingRepository { pool }
    }

    pub async fn get(
        &self,
        tenant_id: &str,
        kind: EntityKind,
        internal_id: &str,
    ) -> DbResult<Option<ReconciliationMapping>> {
        let mapping = sqlx::query_as::<_, ReconciliationMapping>(
            r#"
            SELECT tenant_id, entity_kind, internal_id, external_id, created_at
            FROM reconciliation_mappings
            WHERE tenant_id = ?1 AND entity_kind = ?2 AND internal_id = ?3
            "#,
        )
        .bind(tenant_id)
        .bind(kind)
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(mapping)
    }

    /// Stores a mapping unless one exists, and returns the stored row.
    ///
    /// The flag is `true` when this call wrote the row. When it is `false`
    /// the returned `external_id` may differ from the one passed in: that
    /// means the provider now holds two entities for one internal id, which
    /// is logged and left for a human.
    pub async fn insert_or_get(
        &self,
        tenant_id: &str,
        kind: EntityKind,
        internal_id: &str,
        external_id: &str,
    ) -> DbResult<(ReconciliationMapping, bool)> {
        let result = sqlx::query(
            r#"
            INSERT INTO reconciliation_mappings (tenant_id, entity_kind, internal_id, external_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (tenant_id, entity_kind, internal_id) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(kind)
        .bind(internal_id)
        .bind(external_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;

        let stored = self
            .get(tenant_id, kind, internal_id)
            .await?
            .ok_or_else(|| DbError::not_found("Mapping", internal_id))?;

        if inserted {
            debug!(
                tenant_id = %tenant_id,
                entity_kind = %kind,
                internal_id = %internal_id,
                external_id = %external_id,
                "Mapping stored"
            );
        } else if stored.external_id != external_id {
            warn!(
                tenant_id = %tenant_id,
                entity_kind = %kind,
                internal_id = %internal_id,
                stored = %stored.external_id,
                discarded = %external_id,
                "Mapping already present with a different external id"
            );
        }

        Ok((stored, inserted))
    }

    /// All mappings of one kind for a tenant.
    pub async fn list(
        &self,
        tenant_id: &str,
        kind: EntityKind,
    ) -> DbResult<Vec<ReconciliationMapping>> {
        let mappings = sqlx::query_as::<_, ReconciliationMapping>(
            r#"
            SELECT tenant_id, entity_kind, internal_id, external_id, created_at
            FROM reconciliation_mappings
            WHERE tenant_id = ?1 AND entity_kind = ?2
            ORDER BY created_at, internal_id
            "#,
        )
        .bind(tenant_id)
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        Ok(mappings)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
