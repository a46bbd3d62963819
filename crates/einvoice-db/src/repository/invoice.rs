//! # Invoice Repository (Invoice Record Store)
//!
//! Persisted lifecycle of the electronic invoice of each sale.
//!
//! ## Transition Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   transition(record, Transition)                        │
//! │                                                                         │
//! │  1. record.status → to allowed for record.provider?   else Invalid-     │
//! │                                                            Transition   │
//! │  2. record already stamped with another code?         else LegalCode-   │
//! │                                                            Immutable    │
//! │  ┌─────────────────────── SINGLE TRANSACTION ──────────────────────┐    │
//! │  │ 3. UPDATE electronic_invoices ... WHERE id = ?                  │    │
//! │  │                                   AND status = <record.status>  │    │
//! │  │    0 rows  → someone moved it first → InvalidTransition         │    │
//! │  │    UNIQUE(legal_code) → DuplicateLegalCode, both rows untouched │    │
//! │  │ 4. INSERT invoice_transitions (from, to, message)               │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use einvoice_core::{InvoiceError, InvoiceRecord, InvoiceStatus, InvoiceTransition, ProviderKind};

pub(crate) const INVOICE_COLUMNS: &str = "id, sale_id, tenant_id, resolution_ref, invoice_number, \
     invoice_prefix, provider, external_id, legal_code, status, status_message, attempts, \
     created_at, updated_at";

// =============================================================================
// Transition
// =============================================================================

/// A requested status change and the fields it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: InvoiceStatus,
    /// Replaces `status_message` (None clears it).
    pub message: Option<String>,
    /// Set when present; an existing value is kept otherwise.
    pub external_id: Option<String>,
    /// Set when present. Must match any code already stored.
    pub legal_code: Option<String>,
}

impl Transition {
    pub fn to(status: InvoiceStatus) -> Self {
        Transition {
            to: status,
            message: None,
            external_id: None,
            legal_code: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    pub fn legal_code(mut self, legal_code: Option<String>) -> Self {
        self.legal_code = legal_code;
        self
    }
}

/// Number fields written together with a draft → signed transition.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NumberAssignment<'a> {
    pub resolution_id: &'a str,
    pub number: i64,
    pub prefix: Option<&'a str>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for invoice records and their audit trail.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Returns the record of `sale_id`, creating a draft if there is none.
    ///
    /// Insert-or-ignore then read: concurrent first calls all get the same
    /// row. An existing record is returned as is, whatever its provider.
    pub async fn get_or_create(
        &self,
        sale_id: &str,
        tenant_id: &str,
        provider: ProviderKind,
    ) -> DbResult<InvoiceRecord> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO electronic_invoices (
                id, sale_id, tenant_id, provider, status, attempts, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
            ON CONFLICT (sale_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(sale_id)
        .bind(tenant_id)
        .bind(provider)
        .bind(InvoiceStatus::Draft)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!(sale_id = %sale_id, tenant_id = %tenant_id, provider = %provider, "Invoice record created");
        }

        self.get_by_sale(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", sale_id))
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<InvoiceRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_invoice(&mut conn, id).await
    }

    /// Read path for invoice status queries.
    pub async fn get_by_sale(&self, sale_id: &str) -> DbResult<Option<InvoiceRecord>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM electronic_invoices WHERE sale_id = ?1");
        let record = sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// A tenant's records in one status, oldest first.
    ///
    /// The confirmation poller uses this with `Sent`.
    pub async fn list_by_status(
        &self,
        tenant_id: &str,
        status: InvoiceStatus,
    ) -> DbResult<Vec<InvoiceRecord>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM electronic_invoices \
             WHERE tenant_id = ?1 AND status = ?2 ORDER BY created_at"
        );
        let records = sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(tenant_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Applies a status change and records it in the audit trail.
    ///
    /// ## Errors
    /// - `Invoice(InvalidTransition)` for an edge outside the state machine,
    ///   or when `record` is stale (the row is no longer in `record.status`)
    /// - `Invoice(LegalCodeImmutable)` when a different code is stored
    /// - `Invoice(DuplicateLegalCode)` when another record holds the code
    pub async fn transition(
        &self,
        record: &InvoiceRecord,
        transition: Transition,
    ) -> DbResult<InvoiceRecord> {
        let mut tx = self.pool.begin().await?;

        apply_transition(&mut tx, record, &transition, None).await?;
        let updated = fetch_invoice(&mut tx, &record.id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", &record.id))?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Counts a new emission attempt.
    pub async fn begin_attempt(&self, record: &InvoiceRecord) -> DbResult<InvoiceRecord> {
        let sql = format!(
            "UPDATE electronic_invoices SET attempts = attempts + 1, updated_at = ?2 \
             WHERE id = ?1 RETURNING {INVOICE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(&record.id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", &record.id))?;

        debug!(sale_id = %updated.sale_id, attempts = updated.attempts, "Emission attempt started");
        Ok(updated)
    }

    /// Audit trail of a record, oldest first.
    pub async fn history(&self, invoice_id: &str) -> DbResult<Vec<InvoiceTransition>> {
        let transitions = sqlx::query_as::<_, InvoiceTransition>(
            r#"
            SELECT id, invoice_id, from_status, to_status, message, created_at
            FROM invoice_transitions
            WHERE invoice_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transitions)
    }

    /// Moves a record to another provider.
    ///
    /// Only a draft that never received a number may switch; anything else
    /// has already talked to its provider.
    pub async fn set_provider(
        &self,
        record: &InvoiceRecord,
        provider: ProviderKind,
    ) -> DbResult<InvoiceRecord> {
        if record.provider == provider {
            return Ok(record.clone());
        }

        let mismatch = || InvoiceError::ProviderMismatch {
            sale_id: record.sale_id.clone(),
            recorded: record.provider,
            requested: provider,
        };

        if record.status != InvoiceStatus::Draft || record.has_number() {
            return Err(mismatch().into());
        }

        let sql = format!(
            "UPDATE electronic_invoices SET provider = ?2, updated_at = ?3 \
             WHERE id = ?1 AND status = 'draft' AND invoice_number IS NULL \
             RETURNING {INVOICE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(&record.id)
            .bind(provider)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(mismatch)?;

        info!(sale_id = %record.sale_id, from = %record.provider, to = %provider, "Invoice provider switched");
        Ok(updated)
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

pub(crate) async fn fetch_invoice(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<InvoiceRecord>> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM electronic_invoices WHERE id = ?1");
    let record = sqlx::query_as::<_, InvoiceRecord>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record)
}

/// Writes a transition on the caller's transaction.
///
/// The caller commits; on error the caller drops the transaction and
/// nothing is written.
pub(crate) async fn apply_transition(
    conn: &mut SqliteConnection,
    record: &InvoiceRecord,
    transition: &Transition,
    number: Option<NumberAssignment<'_>>,
) -> DbResult<()> {
    let from = record.status;
    let to = transition.to;

    if !from.can_transition_to(to, record.provider) {
        return Err(InvoiceError::InvalidTransition { from, to }.into());
    }

    if let (Some(current), Some(requested)) = (&record.legal_code, &transition.legal_code) {
        if current != requested {
            return Err(InvoiceError::LegalCodeImmutable {
                sale_id: record.sale_id.clone(),
                current: current.clone(),
            }
            .into());
        }
    }

    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE electronic_invoices
           SET status         = ?3,
               status_message = ?4,
               external_id    = COALESCE(?5, external_id),
               legal_code     = COALESCE(?6, legal_code),
               resolution_ref = COALESCE(?7, resolution_ref),
               invoice_number = COALESCE(?8, invoice_number),
               invoice_prefix = COALESCE(?9, invoice_prefix),
               updated_at     = ?10
         WHERE id = ?1
           AND status = ?2
           AND (?6 IS NULL OR legal_code IS NULL OR legal_code = ?6)
           AND (?8 IS NULL OR invoice_number IS NULL)
        "#,
    )
    .bind(&record.id)
    .bind(from)
    .bind(to)
    .bind(&transition.message)
    .bind(&transition.external_id)
    .bind(&transition.legal_code)
    .bind(number.map(|n| n.resolution_id))
    .bind(number.map(|n| n.number))
    .bind(number.and_then(|n| n.prefix))
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        err if err.is_unique_violation_on("legal_code") => {
            warn!(sale_id = %record.sale_id, "Legal code already held by another invoice");
            DbError::Invoice(InvoiceError::DuplicateLegalCode {
                legal_code: transition.legal_code.clone().unwrap_or_default(),
            })
        }
        err => err,
    })?;

    if result.rows_affected() == 0 {
        return Err(explain_lost_update(conn, record, transition).await);
    }

    sqlx::query(
        r#"
        INSERT INTO invoice_transitions (id, invoice_id, from_status, to_status, message, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&record.id)
    .bind(from)
    .bind(to)
    .bind(&transition.message)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    info!(sale_id = %record.sale_id, from = %from, to = %to, "Invoice status changed");
    Ok(())
}

/// The guarded UPDATE matched nothing; work out which guard failed.
async fn explain_lost_update(
    conn: &mut SqliteConnection,
    record: &InvoiceRecord,
    transition: &Transition,
) -> DbError {
    let current = match fetch_invoice(conn, &record.id).await {
        Ok(Some(current)) => current,
        Ok(None) => return DbError::not_found("Invoice", &record.id),
        Err(err) => return err,
    };

    if current.status != record.status || current.has_number() != record.has_number() {
        return InvoiceError::InvalidTransition {
            from: current.status,
            to: transition.to,
        }
        .into();
    }

    match current.legal_code {
        Some(code) => InvoiceError::LegalCodeImmutable {
            sale_id: current.sale_id,
            current: code,
        }
        .into(),
        None => DbError::Internal(format!("invoice {} update matched no row", record.id)),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn invoice_err(err: DbError) -> InvoiceError {
        match err {
            DbError::Invoice(e) => e,
            other => panic!("expected invoice error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = setup().await;
        let repo = db.invoices();

        let first = repo
            .get_or_create("sale-1", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();
        let second = repo
            .get_or_create("sale-1", "tenant-a", ProviderKind::Direct)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, InvoiceStatus::Draft);
        assert_eq!(second.provider, ProviderKind::Delegated);
        assert_eq!(second.attempts, 0);
        assert!(repo.get_by_sale("sale-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_row() {
        let db = setup().await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = db.invoices();
            handles.push(tokio::spawn(async move {
                repo.get_or_create("sale-1", "tenant-a", ProviderKind::Direct)
                    .await
                    .unwrap()
                    .id
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_path_and_audit() {
        let db = setup().await;
        let repo = db.invoices();
        let record = repo
            .get_or_create("sale-1", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();

        let sent = repo
            .transition(
                &record,
                Transition::to(InvoiceStatus::Sent).external_id(Some("ALG-77".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(sent.status, InvoiceStatus::Sent);
        assert_eq!(sent.external_id.as_deref(), Some("ALG-77"));

        let accepted = repo
            .transition(
                &sent,
                Transition::to(InvoiceStatus::Accepted).legal_code(Some("CUFE-1".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(accepted.legal_code.as_deref(), Some("CUFE-1"));
        // kept from the previous step
        assert_eq!(accepted.external_id.as_deref(), Some("ALG-77"));

        let history = repo.history(&record.id).await.unwrap();
        let steps: Vec<(InvoiceStatus, InvoiceStatus)> =
            history.iter().map(|t| (t.from_status, t.to_status)).collect();
        assert_eq!(
            steps,
            vec![
                (InvoiceStatus::Draft, InvoiceStatus::Sent),
                (InvoiceStatus::Sent, InvoiceStatus::Accepted)
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_edges_rejected() {
        let db = setup().await;
        let repo = db.invoices();
        let record = repo
            .get_or_create("sale-1", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();

        let err = repo
            .transition(&record, Transition::to(InvoiceStatus::Rejected))
            .await
            .unwrap_err();
        assert_eq!(
            invoice_err(err),
            InvoiceError::InvalidTransition {
                from: InvoiceStatus::Draft,
                to: InvoiceStatus::Rejected
            }
        );

        // delegated records never sign
        let err = repo
            .transition(&record, Transition::to(InvoiceStatus::Signed))
            .await
            .unwrap_err();
        assert!(matches!(
            invoice_err(err),
            InvoiceError::InvalidTransition { .. }
        ));

        assert!(repo.history(&record.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_record_loses() {
        let db = setup().await;
        let repo = db.invoices();
        let record = repo
            .get_or_create("sale-1", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();

        repo.transition(&record, Transition::to(InvoiceStatus::Sent))
            .await
            .unwrap();

        // `record` still says draft
        let err = repo
            .transition(&record, Transition::to(InvoiceStatus::Error).message("boom"))
            .await
            .unwrap_err();
        assert_eq!(
            invoice_err(err),
            InvoiceError::InvalidTransition {
                from: InvoiceStatus::Sent,
                to: InvoiceStatus::Error
            }
        );
        let stored = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Sent);
        assert!(stored.status_message.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_legal_code_leaves_both_unchanged() {
        let db = setup().await;
        let repo = db.invoices();

        let a = repo
            .get_or_create("sale-a", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();
        let a = repo.transition(&a, Transition::to(InvoiceStatus::Sent)).await.unwrap();
        let a = repo
            .transition(
                &a,
                Transition::to(InvoiceStatus::Accepted).legal_code(Some("CUFE-X".to_string())),
            )
            .await
            .unwrap();

        let b = repo
            .get_or_create("sale-b", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();
        let b = repo.transition(&b, Transition::to(InvoiceStatus::Sent)).await.unwrap();

        let err = repo
            .transition(
                &b,
                Transition::to(InvoiceStatus::Accepted).legal_code(Some("CUFE-X".to_string())),
            )
            .await
            .unwrap_err();
        assert_eq!(
            invoice_err(err),
            InvoiceError::DuplicateLegalCode {
                legal_code: "CUFE-X".to_string()
            }
        );

        assert_eq!(repo.get(&a.id).await.unwrap().unwrap(), a);
        assert_eq!(repo.get(&b.id).await.unwrap().unwrap(), b);
        assert_eq!(repo.history(&b.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_legal_code_is_immutable() {
        let db = setup().await;
        let repo = db.invoices();
        let r = repo
            .get_or_create("sale-1", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();
        let r = repo.transition(&r, Transition::to(InvoiceStatus::Sent)).await.unwrap();
        let r = repo
            .transition(
                &r,
                Transition::to(InvoiceStatus::Error)
                    .message("late stamp")
                    .legal_code(Some("CUFE-1".to_string())),
            )
            .await
            .unwrap();

        let err = repo
            .transition(
                &r,
                Transition::to(InvoiceStatus::Accepted).legal_code(Some("CUFE-2".to_string())),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            invoice_err(err),
            InvoiceError::LegalCodeImmutable { .. }
        ));

        // the same code again is fine
        let r = repo
            .transition(
                &r,
                Transition::to(InvoiceStatus::Accepted).legal_code(Some("CUFE-1".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(r.legal_code.as_deref(), Some("CUFE-1"));
        assert!(r.status_message.is_none());
    }

    #[tokio::test]
    async fn test_begin_attempt_counts() {
        let db = setup().await;
        let repo = db.invoices();
        let r = repo
            .get_or_create("sale-1", "tenant-a", ProviderKind::Direct)
            .await
            .unwrap();

        let r = repo.begin_attempt(&r).await.unwrap();
        let r = repo.begin_attempt(&r).await.unwrap();
        assert_eq!(r.attempts, 2);
        assert_eq!(r.status, InvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn test_set_provider_only_on_fresh_draft() {
        let db = setup().await;
        let repo = db.invoices();
        let r = repo
            .get_or_create("sale-1", "tenant-a", ProviderKind::Direct)
            .await
            .unwrap();

        let r = repo.set_provider(&r, ProviderKind::Delegated).await.unwrap();
        assert_eq!(r.provider, ProviderKind::Delegated);

        let r = repo.transition(&r, Transition::to(InvoiceStatus::Sent)).await.unwrap();
        let err = repo.set_provider(&r, ProviderKind::Direct).await.unwrap_err();
        assert!(matches!(
            invoice_err(err),
            InvoiceError::ProviderMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let db = setup().await;
        let repo = db.invoices();
        let a = repo
            .get_or_create("sale-a", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();
        repo.get_or_create("sale-b", "tenant-a", ProviderKind::Delegated)
            .await
            .unwrap();
        repo.transition(&a, Transition::to(InvoiceStatus::Sent)).await.unwrap();

        let sent = repo.list_by_status("tenant-a", InvoiceStatus::Sent).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sale_id, "sale-a");
        assert!(repo
            .list_by_status("tenant-b", InvoiceStatus::Draft)
            .await
            .unwrap()
            .is_empty());
    }
}
