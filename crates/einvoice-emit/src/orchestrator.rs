//! # Emission Orchestrator
//!
//! Runs one sale through numbering, reconciliation and submission, and keeps
//! the invoice record honest about where it got to.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  emit(sale)                          (one pipeline per sale at a time)  │
//! │    │                                                                    │
//! │    ├─ 1. get_or_create record                                           │
//! │    ├─ 2. accepted → AlreadyAccepted    sent → PendingConfirmation       │
//! │    ├─ 3. error/rejected → reopen (signed if numbered, else draft)       │
//! │    │     provider changed → switch an unnumbered draft                  │
//! │    ├─ 4. attempts += 1                                                  │
//! │    │                                                                    │
//! │    ├─ 5. Direct, draft:  validate, allocate number + draft→signed       │
//! │    │     Direct, signed: reuse the held number                          │
//! │    ├─ 6. Delegated: reconcile client and linked products                │
//! │    ├─ 7. attempts > 1: recovery query; found → apply, skip submit       │
//! │    ├─ 8. submit → accepted: →sent→accepted                              │
//! │    │             pending:  →sent                                        │
//! │    │             rejected: →sent→rejected, ProviderRejected             │
//! │    │                                                                    │
//! │    └─ 9. any failure in 5-8: →error with the message, record returned   │
//! │                                                                         │
//! │  States:  draft ──► signed ──► sent ──► accepted                        │
//! │             │          │         ├────► rejected ──► draft / signed     │
//! │             └──────────┴─────────┴────► error ─────► (re-emission)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Numbers are never handed back: a failed Direct submission keeps its
//! number and the next attempt reuses it.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{EmissionConfig, EmissionSettings};
use crate::error::{EmitError, EmitResult};
use crate::locks::KeyedLocks;
use crate::provider::{
    self, InvoiceProvider, Numbering, RemoteReferences, SubmissionOutcome, SubmissionRequest,
    SubmissionStatus,
};
use crate::reconciler::Reconciler;
use einvoice_core::validation::validate_sale;
use einvoice_core::{
    ActorContext, InvoiceError, InvoiceRecord, InvoiceStatus, NumberingResolution, ProviderKind,
    SaleSnapshot, EMIT_PERMISSION,
};
use einvoice_db::{Database, Transition};

// =============================================================================
// Collaborators and results
// =============================================================================

/// Where completed sales come from.
#[async_trait]
pub trait SaleSource: Send + Sync {
    async fn load_sale(&self, sale_id: &str) -> EmitResult<Option<SaleSnapshot>>;
}

/// What a caller learns about an emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceResult {
    pub status: InvoiceStatus,
    pub legal_code: Option<String>,
    pub external_id: Option<String>,
    pub message: Option<String>,
    /// Printed invoice number, Direct only.
    pub number: Option<String>,
}

impl From<&InvoiceRecord> for InvoiceResult {
    fn from(record: &InvoiceRecord) -> Self {
        InvoiceResult {
            status: record.status,
            legal_code: record.legal_code.clone(),
            external_id: record.external_id.clone(),
            message: record.status_message.clone(),
            number: record.full_number(),
        }
    }
}

/// A failed emission, with the record as it was left.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct EmissionFailure {
    #[source]
    pub error: EmitError,
    pub record: Option<InvoiceRecord>,
}

impl EmissionFailure {
    fn with_record(error: EmitError, record: InvoiceRecord) -> Self {
        EmissionFailure {
            error,
            record: Some(record),
        }
    }

    /// Rough class of the failure, for callers deciding what to do next.
    pub fn kind(&self) -> FailureKind {
        if self.error.as_invoice_error().is_some() {
            FailureKind::Invoice
        } else if self.error.is_config_error() {
            FailureKind::Config
        } else if self.error.is_retryable() {
            FailureKind::Transient
        } else {
            FailureKind::Other
        }
    }

    pub fn report(&self) -> FailureReport<'_> {
        FailureReport {
            error: self.error.to_string(),
            kind: self.kind(),
            retryable: self.error.is_retryable(),
            record: self.record.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// A lifecycle or numbering rule refused the emission.
    Invoice,
    /// Settings are missing or wrong; retrying will not help.
    Config,
    /// The provider could not be reached.
    Transient,
    /// Rejections, storage faults and the rest.
    Other,
}

/// JSON shape of a failed emission.
#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub error: String,
    pub kind: FailureKind,
    pub retryable: bool,
    pub record: Option<&'a InvoiceRecord>,
}

impl From<EmitError> for EmissionFailure {
    fn from(error: EmitError) -> Self {
        EmissionFailure { error, record: None }
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounds for [`EmissionService::emit_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first. 0 disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&EmissionSettings::default())
    }
}

impl From<&EmissionSettings> for RetryPolicy {
    fn from(settings: &EmissionSettings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            initial_backoff: settings.initial_backoff(),
            max_backoff: settings.max_backoff(),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // bounded by max_retries instead
            ..Default::default()
        }
    }
}

// =============================================================================
// Emission Service
// =============================================================================

pub struct EmissionService {
    db: Database,
    provider: Arc<dyn InvoiceProvider>,
    reconciler: Reconciler,
    sales: Option<Arc<dyn SaleSource>>,
    /// Set when the provider was chosen for one tenant's configuration.
    tenant_id: Option<String>,
    sale_locks: KeyedLocks,
    retry: RetryPolicy,
}

impl EmissionService {
    pub fn new(db: Database, provider: Arc<dyn InvoiceProvider>) -> Self {
        EmissionService {
            reconciler: Reconciler::new(db.mappings()),
            db,
            provider,
            sales: None,
            tenant_id: None,
            sale_locks: KeyedLocks::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Builds the service for `tenant_id`, picking its provider once.
    ///
    /// ## Errors
    /// `NotConfigured` when neither a tenant entry nor a default exists.
    pub fn from_config(db: Database, config: &EmissionConfig, tenant_id: &str) -> EmitResult<Self> {
        let settings = config.provider_for(tenant_id)?;
        let provider = provider::from_settings(settings, config.emission.request_timeout())?;

        info!(tenant_id = %tenant_id, provider = %settings.kind(), "Emission service configured");

        let mut service = Self::new(db, provider).with_retry(RetryPolicy::from(&config.emission));
        service.tenant_id = Some(tenant_id.to_string());
        Ok(service)
    }

    pub fn with_sale_source(mut self, sales: Arc<dyn SaleSource>) -> Self {
        self.sales = Some(sales);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checks the configured provider credentials.
    pub async fn check_credentials(&self) -> EmitResult<()> {
        self.provider.authenticate().await
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Emits the invoice of `sale`.
    pub async fn emit(&self, sale: &SaleSnapshot) -> Result<InvoiceResult, EmissionFailure> {
        if let Some(scope) = &self.tenant_id {
            if scope != &sale.tenant_id {
                return Err(EmitError::Forbidden(format!(
                    "sale {} belongs to tenant {}, service is configured for {}",
                    sale.id, sale.tenant_id, scope
                ))
                .into());
            }
        }

        let _guard = self.sale_locks.lock(&sale.id).await;

        let mut record = self.prepare(sale).await?;
        info!(
            sale_id = %sale.id,
            tenant_id = %sale.tenant_id,
            provider = %record.provider,
            attempt = record.attempts,
            status = %record.status,
            "Emission started"
        );

        match self.run(sale, &mut record).await {
            Ok(()) => {
                info!(sale_id = %sale.id, status = %record.status, "Emission finished");
                Ok(InvoiceResult::from(&record))
            }
            Err(error) => Err(self.fail(record, error).await),
        }
    }

    /// Loads the sale through the configured [`SaleSource`] and emits it.
    pub async fn emit_sale(&self, sale_id: &str) -> Result<InvoiceResult, EmissionFailure> {
        let sale = self.load_sale(sale_id).await?;
        self.emit(&sale).await
    }

    /// [`emit_sale`](Self::emit_sale) on behalf of `actor`.
    ///
    /// The only authorization check of the pipeline: the actor needs the emit
    /// permission and must belong to the sale's tenant.
    pub async fn emit_for(
        &self,
        actor: &ActorContext,
        sale_id: &str,
    ) -> Result<InvoiceResult, EmissionFailure> {
        if !actor.has_permission(EMIT_PERMISSION) {
            return Err(EmitError::Forbidden(format!("missing permission {EMIT_PERMISSION}")).into());
        }

        let sale = self.load_sale(sale_id).await?;
        if sale.tenant_id != actor.tenant_id {
            return Err(EmitError::Forbidden(format!(
                "sale {} does not belong to tenant {}",
                sale_id, actor.tenant_id
            ))
            .into());
        }

        self.emit(&sale).await
    }

    /// Like [`emit`](Self::emit), retrying retryable failures with
    /// exponential backoff up to `max_retries` times.
    pub async fn emit_with_retry(
        &self,
        sale: &SaleSnapshot,
    ) -> Result<InvoiceResult, EmissionFailure> {
        let mut backoff = self.retry.backoff();
        let mut retries = 0;

        loop {
            match self.emit(sale).await {
                Err(failure) if failure.error.is_retryable() && retries < self.retry.max_retries => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(failure);
                    };
                    retries += 1;
                    warn!(
                        sale_id = %sale.id,
                        retry = retries,
                        ?delay,
                        error = %failure.error,
                        "Emission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    /// The invoice record of `sale_id`, if an emission was ever started.
    pub async fn status(&self, sale_id: &str) -> EmitResult<Option<InvoiceRecord>> {
        Ok(self.db.invoices().get_by_sale(sale_id).await?)
    }

    /// Applies a late provider decision to a `sent` invoice.
    ///
    /// Entry point for whatever polls the provider or receives its webhook.
    /// A `Pending` outcome changes nothing.
    pub async fn record_confirmation(
        &self,
        sale_id: &str,
        outcome: SubmissionOutcome,
    ) -> EmitResult<InvoiceRecord> {
        let _guard = self.sale_locks.lock(sale_id).await;

        let record = self
            .db
            .invoices()
            .get_by_sale(sale_id)
            .await?
            .ok_or_else(|| EmitError::SaleNotFound(sale_id.to_string()))?;

        let transition = match outcome.status {
            SubmissionStatus::Pending => return Ok(record),
            SubmissionStatus::Accepted => Transition {
                to: InvoiceStatus::Accepted,
                message: outcome.message,
                external_id: outcome.external_id,
                legal_code: outcome.legal_code,
            },
            SubmissionStatus::Rejected => Transition {
                to: InvoiceStatus::Rejected,
                message: outcome.message,
                external_id: outcome.external_id,
                legal_code: None,
            },
        };

        let updated = self.db.invoices().transition(&record, transition).await?;
        info!(sale_id = %sale_id, status = %updated.status, "Provider confirmation recorded");
        Ok(updated)
    }

    // =========================================================================
    // Pipeline steps
    // =========================================================================

    async fn load_sale(&self, sale_id: &str) -> EmitResult<SaleSnapshot> {
        let sales = self
            .sales
            .as_ref()
            .ok_or_else(|| EmitError::InvalidConfig("no sale source configured".into()))?;
        sales
            .load_sale(sale_id)
            .await?
            .ok_or_else(|| EmitError::SaleNotFound(sale_id.to_string()))
    }

    /// Steps 1-4: find the record, refuse finished work and numbers held by
    /// another provider, reopen failed work, and count the attempt.
    async fn prepare(&self, sale: &SaleSnapshot) -> Result<InvoiceRecord, EmissionFailure> {
        let invoices = self.db.invoices();
        let kind = self.provider.kind();

        let record = invoices
            .get_or_create(&sale.id, &sale.tenant_id, kind)
            .await
            .map_err(EmitError::from)?;

        let refuse = |error: InvoiceError, record: InvoiceRecord| {
            EmissionFailure::with_record(EmitError::Invoice(error), record)
        };

        if !record.status.is_retryable() {
            let error = if record.status == InvoiceStatus::Accepted {
                InvoiceError::AlreadyAccepted {
                    sale_id: sale.id.clone(),
                }
            } else {
                InvoiceError::PendingConfirmation {
                    sale_id: sale.id.clone(),
                }
            };
            return Err(refuse(error, record));
        }

        // A number spent under one provider stays with it, whatever the status.
        if record.provider != kind && record.has_number() {
            let error = InvoiceError::ProviderMismatch {
                sale_id: sale.id.clone(),
                recorded: record.provider,
                requested: kind,
            };
            return Err(refuse(error, record));
        }

        let record = if record.status.is_terminal() || record.status == InvoiceStatus::Error {
            let reopen_to = if record.has_number() {
                InvoiceStatus::Signed
            } else {
                InvoiceStatus::Draft
            };
            debug!(sale_id = %sale.id, from = %record.status, to = %reopen_to, "Reopening invoice");
            match invoices
                .transition(&record, Transition::to(reopen_to).message("re-emission requested"))
                .await
            {
                Ok(updated) => updated,
                Err(e) => return Err(EmissionFailure::with_record(e.into(), record)),
            }
        } else {
            record
        };

        // Only an unnumbered draft may change hands.
        let record = if record.provider != kind {
            match invoices.set_provider(&record, kind).await {
                Ok(updated) => updated,
                Err(e) => return Err(EmissionFailure::with_record(e.into(), record)),
            }
        } else {
            record
        };

        match invoices.begin_attempt(&record).await {
            Ok(updated) => Ok(updated),
            Err(e) => Err(EmissionFailure::with_record(e.into(), record)),
        }
    }

    /// Steps 5-8. `record` always holds the latest stored state.
    async fn run(&self, sale: &SaleSnapshot, record: &mut InvoiceRecord) -> EmitResult<()> {
        validate_sale(sale).map_err(InvoiceError::from)?;

        // Step 5: numbering.
        let numbered: Option<(NumberingResolution, i64)> = match self.provider.kind() {
            ProviderKind::Direct => Some(self.number(sale, record).await?),
            ProviderKind::Delegated => None,
        };

        // Step 6: reconciliation.
        let references = match self.provider.catalog() {
            Some(catalog) => {
                let client_id = self
                    .reconciler
                    .sync_client(catalog, &sale.tenant_id, &sale.client)
                    .await?;
                let mut refs = RemoteReferences {
                    client_id,
                    ..Default::default()
                };
                for product in sale.linked_products() {
                    let item_id = self
                        .reconciler
                        .sync_product(catalog, &sale.tenant_id, product)
                        .await?;
                    refs.products.insert(product.id.clone(), item_id);
                }
                Some(refs)
            }
            None => None,
        };

        let request = SubmissionRequest {
            sale,
            numbering: numbered
                .as_ref()
                .map(|(resolution, number)| Numbering {
                    resolution,
                    number: *number,
                }),
            references: references.as_ref(),
        };

        // Step 7: an earlier attempt may have landed without us hearing back.
        if record.attempts > 1 {
            if let Some(outcome) = self.provider.find_submission(&request).await? {
                info!(sale_id = %sale.id, status = ?outcome.status, "Earlier submission found, not resubmitting");
                return self.apply_outcome(record, outcome).await;
            }
        }

        // Step 8.
        let outcome = self.provider.submit(&request).await?;
        self.apply_outcome(record, outcome).await
    }

    /// Allocates a number for a draft, or reads back the one it holds.
    async fn number(
        &self,
        sale: &SaleSnapshot,
        record: &mut InvoiceRecord,
    ) -> EmitResult<(NumberingResolution, i64)> {
        let resolutions = self.db.resolutions();

        if let (Some(resolution_id), Some(number)) =
            (record.resolution_ref.as_deref(), record.invoice_number)
        {
            let resolution = resolutions.get(resolution_id).await?.ok_or_else(|| {
                EmitError::Internal(format!(
                    "invoice {} references missing resolution {}",
                    record.id, resolution_id
                ))
            })?;
            debug!(sale_id = %sale.id, number, "Reusing held invoice number");
            return Ok((resolution, number));
        }

        let today = today();
        let active = resolutions
            .active_for(&sale.tenant_id, today)
            .await?
            .ok_or_else(|| InvoiceError::ResolutionInvalid {
                resolution: "(none)".to_string(),
                reason: format!("tenant {} has no active resolution on {}", sale.tenant_id, today),
            })?;

        let allocation = resolutions
            .allocate_for_invoice(record, &active.id, today)
            .await?;
        *record = allocation.record;
        Ok((allocation.resolution, allocation.number))
    }

    /// Step 8 bookkeeping: every outcome passes through `sent`.
    async fn apply_outcome(
        &self,
        record: &mut InvoiceRecord,
        outcome: SubmissionOutcome,
    ) -> EmitResult<()> {
        let invoices = self.db.invoices();

        if record.status != InvoiceStatus::Sent {
            *record = invoices
                .transition(
                    record,
                    Transition::to(InvoiceStatus::Sent).external_id(outcome.external_id.clone()),
                )
                .await?;
        }

        match outcome.status {
            SubmissionStatus::Pending => {
                info!(sale_id = %record.sale_id, "Invoice sent, awaiting confirmation");
                Ok(())
            }
            SubmissionStatus::Accepted => {
                *record = invoices
                    .transition(
                        record,
                        Transition::to(InvoiceStatus::Accepted)
                            .external_id(outcome.external_id)
                            .legal_code(outcome.legal_code),
                    )
                    .await?;
                Ok(())
            }
            SubmissionStatus::Rejected => {
                let reason = outcome
                    .message
                    .unwrap_or_else(|| "rejected without reason".to_string());
                *record = invoices
                    .transition(
                        record,
                        Transition::to(InvoiceStatus::Rejected)
                            .external_id(outcome.external_id)
                            .message(reason.clone()),
                    )
                    .await?;
                Err(EmitError::ProviderRejected { reason })
            }
        }
    }

    /// Step 9: park the record in `error` (when the state machine allows)
    /// and hand the error back with the record.
    async fn fail(&self, record: InvoiceRecord, error: EmitError) -> EmissionFailure {
        warn!(
            sale_id = %record.sale_id,
            status = %record.status,
            error = %error,
            retryable = error.is_retryable(),
            "Emission attempt failed"
        );

        if !record
            .status
            .can_transition_to(InvoiceStatus::Error, record.provider)
        {
            return EmissionFailure::with_record(error, record);
        }

        let parked = self
            .db
            .invoices()
            .transition(
                &record,
                Transition::to(InvoiceStatus::Error).message(error.to_string()),
            )
            .await;

        match parked {
            Ok(updated) => EmissionFailure::with_record(error, updated),
            Err(e) => {
                // Another process moved the record; report what is stored now.
                warn!(sale_id = %record.sale_id, error = %e, "Could not record emission failure");
                let current = self
                    .db
                    .invoices()
                    .get(&record.id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(record);
                EmissionFailure::with_record(error, current)
            }
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> InvoiceRecord {
        let now = Utc::now();
        InvoiceRecord {
            id: "inv-1".to_string(),
            sale_id: "sale-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            resolution_ref: Some("res-1".to_string()),
            invoice_number: Some(42),
            invoice_prefix: Some("SETP".to_string()),
            provider: ProviderKind::Direct,
            external_id: Some("T-9".to_string()),
            legal_code: Some("CUFE-1".to_string()),
            status: InvoiceStatus::Accepted,
            status_message: None,
            attempts: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_result_from_record() {
        let result = InvoiceResult::from(&record());
        assert_eq!(result.status, InvoiceStatus::Accepted);
        assert_eq!(result.number.as_deref(), Some("SETP42"));
        assert_eq!(result.legal_code.as_deref(), Some("CUFE-1"));
        assert_eq!(result.external_id.as_deref(), Some("T-9"));
    }

    #[test]
    fn test_result_serializes_lowercase_status() {
        let value = serde_json::to_value(InvoiceResult::from(&record())).unwrap();
        assert_eq!(value["status"], "accepted");
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let policy = RetryPolicy::from(&EmissionSettings {
            max_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_secs: 4,
            ..Default::default()
        });
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
        assert_eq!(policy.max_backoff, Duration::from_secs(4));

        // Retrying is off unless configured.
        assert_eq!(RetryPolicy::default().max_retries, 0);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        };
        let mut backoff = policy.backoff();
        let delays: Vec<Duration> = (0..6).filter_map(|_| backoff.next_backoff()).collect();
        assert_eq!(delays.len(), 6);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(450)));
    }

    #[test]
    fn test_failure_displays_the_error() {
        let failure = EmissionFailure::from(EmitError::SaleNotFound("sale-9".to_string()));
        assert!(failure.to_string().contains("sale-9"));
        assert!(failure.record.is_none());
    }

    #[test]
    fn test_failure_kind_classifies_errors() {
        let refused = EmissionFailure::with_record(
            EmitError::Invoice(InvoiceError::AlreadyAccepted {
                sale_id: "sale-1".to_string(),
            }),
            record(),
        );
        assert_eq!(refused.kind(), FailureKind::Invoice);

        let unconfigured = EmissionFailure::from(EmitError::NotConfigured {
            tenant_id: "tenant-1".to_string(),
        });
        assert_eq!(unconfigured.kind(), FailureKind::Config);

        let timeout = EmissionFailure::from(EmitError::ProviderUnreachable {
            cause: "timeout".into(),
        });
        assert_eq!(timeout.kind(), FailureKind::Transient);

        let rejected = EmissionFailure::from(EmitError::ProviderRejected {
            reason: "HTTP 400".into(),
        });
        assert_eq!(rejected.kind(), FailureKind::Other);
    }

    #[test]
    fn test_failure_report_shape() {
        let failure = EmissionFailure::with_record(
            EmitError::ProviderUnreachable {
                cause: "timeout".into(),
            },
            record(),
        );
        let report = serde_json::to_value(failure.report()).unwrap();

        assert_eq!(report["kind"], "transient");
        assert_eq!(report["retryable"], true);
        assert_eq!(report["record"]["sale_id"], "sale-1");
    }
}
