//! # Provider Adapters
//!
//! The seam between the emission pipeline and whoever makes an invoice legal.
//!
//! ## Capabilities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        InvoiceProvider                                  │
//! │                                                                         │
//! │                         Direct (DIAN)      Delegated (Alegra)           │
//! │  ─────────────────────  ─────────────────  ─────────────────────────    │
//! │  authenticate()         GET status         GET company                  │
//! │  catalog()              None               contacts + items             │
//! │  submit()               POST invoices      POST invoices                │
//! │  find_submission()      GET invoices/{n}   GET invoices?anotation=      │
//! │                                                                         │
//! │  HTTP outcome mapping (both):                                           │
//! │    2xx + readable body  → SubmissionOutcome                             │
//! │    non-2xx              → ProviderRejected { status + body }            │
//! │    timeout / transport  → ProviderUnreachable                           │
//! │    2xx + garbled body   → ProviderUnreachable (outcome unknown)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Adapters never retry on their own; retrying is the orchestrator's call.

pub mod delegated;
pub mod direct;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::ProviderSettings;
use crate::error::{EmitError, EmitResult};
use einvoice_core::{ClientSnapshot, NumberingResolution, ProductRef, ProviderKind, SaleSnapshot};

pub use delegated::DelegatedProvider;
pub use direct::DirectProvider;

/// Longest slice of a provider body kept in error messages.
const MAX_BODY_IN_ERROR: usize = 512;

// =============================================================================
// Submission Types
// =============================================================================

/// What the provider decided about a submitted invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Legally valid; a legal code should come with it.
    Accepted,
    /// Received, decision pending.
    Pending,
    /// Refused by the authority.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub status: SubmissionStatus,
    /// Provider-side id (Alegra invoice id, DIAN track id).
    pub external_id: Option<String>,
    /// CUFE.
    pub legal_code: Option<String>,
    pub message: Option<String>,
}

impl SubmissionOutcome {
    pub fn accepted(external_id: Option<String>, legal_code: Option<String>) -> Self {
        SubmissionOutcome {
            status: SubmissionStatus::Accepted,
            external_id,
            legal_code,
            message: None,
        }
    }

    pub fn pending(external_id: Option<String>) -> Self {
        SubmissionOutcome {
            status: SubmissionStatus::Pending,
            external_id,
            legal_code: None,
            message: None,
        }
    }

    pub fn rejected(external_id: Option<String>, message: impl Into<String>) -> Self {
        SubmissionOutcome {
            status: SubmissionStatus::Rejected,
            external_id,
            legal_code: None,
            message: Some(message.into()),
        }
    }
}

/// The number a Direct submission carries.
#[derive(Debug, Clone, Copy)]
pub struct Numbering<'a> {
    pub resolution: &'a NumberingResolution,
    pub number: i64,
}

/// Provider ids of the entities a Delegated submission references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteReferences {
    pub client_id: String,
    /// Internal product id → provider item id.
    pub products: HashMap<String, String>,
}

/// Everything a provider may need to submit (or find) one sale's invoice.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionRequest<'a> {
    pub sale: &'a SaleSnapshot,
    /// Present for Direct submissions.
    pub numbering: Option<Numbering<'a>>,
    /// Present for Delegated submissions.
    pub references: Option<&'a RemoteReferences>,
}

// =============================================================================
// Traits
// =============================================================================

/// Remote client/product catalog of a provider that keeps one.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Looks a client up by document number.
    async fn find_client(&self, client: &ClientSnapshot) -> EmitResult<Option<String>>;

    async fn create_client(&self, client: &ClientSnapshot) -> EmitResult<String>;

    /// Looks a product up by its reference: the SKU, or the `INT-{id}` key
    /// stamped on items created without one.
    async fn find_product(&self, product: &ProductRef) -> EmitResult<Option<String>>;

    async fn create_product(&self, product: &ProductRef) -> EmitResult<String>;
}

#[async_trait]
pub trait InvoiceProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Checks credentials with a cheap authenticated call.
    async fn authenticate(&self) -> EmitResult<()>;

    /// The provider's catalog, if invoices must reference remote entities.
    fn catalog(&self) -> Option<&dyn RemoteCatalog>;

    async fn submit(&self, request: &SubmissionRequest<'_>) -> EmitResult<SubmissionOutcome>;

    /// Recovery query: did an earlier, unanswered submission land?
    async fn find_submission(
        &self,
        request: &SubmissionRequest<'_>,
    ) -> EmitResult<Option<SubmissionOutcome>>;
}

/// Builds the adapter described by `settings`.
pub fn from_settings(
    settings: &ProviderSettings,
    timeout: Duration,
) -> EmitResult<Arc<dyn InvoiceProvider>> {
    let provider: Arc<dyn InvoiceProvider> = match settings {
        ProviderSettings::Direct(direct) => Arc::new(DirectProvider::new(direct, timeout)?),
        ProviderSettings::Delegated(delegated) => {
            Arc::new(DelegatedProvider::new(delegated, timeout)?)
        }
    };
    Ok(provider)
}

// =============================================================================
// HTTP helpers shared by the adapters
// =============================================================================

pub(crate) fn build_client(headers: HeaderMap, timeout: Duration) -> EmitResult<reqwest::Client> {
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| EmitError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

/// Parses `base` so that relative joins append to its path.
pub(crate) fn parse_base_url(base: &str) -> EmitResult<Url> {
    let mut url = Url::parse(base)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub(crate) fn endpoint(base: &Url, path: &str) -> EmitResult<Url> {
    Ok(base.join(path)?)
}

/// Turns a response into `T`, mapping failures onto the provider errors.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> EmitResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(rejected(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| EmitError::ProviderUnreachable {
        cause: format!("unreadable {} response: {}", status.as_u16(), e),
    })
}

/// Like [`read_json`], but a 404 means "nothing there".
pub(crate) async fn read_optional_json<T: DeserializeOwned>(
    response: Response,
) -> EmitResult<Option<T>> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    read_json(response).await.map(Some)
}

pub(crate) fn rejected(status: StatusCode, body: &str) -> EmitError {
    let body = body.trim();
    let body = match body.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((cut, _)) => &body[..cut],
        None => body,
    };
    EmitError::ProviderRejected {
        reason: format!("HTTP {}: {}", status.as_u16(), body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let base = parse_base_url("https://api.alegra.com/api/v1").unwrap();
        assert_eq!(
            endpoint(&base, "contacts").unwrap().as_str(),
            "https://api.alegra.com/api/v1/contacts"
        );

        let base = parse_base_url("http://127.0.0.1:8080").unwrap();
        assert_eq!(
            endpoint(&base, "invoices/SETP1").unwrap().as_str(),
            "http://127.0.0.1:8080/invoices/SETP1"
        );
    }

    #[test]
    fn test_rejected_message_is_bounded() {
        let long = "x".repeat(2000);
        match rejected(StatusCode::BAD_REQUEST, &long) {
            EmitError::ProviderRejected { reason } => {
                assert!(reason.starts_with("HTTP 400: "));
                assert_eq!(reason.len(), "HTTP 400: ".len() + MAX_BODY_IN_ERROR);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_outcome_constructors() {
        let o = SubmissionOutcome::rejected(None, "bad nit");
        assert_eq!(o.status, SubmissionStatus::Rejected);
        assert_eq!(o.message.as_deref(), Some("bad nit"));
        assert!(SubmissionOutcome::pending(Some("9".into())).legal_code.is_none());
    }
}
