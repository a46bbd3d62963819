//! # Direct Provider (DIAN gateway)
//!
//! The POS numbers the invoice itself, builds the DIAN document with its
//! CUFE, and posts it to a gateway that forwards it to the authority.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SaleSnapshot + resolution + number + issuer                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DianDocument::build ──► CUFE (SHA-384)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  POST {base}/invoices   X-Software-Id / X-Software-Pin                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ack { status, cufe?, errors?, track_id? }                              │
//! │        status: accepted | rejected | pending                            │
//! │                                                                         │
//! │  Recovery: GET {base}/invoices/{prefix}{number}   (404 → not received)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{
    build_client, endpoint, parse_base_url, read_json, read_optional_json, InvoiceProvider,
    Numbering, RemoteCatalog, SubmissionOutcome, SubmissionRequest, SubmissionStatus,
};
use crate::config::DirectSettings;
use crate::error::{EmitError, EmitResult};
use einvoice_core::{DianDocument, IssuerInfo, ProviderKind, SaleSnapshot};

/// Gateway acknowledgment.
#[derive(Debug, Deserialize)]
struct DianAck {
    status: SubmissionStatus,
    #[serde(default)]
    cufe: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    track_id: Option<String>,
}

impl DianAck {
    /// `computed_cufe` stands in when an acceptance omits the code.
    fn into_outcome(self, computed_cufe: &str) -> SubmissionOutcome {
        match self.status {
            SubmissionStatus::Accepted => SubmissionOutcome::accepted(
                self.track_id,
                Some(self.cufe.unwrap_or_else(|| computed_cufe.to_string())),
            ),
            SubmissionStatus::Pending => SubmissionOutcome::pending(self.track_id),
            SubmissionStatus::Rejected => {
                let reason = if self.errors.is_empty() {
                    "rejected without reason".to_string()
                } else {
                    self.errors.join("; ")
                };
                SubmissionOutcome::rejected(self.track_id, reason)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectProvider {
    client: reqwest::Client,
    base_url: Url,
    issuer: IssuerInfo,
}

impl DirectProvider {
    pub fn new(settings: &DirectSettings, timeout: Duration) -> EmitResult<Self> {
        let header = |value: &str, name: &str| {
            HeaderValue::from_str(value)
                .map_err(|e| EmitError::InvalidConfig(format!("invalid {name} header value: {e}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert("x-software-id", header(&settings.software_id, "software id")?);
        headers.insert("x-software-pin", header(&settings.software_pin, "software pin")?);
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        Ok(DirectProvider {
            client: build_client(headers, timeout)?,
            base_url: parse_base_url(&settings.base_url)?,
            issuer: settings.issuer(),
        })
    }

    fn document(&self, sale: &SaleSnapshot, numbering: &Numbering<'_>) -> EmitResult<DianDocument> {
        Ok(DianDocument::build(
            sale,
            numbering.resolution,
            numbering.number,
            &self.issuer,
        )?)
    }

    fn numbering<'a>(request: &SubmissionRequest<'a>) -> EmitResult<Numbering<'a>> {
        request.numbering.ok_or_else(|| {
            EmitError::Internal(format!(
                "direct submission of sale {} without an allocated number",
                request.sale.id
            ))
        })
    }
}

#[async_trait]
impl InvoiceProvider for DirectProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Direct
    }

    async fn authenticate(&self) -> EmitResult<()> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "status")?)
            .send()
            .await?;
        read_json::<serde_json::Value>(response).await?;
        Ok(())
    }

    fn catalog(&self) -> Option<&dyn RemoteCatalog> {
        None
    }

    async fn submit(&self, request: &SubmissionRequest<'_>) -> EmitResult<SubmissionOutcome> {
        let numbering = Self::numbering(request)?;
        let document = self.document(request.sale, &numbering)?;

        debug!(sale_id = %request.sale.id, number = %document.number, "Submitting DIAN document");

        let response = self
            .client
            .post(endpoint(&self.base_url, "invoices")?)
            .json(&document)
            .send()
            .await?;
        let ack: DianAck = read_json(response).await?;
        let outcome = ack.into_outcome(&document.cufe);

        info!(
            sale_id = %request.sale.id,
            number = %document.number,
            status = ?outcome.status,
            "DIAN gateway acknowledged document"
        );
        Ok(outcome)
    }

    async fn find_submission(
        &self,
        request: &SubmissionRequest<'_>,
    ) -> EmitResult<Option<SubmissionOutcome>> {
        // Without a number nothing can have been sent.
        let Some(numbering) = request.numbering else {
            return Ok(None);
        };
        let document = self.document(request.sale, &numbering)?;

        let response = self
            .client
            .get(endpoint(&self.base_url, &format!("invoices/{}", document.number))?)
            .send()
            .await?;
        let ack: Option<DianAck> = read_optional_json(response).await?;

        debug!(sale_id = %request.sale.id, number = %document.number, found = ack.is_some(), "Recovery query");
        Ok(ack.map(|ack| ack.into_outcome(&document.cufe)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
