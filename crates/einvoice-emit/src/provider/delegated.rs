//! # Delegated Provider (Alegra)
//!
//! Alegra numbers, stamps and submits the invoice; the POS only has to make
//! sure the buyer and the products exist on Alegra's side first.
//!
//! ## Endpoints (REST v1, HTTP Basic `email:token`)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  GET  company                        credentials check                  │
//! │  GET  contacts?identification={doc}  client lookup                      │
//! │  POST contacts                       client create                      │
//! │  GET  items?reference={sku}          product lookup (SKU only)          │
//! │  POST items                          product create                     │
//! │  POST invoices                       emission, stamp.generateStamp      │
//! │  GET  invoices?anotation=sale:{id}   recovery query                     │
//! │                                                                         │
//! │  Response with stamp.cufe  → accepted in one round trip                 │
//! │  Response without          → pending (stays `sent`)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{
    build_client, endpoint, parse_base_url, read_json, InvoiceProvider, RemoteCatalog,
    RemoteReferences, SubmissionOutcome, SubmissionRequest,
};
use crate::config::DelegatedSettings;
use crate::error::{EmitError, EmitResult};
use einvoice_core::{ClientSnapshot, Money, ProductRef, ProviderKind, SaleSnapshot};

/// Alegra refuses contacts without an email.
const PLACEHOLDER_EMAIL: &str = "noemail@example.com";
/// Name for inline lines that carry none.
const GENERIC_ITEM_NAME: &str = "Item Genérico";

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Serialize)]
struct ContactPayload<'a> {
    name: &'a str,
    identification: &'a str,
    email: &'a str,
    #[serde(rename = "phonePrimary", skip_serializing_if = "Option::is_none")]
    phone_primary: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<AddressPayload<'a>>,
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct AddressPayload<'a> {
    address: &'a str,
}

#[derive(Debug, Serialize)]
struct ItemPayload<'a> {
    name: &'a str,
    price: [PricePayload; 1],
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    inventory: InventoryPayload,
}

#[derive(Debug, Serialize)]
struct PricePayload {
    price: Value,
}

#[derive(Debug, Serialize)]
struct InventoryPayload {
    unit: &'static str,
}

#[derive(Debug, Serialize)]
struct InvoicePayload {
    date: String,
    #[serde(rename = "dueDate")]
    due_date: String,
    client: Value,
    items: Vec<Value>,
    #[serde(rename = "paymentMethod")]
    payment_method: &'static str,
    status: &'static str,
    stamp: StampRequest,
    /// Lets the recovery query find this invoice again.
    anotation: String,
}

#[derive(Debug, Serialize)]
struct StampRequest {
    #[serde(rename = "generateStamp")]
    generate_stamp: bool,
}

/// Anything Alegra returns with an id.
#[derive(Debug, Deserialize)]
struct RemoteEntity {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct RemoteInvoice {
    id: Value,
    #[serde(default)]
    stamp: Option<RemoteStamp>,
}

#[derive(Debug, Deserialize)]
struct RemoteStamp {
    #[serde(default)]
    cufe: Option<String>,
}

impl RemoteInvoice {
    fn into_outcome(self) -> SubmissionOutcome {
        let external_id = id_string(&self.id);
        match self.stamp.and_then(|s| s.cufe).filter(|c| !c.is_empty()) {
            Some(cufe) => SubmissionOutcome::accepted(external_id, Some(cufe)),
            None => SubmissionOutcome::pending(external_id),
        }
    }
}

/// Alegra ids come back as numbers; older endpoints send strings.
fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Numeric ids are sent back as numbers.
fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}

fn required_id(entity: RemoteEntity, what: &str) -> EmitResult<String> {
    id_string(&entity.id).ok_or_else(|| EmitError::ProviderUnreachable {
        cause: format!("{what} response without a usable id"),
    })
}

fn annotation(sale: &SaleSnapshot) -> String {
    format!("sale:{}", sale.id)
}

// =============================================================================
// Provider
// =============================================================================

#[derive(Debug, Clone)]
pub struct DelegatedProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl DelegatedProvider {
    pub fn new(settings: &DelegatedSettings, timeout: Duration) -> EmitResult<Self> {
        let credentials = STANDARD.encode(format!("{}:{}", settings.user_email, settings.api_key));

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {credentials}"))
                .map_err(|e| EmitError::InvalidConfig(format!("invalid credentials header: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        Ok(DelegatedProvider {
            client: build_client(headers, timeout)?,
            base_url: parse_base_url(&settings.base_url)?,
        })
    }

    /// First hit of a search endpoint, if any.
    async fn search(&self, path: &str, query: (&str, &str)) -> EmitResult<Option<String>> {
        let response = self
            .client
            .get(endpoint(&self.base_url, path)?)
            .query(&[query])
            .send()
            .await?;
        let hits: Vec<RemoteEntity> = read_json(response).await?;
        Ok(hits.into_iter().find_map(|hit| id_string(&hit.id)))
    }

    async fn create<T: Serialize + Sync>(&self, path: &str, payload: &T) -> EmitResult<String> {
        let response = self
            .client
            .post(endpoint(&self.base_url, path)?)
            .json(payload)
            .send()
            .await?;
        let created: RemoteEntity = read_json(response).await?;
        required_id(created, path)
    }

    fn invoice_payload(sale: &SaleSnapshot, refs: &RemoteReferences) -> InvoicePayload {
        let items = sale
            .line_items
            .iter()
            .map(|line| {
                let price = line.unit_price().to_json_number();
                let mapped = line
                    .product_ref
                    .as_ref()
                    .and_then(|p| refs.products.get(&p.id));
                match mapped {
                    Some(item_id) => serde_json::json!({
                        "id": id_value(item_id),
                        "price": price,
                        "quantity": line.quantity,
                    }),
                    None => {
                        let name = if line.name.trim().is_empty() {
                            GENERIC_ITEM_NAME
                        } else {
                            line.name.as_str()
                        };
                        serde_json::json!({
                            "name": name,
                            "price": price,
                            "quantity": line.quantity,
                        })
                    }
                }
            })
            .collect();

        let date = sale.local_date().format("%Y-%m-%d").to_string();
        InvoicePayload {
            date: date.clone(),
            due_date: date,
            client: id_value(&refs.client_id),
            items,
            payment_method: "cash",
            status: "open",
            stamp: StampRequest {
                generate_stamp: true,
            },
            anotation: annotation(sale),
        }
    }
}

#[async_trait]
impl RemoteCatalog for DelegatedProvider {
    async fn find_client(&self, client: &ClientSnapshot) -> EmitResult<Option<String>> {
        self.search("contacts", ("identification", &client.document_number))
            .await
    }

    async fn create_client(&self, client: &ClientSnapshot) -> EmitResult<String> {
        let payload = ContactPayload {
            name: &client.name,
            identification: &client.document_number,
            email: client.email.as_deref().unwrap_or(PLACEHOLDER_EMAIL),
            phone_primary: client.phone.as_deref(),
            address: client
                .address
                .as_deref()
                .map(|address| AddressPayload { address }),
            kind: "person",
        };
        let id = self.create("contacts", &payload).await?;
        info!(client_id = %client.id, alegra_id = %id, "Alegra contact created");
        Ok(id)
    }

    async fn find_product(&self, product: &ProductRef) -> EmitResult<Option<String>> {
        // Same key create_product stamps, so SKU-less items are found too.
        self.search("items", ("reference", &product.reference()))
            .await
    }

    async fn create_product(&self, product: &ProductRef) -> EmitResult<String> {
        let payload = ItemPayload {
            name: &product.name,
            price: [PricePayload {
                price: Money::from_cents(product.price_cents).to_json_number(),
            }],
            reference: product.reference(),
            description: product.description.as_deref(),
            inventory: InventoryPayload { unit: "unit" },
        };
        let id = self.create("items", &payload).await?;
        info!(product_id = %product.id, alegra_id = %id, "Alegra item created");
        Ok(id)
    }
}

#[async_trait]
impl InvoiceProvider for DelegatedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Delegated
    }

    async fn authenticate(&self) -> EmitResult<()> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "company")?)
            .send()
            .await?;
        read_json::<Value>(response).await?;
        Ok(())
    }

    fn catalog(&self) -> Option<&dyn RemoteCatalog> {
        Some(self as &dyn RemoteCatalog)
    }

    async fn submit(&self, request: &SubmissionRequest<'_>) -> EmitResult<SubmissionOutcome> {
        let refs = request.references.ok_or_else(|| {
            EmitError::Internal(format!(
                "delegated submission of sale {} without reconciled references",
                request.sale.id
            ))
        })?;
        let payload = Self::invoice_payload(request.sale, refs);

        debug!(sale_id = %request.sale.id, items = payload.items.len(), "Submitting Alegra invoice");

        let response = self
            .client
            .post(endpoint(&self.base_url, "invoices")?)
            .json(&payload)
            .send()
            .await?;
        let invoice: RemoteInvoice = read_json(response).await?;
        let outcome = invoice.into_outcome();

        info!(
            sale_id = %request.sale.id,
            alegra_id = ?outcome.external_id,
            status = ?outcome.status,
            "Alegra invoice created"
        );
        Ok(outcome)
    }

    async fn find_submission(
        &self,
        request: &SubmissionRequest<'_>,
    ) -> EmitResult<Option<SubmissionOutcome>> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "invoices")?)
            .query(&[("anotation", annotation(request.sale))])
            .send()
            .await?;
        let found: Vec<RemoteInvoice> = read_json(response).await?;

        debug!(sale_id = %request.sale.id, hits = found.len(), "Recovery query");
        Ok(found.into_iter().next().map(RemoteInvoice::into_outcome))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
