//! # Entity Reconciler
//!
//! Finds or creates the provider-side twin of a POS client or product and
//! remembers the pairing.
//!
//! ## Resolution Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  resolve(tenant, candidate)                                             │
//! │       │                                                                 │
//! │       ├─► mapping present? ──────────────────────────► external id      │
//! │       │                                                                 │
//! │       ├─► lock (tenant, kind, internal id)      ← one flight per key    │
//! │       │     mapping present now? ────────────────────► external id      │
//! │       │                                                                 │
//! │       ├─► remote lookup by natural key                                  │
//! │       │     (document number / SKU, else the INT-{id} reference)        │
//! │       │                                                                 │
//! │       ├─► remote create with the candidate payload                      │
//! │       │                                                                 │
//! │       └─► insert_or_get mapping  ← another process may have won:        │
//! │                                     its id is returned instead          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is written locally until the remote side answered successfully.

use tracing::{debug, info};

use crate::error::{EmitError, EmitResult};
use crate::locks::KeyedLocks;
use crate::provider::RemoteCatalog;
use einvoice_core::{ClientSnapshot, EntityKind, ProductRef};
use einvoice_db::MappingRepository;

/// The local entity to reconcile, carrying what a remote create needs.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    Client(&'a ClientSnapshot),
    Product(&'a ProductRef),
}

impl Candidate<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            Candidate::Client(_) => EntityKind::Client,
            Candidate::Product(_) => EntityKind::Product,
        }
    }

    pub fn internal_id(&self) -> &str {
        match self {
            Candidate::Client(client) => &client.id,
            Candidate::Product(product) => &product.id,
        }
    }
}

#[derive(Debug)]
pub struct Reconciler {
    mappings: MappingRepository,
    locks: KeyedLocks,
}

impl Reconciler {
    pub fn new(mappings: MappingRepository) -> Self {
        Reconciler {
            mappings,
            locks: KeyedLocks::new(),
        }
    }

    /// Returns the provider id of `candidate`, creating it remotely if needed.
    ///
    /// ## Errors
    /// Remote failures come back as `ExternalProvider { kind, internal_id, cause }`.
    pub async fn resolve(
        &self,
        catalog: &dyn RemoteCatalog,
        tenant_id: &str,
        candidate: Candidate<'_>,
    ) -> EmitResult<String> {
        let kind = candidate.kind();
        let internal_id = candidate.internal_id();

        if let Some(mapping) = self.mappings.get(tenant_id, kind, internal_id).await? {
            return Ok(mapping.external_id);
        }

        let _guard = self
            .locks
            .lock(&format!("{tenant_id}/{kind}/{internal_id}"))
            .await;

        // Whoever held the lock before us may have finished the job.
        if let Some(mapping) = self.mappings.get(tenant_id, kind, internal_id).await? {
            return Ok(mapping.external_id);
        }

        let external_id = self
            .find_or_create(catalog, candidate)
            .await
            .map_err(|cause| EmitError::external(kind, internal_id, cause))?;

        let (mapping, inserted) = self
            .mappings
            .insert_or_get(tenant_id, kind, internal_id, &external_id)
            .await?;

        if inserted {
            info!(
                tenant_id = %tenant_id,
                entity_kind = %kind,
                internal_id = %internal_id,
                external_id = %mapping.external_id,
                "Entity reconciled"
            );
        }
        Ok(mapping.external_id)
    }

    async fn find_or_create(
        &self,
        catalog: &dyn RemoteCatalog,
        candidate: Candidate<'_>,
    ) -> EmitResult<String> {
        let found = match candidate {
            Candidate::Client(client) => catalog.find_client(client).await?,
            Candidate::Product(product) => catalog.find_product(product).await?,
        };
        if let Some(external_id) = found {
            debug!(entity_kind = %candidate.kind(), internal_id = %candidate.internal_id(), "Found remote entity");
            return Ok(external_id);
        }

        match candidate {
            Candidate::Client(client) => catalog.create_client(client).await,
            Candidate::Product(product) => catalog.create_product(product).await,
        }
    }

    pub async fn sync_client(
        &self,
        catalog: &dyn RemoteCatalog,
        tenant_id: &str,
        client: &ClientSnapshot,
    ) -> EmitResult<String> {
        self.resolve(catalog, tenant_id, Candidate::Client(client)).await
    }

    pub async fn sync_product(
        &self,
        catalog: &dyn RemoteCatalog,
        tenant_id: &str,
        product: &ProductRef,
    ) -> EmitResult<String> {
        self.resolve(catalog, tenant_id, Candidate::Product(product)).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
