//! End-to-end emission scenarios against mock DIAN gateway and Alegra
//! servers.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use einvoice_core::{
    ActorContext, ClientSnapshot, EntityKind, InvoiceError, InvoiceStatus, NewResolution,
    NumberingResolution, ProductRef, ProviderKind, SaleLineItem, SaleSnapshot, EMIT_PERMISSION,
};
use einvoice_db::{Database, DbConfig};
use einvoice_emit::{
    DelegatedProvider, DelegatedSettings, DirectProvider, DirectSettings, EmissionConfig,
    EmissionService, EmitError, EmitResult, InvoiceProvider, RetryPolicy, SaleSource,
    SubmissionOutcome,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT: &str = "tenant-1";

// =============================================================================
// Fixtures
// =============================================================================

async fn database() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

async fn seed_resolution(db: &Database, start: i64, end: i64) -> NumberingResolution {
    db.resolutions()
        .create(&NewResolution {
            tenant_id: TENANT.to_string(),
            resolution_number: "18760000001".to_string(),
            prefix: Some("SETP".to_string()),
            range_start: start,
            range_end: end,
            valid_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            valid_to: NaiveDate::from_ymd_opt(2098, 12, 31).unwrap(),
            technical_key: "fc8eac422eba16e22ffd8c6f94b3f40a6e38162c".to_string(),
            active: true,
        })
        .await
        .unwrap()
}

fn client() -> ClientSnapshot {
    ClientSnapshot {
        id: "client-1".to_string(),
        name: "Ana Gómez".to_string(),
        document_type: "13".to_string(),
        document_number: "1020304050".to_string(),
        email: Some("ana@example.com".to_string()),
        phone: None,
        address: None,
    }
}

fn coffee() -> ProductRef {
    ProductRef {
        id: "prod-1".to_string(),
        sku: Some("CAF-500".to_string()),
        name: "Café 500g".to_string(),
        description: None,
        price_cents: 1_850_000,
    }
}

fn sale(id: &str) -> SaleSnapshot {
    SaleSnapshot {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 17, 30, 0).unwrap(),
        client: client(),
        line_items: vec![SaleLineItem {
            product_ref: None,
            name: "Pan".to_string(),
            unit_price_cents: 250_000,
            quantity: 2,
            tax_rate_bps: 1900,
        }],
    }
}

fn sale_with_product(id: &str) -> SaleSnapshot {
    let mut sale = sale(id);
    sale.line_items.push(SaleLineItem {
        product_ref: Some(coffee()),
        name: "Café 500g".to_string(),
        unit_price_cents: 1_850_000,
        quantity: 1,
        tax_rate_bps: 500,
    });
    sale
}

fn direct_with_timeout(server: &MockServer, timeout: Duration) -> Arc<dyn InvoiceProvider> {
    let settings = DirectSettings {
        base_url: server.uri(),
        software_id: "soft-1".to_string(),
        software_pin: "12345".to_string(),
        environment: "2".to_string(),
        test_set_id: Some("set-1".to_string()),
        nit: "900123456".to_string(),
        dv: "7".to_string(),
    };
    Arc::new(DirectProvider::new(&settings, timeout).unwrap())
}

fn direct(server: &MockServer) -> Arc<dyn InvoiceProvider> {
    direct_with_timeout(server, Duration::from_secs(5))
}

fn delegated(server: &MockServer) -> Arc<dyn InvoiceProvider> {
    let settings = DelegatedSettings {
        base_url: server.uri(),
        user_email: "billing@example.com".to_string(),
        api_key: "secret".to_string(),
    };
    Arc::new(DelegatedProvider::new(&settings, Duration::from_secs(5)).unwrap())
}

fn accepted_ack() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": "accepted", "track_id": "T-1" }))
}

struct MapSource(HashMap<String, SaleSnapshot>);

#[async_trait]
impl SaleSource for MapSource {
    async fn load_sale(&self, sale_id: &str) -> EmitResult<Option<SaleSnapshot>> {
        Ok(self.0.get(sale_id).cloned())
    }
}

// =============================================================================
// Direct provider
// =============================================================================

#[tokio::test]
async fn range_of_three_numbers_then_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack())
        .expect(3)
        .mount(&server)
        .await;

    let db = database().await;
    let resolution = seed_resolution(&db, 1, 3).await;
    let service = EmissionService::new(db.clone(), direct(&server));

    for (i, expected) in ["SETP1", "SETP2", "SETP3"].iter().enumerate() {
        let result = service.emit(&sale(&format!("sale-{i}"))).await.unwrap();
        assert_eq!(result.status, InvoiceStatus::Accepted);
        assert_eq!(result.number.as_deref(), Some(*expected));
        assert!(result.legal_code.is_some());
    }

    let failure = service.emit(&sale("sale-4")).await.unwrap_err();
    assert!(matches!(
        failure.error,
        EmitError::Invoice(InvoiceError::NumberingExhausted { range_end: 3, .. })
    ));
    assert!(!failure.error.is_retryable());

    let record = failure.record.unwrap();
    assert_eq!(record.status, InvoiceStatus::Error);
    assert!(!record.has_number());

    let stored = db.resolutions().get(&resolution.id).await.unwrap().unwrap();
    assert_eq!(stored.current, 3);
}

#[tokio::test]
async fn concurrent_emissions_share_the_range_without_gaps() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack())
        .expect(3)
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 10, 12).await;
    let service = Arc::new(EmissionService::new(db.clone(), direct(&server)));

    let mut handles = Vec::new();
    for i in 0..4 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.emit(&sale(&format!("sale-{i}"))).await
        }));
    }

    let mut numbers = Vec::new();
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => numbers.push(result.number.unwrap()),
            Err(failure) => {
                assert!(matches!(
                    failure.error,
                    EmitError::Invoice(InvoiceError::NumberingExhausted { .. })
                ));
                exhausted += 1;
            }
        }
    }

    numbers.sort();
    assert_eq!(numbers, vec!["SETP10", "SETP11", "SETP12"]);
    assert_eq!(exhausted, 1);
}

#[tokio::test]
async fn accepted_invoice_is_never_resubmitted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(db.clone(), direct(&server));

    let first = service.emit(&sale("sale-1")).await.unwrap();
    assert_eq!(first.status, InvoiceStatus::Accepted);

    let failure = service.emit(&sale("sale-1")).await.unwrap_err();
    assert!(matches!(
        failure.error,
        EmitError::Invoice(InvoiceError::AlreadyAccepted { .. })
    ));
    let record = failure.record.unwrap();
    assert_eq!(record.status, InvoiceStatus::Accepted);
    assert_eq!(record.attempts, 1);
}

#[tokio::test]
async fn same_sale_emitted_concurrently_submits_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack().set_delay(Duration::from_millis(50)))
        .expect(1)
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;
    let service = Arc::new(EmissionService::new(db.clone(), direct(&server)));

    let a = tokio::spawn({
        let service = service.clone();
        async move { service.emit(&sale("sale-1")).await }
    });
    let b = tokio::spawn({
        let service = service.clone();
        async move { service.emit(&sale("sale-1")).await }
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(failure) if matches!(failure.error, EmitError::Invoice(InvoiceError::AlreadyAccepted { .. }))
    )));
}

#[tokio::test]
async fn timeout_then_retry_reuses_the_number() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack().set_delay(Duration::from_secs(2)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack())
        .expect(1)
        .mount(&server)
        .await;
    // Recovery query before the second submission: nothing landed.
    Mock::given(method("GET"))
        .and(path("/invoices/SETP1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let db = database().await;
    let resolution = seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(
        db.clone(),
        direct_with_timeout(&server, Duration::from_millis(200)),
    );

    let failure = service.emit(&sale("sale-1")).await.unwrap_err();
    assert!(matches!(failure.error, EmitError::ProviderUnreachable { .. }));
    assert!(failure.error.is_retryable());

    let record = failure.record.unwrap();
    assert_eq!(record.status, InvoiceStatus::Error);
    assert_eq!(record.invoice_number, Some(1));
    assert!(record.status_message.is_some());

    let result = service.emit(&sale("sale-1")).await.unwrap();
    assert_eq!(result.status, InvoiceStatus::Accepted);
    assert_eq!(result.number.as_deref(), Some("SETP1"));

    let stored = db.resolutions().get(&resolution.id).await.unwrap().unwrap();
    assert_eq!(stored.current, 1, "retry must not allocate again");

    let record = service.status("sale-1").await.unwrap().unwrap();
    assert_eq!(record.attempts, 2);
}

#[tokio::test]
async fn recovery_query_applies_a_landed_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/invoices/SETP1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "accepted", "cufe": "CUFE-LANDED" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(db.clone(), direct(&server));

    let failure = service.emit(&sale("sale-1")).await.unwrap_err();
    assert!(matches!(failure.error, EmitError::ProviderUnreachable { .. }));

    // Second attempt finds the invoice instead of submitting it again.
    let result = service.emit(&sale("sale-1")).await.unwrap();
    assert_eq!(result.status, InvoiceStatus::Accepted);
    assert_eq!(result.legal_code.as_deref(), Some("CUFE-LANDED"));
}

#[tokio::test]
async fn gateway_error_then_retry_keeps_the_audit_trail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(500).set_body_string("gateway down"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack())
        .expect(1)
        .mount(&server)
        .await;

    let db = database().await;
    let resolution = seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(db.clone(), direct(&server));

    let failure = service.emit(&sale("sale-1")).await.unwrap_err();
    match &failure.error {
        EmitError::ProviderRejected { reason } => assert!(reason.contains("HTTP 500")),
        other => panic!("unexpected {other:?}"),
    }
    let record = failure.record.unwrap();
    assert_eq!(record.status, InvoiceStatus::Error);
    assert!(record.status_message.unwrap().contains("gateway down"));

    let result = service.emit(&sale("sale-1")).await.unwrap();
    assert_eq!(result.status, InvoiceStatus::Accepted);

    let stored = db.resolutions().get(&resolution.id).await.unwrap().unwrap();
    assert_eq!(stored.current, 1);

    let record = service.status("sale-1").await.unwrap().unwrap();
    let path: Vec<_> = db
        .invoices()
        .history(&record.id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.from_status, t.to_status))
        .collect();
    assert_eq!(
        path,
        vec![
            (InvoiceStatus::Draft, InvoiceStatus::Signed),
            (InvoiceStatus::Signed, InvoiceStatus::Error),
            (InvoiceStatus::Error, InvoiceStatus::Signed),
            (InvoiceStatus::Signed, InvoiceStatus::Sent),
            (InvoiceStatus::Sent, InvoiceStatus::Accepted),
        ]
    );
}

#[tokio::test]
async fn rejection_is_recorded_and_reemission_reuses_the_number() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "rejected",
            "errors": ["FAD06: NIT del adquiriente no válido"]
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack())
        .expect(1)
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(db.clone(), direct(&server));

    let failure = service.emit(&sale("sale-1")).await.unwrap_err();
    match &failure.error {
        EmitError::ProviderRejected { reason } => assert!(reason.contains("FAD06")),
        other => panic!("unexpected {other:?}"),
    }
    let record = failure.record.unwrap();
    assert_eq!(record.status, InvoiceStatus::Rejected);
    assert!(record.status_message.unwrap().contains("FAD06"));

    let result = service.emit(&sale("sale-1")).await.unwrap();
    assert_eq!(result.status, InvoiceStatus::Accepted);
    assert_eq!(result.number.as_deref(), Some("SETP1"));
}

#[tokio::test]
async fn duplicate_legal_code_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "accepted", "cufe": "CUFE-DUP" })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(db.clone(), direct(&server));

    service.emit(&sale("sale-1")).await.unwrap();
    let failure = service.emit(&sale("sale-2")).await.unwrap_err();
    assert!(matches!(
        failure.error,
        EmitError::Invoice(InvoiceError::DuplicateLegalCode { .. })
    ));

    let first = service.status("sale-1").await.unwrap().unwrap();
    assert_eq!(first.status, InvoiceStatus::Accepted);
    assert_eq!(first.legal_code.as_deref(), Some("CUFE-DUP"));

    let second = service.status("sale-2").await.unwrap().unwrap();
    assert_eq!(second.status, InvoiceStatus::Error);
    assert!(second.legal_code.is_none());
}

#[tokio::test]
async fn invalid_sale_allocates_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(accepted_ack())
        .expect(0)
        .mount(&server)
        .await;

    let db = database().await;
    let resolution = seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(db.clone(), direct(&server));

    let mut bad = sale("sale-1");
    bad.line_items.clear();

    let failure = service.emit(&bad).await.unwrap_err();
    assert!(matches!(
        failure.error,
        EmitError::Invoice(InvoiceError::Validation(_))
    ));
    assert_eq!(failure.record.unwrap().status, InvoiceStatus::Error);

    let stored = db.resolutions().get(&resolution.id).await.unwrap().unwrap();
    assert_eq!(stored.current, 0);
}

#[tokio::test]
async fn missing_resolution_is_reported() {
    let server = MockServer::start().await;
    let db = database().await;
    let service = EmissionService::new(db.clone(), direct(&server));

    let failure = service.emit(&sale("sale-1")).await.unwrap_err();
    assert!(matches!(
        failure.error,
        EmitError::Invoice(InvoiceError::ResolutionInvalid { .. })
    ));
}

#[tokio::test]
async fn emit_with_retry_rides_out_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack().set_delay(Duration::from_secs(2)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack())
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(
        db.clone(),
        direct_with_timeout(&server, Duration::from_millis(200)),
    )
    .with_retry(RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    });

    let result = service.emit_with_retry(&sale("sale-1")).await.unwrap();
    assert_eq!(result.status, InvoiceStatus::Accepted);
    assert_eq!(service.status("sale-1").await.unwrap().unwrap().attempts, 2);
}

#[tokio::test]
async fn emit_with_retry_gives_up_on_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad document"))
        .expect(1)
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;
    let service = EmissionService::new(db.clone(), direct(&server)).with_retry(RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    });

    let failure = service.emit_with_retry(&sale("sale-1")).await.unwrap_err();
    assert!(matches!(failure.error, EmitError::ProviderRejected { .. }));
}

// =============================================================================
// Delegated provider
// =============================================================================

#[tokio::test]
async fn new_client_is_reconciled_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .and(query_param("identification", "1020304050"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 501 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("reference", "CAF-500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 31 }])))
        .expect(1)
        .mount(&server)
        .await;
    for (sale_id, cufe) in [("sale-1", "CUFE-A1"), ("sale-2", "CUFE-A2")] {
        Mock::given(method("POST"))
            .and(path("/invoices"))
            .and(body_partial_json(json!({
                "client": 501,
                "anotation": format!("sale:{sale_id}")
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 9001,
                "stamp": { "cufe": cufe }
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let db = database().await;
    let service = EmissionService::new(db.clone(), delegated(&server));
    assert_eq!(service.provider_kind(), ProviderKind::Delegated);

    let first = service.emit(&sale_with_product("sale-1")).await.unwrap();
    assert_eq!(first.status, InvoiceStatus::Accepted);
    assert_eq!(first.legal_code.as_deref(), Some("CUFE-A1"));
    assert_eq!(first.external_id.as_deref(), Some("9001"));
    assert!(first.number.is_none());

    let second = service.emit(&sale_with_product("sale-2")).await.unwrap();
    assert_eq!(second.legal_code.as_deref(), Some("CUFE-A2"));

    let clients = db.mappings().list(TENANT, EntityKind::Client).await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].external_id, "501");

    let item = db
        .mappings()
        .get(TENANT, EntityKind::Product, "prod-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.external_id, "31");
}

#[tokio::test]
async fn pending_invoice_waits_for_confirmation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 7 }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9002 })))
        .expect(1)
        .mount(&server)
        .await;

    let db = database().await;
    let service = EmissionService::new(db.clone(), delegated(&server));

    let result = service.emit(&sale("sale-1")).await.unwrap();
    assert_eq!(result.status, InvoiceStatus::Sent);
    assert_eq!(result.external_id.as_deref(), Some("9002"));
    assert!(result.legal_code.is_none());

    let failure = service.emit(&sale("sale-1")).await.unwrap_err();
    assert!(matches!(
        failure.error,
        EmitError::Invoice(InvoiceError::PendingConfirmation { .. })
    ));

    let unchanged = service
        .record_confirmation("sale-1", SubmissionOutcome::pending(None))
        .await
        .unwrap();
    assert_eq!(unchanged.status, InvoiceStatus::Sent);

    let record = service
        .record_confirmation(
            "sale-1",
            SubmissionOutcome::accepted(None, Some("CUFE-LATE".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(record.status, InvoiceStatus::Accepted);
    assert_eq!(record.legal_code.as_deref(), Some("CUFE-LATE"));
    assert_eq!(record.external_id.as_deref(), Some("9002"));
}

#[tokio::test]
async fn unreachable_catalog_leaves_no_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let db = database().await;
    let service = EmissionService::new(db.clone(), delegated(&server));

    let failure = service.emit(&sale("sale-1")).await.unwrap_err();
    match &failure.error {
        EmitError::ExternalProvider {
            entity_kind,
            internal_id,
            ..
        } => {
            assert_eq!(*entity_kind, EntityKind::Client);
            assert_eq!(internal_id, "client-1");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(failure.error.is_retryable());
    assert_eq!(failure.record.unwrap().status, InvoiceStatus::Error);
    assert!(db
        .mappings()
        .get(TENANT, EntityKind::Client, "client-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn record_confirmation_requires_a_record() {
    let db = database().await;
    let server = MockServer::start().await;
    let service = EmissionService::new(db, delegated(&server));

    let err = service
        .record_confirmation("ghost", SubmissionOutcome::pending(None))
        .await
        .unwrap_err();
    assert!(matches!(err, EmitError::SaleNotFound(_)));
}

// =============================================================================
// Boundary: actors, sale source, configuration
// =============================================================================

#[tokio::test]
async fn emit_for_checks_permission_and_tenant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(accepted_ack())
        .expect(1)
        .mount(&server)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;

    let mut sales = HashMap::new();
    sales.insert("sale-1".to_string(), sale("sale-1"));
    let service = EmissionService::new(db.clone(), direct(&server))
        .with_sale_source(Arc::new(MapSource(sales)));

    let cashier = ActorContext {
        tenant_id: TENANT.to_string(),
        permissions: vec!["sales.create".to_string()],
    };
    let failure = service.emit_for(&cashier, "sale-1").await.unwrap_err();
    assert!(matches!(failure.error, EmitError::Forbidden(_)));
    assert!(failure.record.is_none());

    let outsider = ActorContext {
        tenant_id: "tenant-2".to_string(),
        permissions: vec![EMIT_PERMISSION.to_string()],
    };
    let failure = service.emit_for(&outsider, "sale-1").await.unwrap_err();
    assert!(matches!(failure.error, EmitError::Forbidden(_)));
    assert!(service.status("sale-1").await.unwrap().is_none());

    let billing = ActorContext {
        tenant_id: TENANT.to_string(),
        permissions: vec![EMIT_PERMISSION.to_string()],
    };
    let failure = service.emit_for(&billing, "sale-404").await.unwrap_err();
    assert!(matches!(failure.error, EmitError::SaleNotFound(_)));

    let result = service.emit_for(&billing, "sale-1").await.unwrap();
    assert_eq!(result.status, InvoiceStatus::Accepted);
}

#[tokio::test]
async fn emit_sale_needs_a_sale_source() {
    let server = MockServer::start().await;
    let service = EmissionService::new(database().await, direct(&server));

    let failure = service.emit_sale("sale-1").await.unwrap_err();
    assert!(matches!(failure.error, EmitError::InvalidConfig(_)));
}

#[tokio::test]
async fn provider_selection_follows_configuration() {
    let server = MockServer::start().await;
    let toml = format!(
        r#"
        [providers.default]
        kind = "delegated"
        base_url = "{uri}"
        user_email = "billing@example.com"
        api_key = "secret"

        [providers.tenants.{TENANT}]
        kind = "direct"
        base_url = "{uri}"
        software_id = "soft-1"
        software_pin = "12345"
        test_set_id = "set-1"
        nit = "900123456"
        dv = "7"
        "#,
        uri = server.uri()
    );
    let config = EmissionConfig::from_toml(&toml).unwrap();
    config.validate().unwrap();
    let db = database().await;

    let direct = EmissionService::from_config(db.clone(), &config, TENANT).unwrap();
    assert_eq!(direct.provider_kind(), ProviderKind::Direct);

    let fallback = EmissionService::from_config(db.clone(), &config, "tenant-9").unwrap();
    assert_eq!(fallback.provider_kind(), ProviderKind::Delegated);

    // A tenant-scoped service refuses other tenants' sales.
    let mut foreign = sale("sale-x");
    foreign.tenant_id = "tenant-2".to_string();
    let failure = direct.emit(&foreign).await.unwrap_err();
    assert!(matches!(failure.error, EmitError::Forbidden(_)));

    let Err(err) = EmissionService::from_config(db, &EmissionConfig::default(), TENANT) else {
        panic!("expected NotConfigured");
    };
    assert!(matches!(err, EmitError::NotConfigured { ref tenant_id } if tenant_id == TENANT));
}

#[tokio::test]
async fn switching_provider_on_a_fresh_draft() {
    let direct_server = MockServer::start().await;
    let alegra = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 7 }])))
        .mount(&alegra)
        .await;
    // Second attempt on the record: the recovery query runs first.
    Mock::given(method("GET"))
        .and(path("/invoices"))
        .and(query_param("anotation", "sale:sale-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&alegra)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 55,
            "stamp": { "cufe": "CUFE-SW" }
        })))
        .expect(1)
        .mount(&alegra)
        .await;

    let db = database().await;
    // No resolution: the Direct attempt fails before a number exists.
    let direct = EmissionService::new(db.clone(), direct(&direct_server));
    let failure = direct.emit(&sale("sale-1")).await.unwrap_err();
    let record = failure.record.unwrap();
    assert_eq!(record.provider, ProviderKind::Direct);
    assert_eq!(record.status, InvoiceStatus::Error);

    let delegated = EmissionService::new(db.clone(), delegated(&alegra));
    let result = delegated.emit(&sale("sale-1")).await.unwrap();
    assert_eq!(result.status, InvoiceStatus::Accepted);

    let record = delegated.status("sale-1").await.unwrap().unwrap();
    assert_eq!(record.provider, ProviderKind::Delegated);
}

#[tokio::test]
async fn numbered_error_record_stays_with_its_provider() {
    let direct_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(500).set_body_string("gateway down"))
        .expect(1)
        .mount(&direct_server)
        .await;
    let alegra = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 55 })))
        .expect(0)
        .mount(&alegra)
        .await;

    let db = database().await;
    seed_resolution(&db, 1, 100).await;
    let direct = EmissionService::new(db.clone(), direct(&direct_server));
    let failure = direct.emit(&sale("sale-1")).await.unwrap_err();
    let parked = failure.record.unwrap();
    assert_eq!(parked.status, InvoiceStatus::Error);
    assert_eq!(parked.invoice_number, Some(1));

    let delegated = EmissionService::new(db.clone(), delegated(&alegra));
    let failure = delegated.emit(&sale("sale-1")).await.unwrap_err();
    match &failure.error {
        EmitError::Invoice(InvoiceError::ProviderMismatch {
            recorded,
            requested,
            ..
        }) => {
            assert_eq!(*recorded, ProviderKind::Direct);
            assert_eq!(*requested, ProviderKind::Delegated);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Untouched: same status, same number, no extra attempt or history row.
    let record = delegated.status("sale-1").await.unwrap().unwrap();
    assert_eq!(record.status, InvoiceStatus::Error);
    assert_eq!(record.provider, ProviderKind::Direct);
    assert_eq!(record.invoice_number, Some(1));
    assert_eq!(record.attempts, parked.attempts);
    let history = db.invoices().history(&record.id).await.unwrap();
    assert_eq!(history.len(), 2);
}
