//! # HTTP Flow Tests
//!
//! Drive the full router (middleware included) with `oneshot` requests
//! against an orchestrator built from the scripted test fakes.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use ss_api_gateway::{ApiGatewayService, GatewayConfig, RateLimitState};
use ss_safeprotocol::test_utils::{
    completion, make_signer, make_test_service_with_gate, BudgetGate, TestService,
    VALID_PERSONAL_NUMBER,
};
use ss_safeprotocol::{CollectResponse, RateLimitGate, SafeProtocolApi, Signer, SignerRepository};
use std::sync::Arc;
use tower::ServiceExt;

// =============================================================================
// TEST HELPERS
// =============================================================================

struct Harness {
    router: Router,
    service: Arc<TestService>,
    gate: Arc<BudgetGate>,
}

async fn harness() -> Harness {
    let gate = Arc::new(BudgetGate::new(u32::MAX));
    let (service, _switch) = make_test_service_with_gate(Arc::clone(&gate) as Arc<dyn RateLimitGate>);
    let service = Arc::new(service);

    let config = GatewayConfig::default();
    let rate_limit = Arc::new(RateLimitState::new(config.rate_limit.clone()));
    let api: Arc<dyn SafeProtocolApi> = Arc::clone(&service) as Arc<dyn SafeProtocolApi>;
    let gateway = ApiGatewayService::new(config, api, rate_limit).unwrap();

    Harness {
        router: gateway.router(),
        service,
        gate,
    }
}

async fn seeded() -> (Harness, Signer) {
    let h = harness().await;
    let signer = make_signer(Some("Hyresavtal"));
    h.service.store().insert_signer(signer.clone()).await.unwrap();
    (h, signer)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value, axum::http::HeaderMap) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body, headers)
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

async fn init(h: &Harness, signer: &Signer) -> (StatusCode, Value) {
    let (status, body, _) = send(
        &h.router,
        post(
            "/api/safeprotocol/verify-identity/init",
            json!({ "signerId": signer.id }),
        ),
    )
    .await;
    (status, body)
}

async fn collect(h: &Harness, signer: &Signer, order_ref: &str) -> (StatusCode, Value) {
    let (status, body, _) = send(
        &h.router,
        post(
            "/api/safeprotocol/verify-identity/collect",
            json!({ "orderRef": order_ref, "signerId": signer.id }),
        ),
    )
    .await;
    (status, body)
}

// =============================================================================
// CEREMONY
// =============================================================================

#[tokio::test]
async fn test_full_ceremony_over_http() {
    let (h, signer) = seeded().await;

    let (status, body) = init(&h, &signer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let order_ref = body["orderRef"].as_str().unwrap().to_string();
    assert!(body["autoStartToken"].is_string());

    h.service.provider().script_poll(
        &order_ref,
        [
            Ok(CollectResponse::pending(&order_ref, Some("userSign"))),
            Ok(CollectResponse::complete(&order_ref, completion(VALID_PERSONAL_NUMBER))),
        ],
    );

    let (status, body) = collect(&h, &signer, &order_ref).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["hintCode"], "userSign");

    let (status, body) = collect(&h, &signer, &order_ref).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
    assert_eq!(body["verified"], true);
    assert_eq!(body["signer"]["verifiedName"], "Anna Svensson");

    let (status, body, _) = send(
        &h.router,
        post(
            "/api/safeprotocol/consent/submit",
            json!({
                "signerId": signer.id,
                "consentCategories": ["identity_signature_consent", "data_processing_consent"],
                "deviceId": "device-7"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consentedCategories"].as_array().unwrap().len(), 2);

    let (status, body, _) = send(
        &h.router,
        get(&format!("/api/safeprotocol/signers/{}/status", signer.id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "consent_given");
    assert_eq!(body["complete"], true);
}

#[tokio::test]
async fn test_failed_collect_is_bad_request() {
    let (h, signer) = seeded().await;
    let (_, body) = init(&h, &signer).await;
    let order_ref = body["orderRef"].as_str().unwrap().to_string();
    h.service
        .provider()
        .script_poll(&order_ref, [Ok(CollectResponse::failed(&order_ref, Some("userCancel")))]);

    let (status, body) = collect(&h, &signer, &order_ref).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["errorCode"], "userCancel");
}

#[tokio::test]
async fn test_cancel_reports_provider_ack() {
    let (h, signer) = seeded().await;
    let (_, body) = init(&h, &signer).await;
    let order_ref = body["orderRef"].as_str().unwrap().to_string();

    let (status, body, _) = send(
        &h.router,
        post(
            "/api/safeprotocol/verify-identity/cancel",
            json!({ "orderRef": order_ref, "signerId": signer.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "cancelled": true }));
    assert_eq!(h.service.provider().cancelled_orders(), vec![order_ref]);
}

#[tokio::test]
async fn test_collect_with_another_signers_order_is_not_found() {
    let (h, owner) = seeded().await;
    let other = make_signer(None);
    h.service.store().insert_signer(other.clone()).await.unwrap();

    let (_, body) = init(&h, &owner).await;
    let order_ref = body["orderRef"].as_str().unwrap().to_string();
    h.service.provider().script_poll(
        &order_ref,
        [Ok(CollectResponse::complete(&order_ref, completion(VALID_PERSONAL_NUMBER)))],
    );

    let (status, body) = collect(&h, &other, &order_ref).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Verification order not found");

    let stored = h.service.store().find_signer(other.id).await.unwrap().unwrap();
    assert!(!stored.identity_verified());

    let (status, body) = collect(&h, &owner, &order_ref).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

#[tokio::test]
async fn test_second_init_returns_existing_order_ref() {
    let (h, signer) = seeded().await;
    let (_, first) = init(&h, &signer).await;

    let (status, body, headers) = send(
        &h.router,
        post(
            "/api/safeprotocol/verify-identity/init",
            json!({ "signerId": signer.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["orderRef"], first["orderRef"]);
    assert!(headers.get(header::RETRY_AFTER).is_none());
    assert_eq!(h.service.provider().initiate_count(), 1);
}

#[tokio::test]
async fn test_consent_before_verification_is_forbidden() {
    let (h, signer) = seeded().await;
    let (status, body, _) = send(
        &h.router,
        post(
            "/api/safeprotocol/consent/submit",
            json!({ "signerId": signer.id, "consentCategories": ["data_processing_consent"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["requiresIdentityVerification"], true);
}

#[tokio::test]
async fn test_unknown_signer_is_not_found() {
    let h = harness().await;
    let (status, body, _) = send(
        &h.router,
        post(
            "/api/safeprotocol/verify-identity/init",
            json!({ "signerId": uuid::Uuid::new_v4() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Signer not found");
}

#[tokio::test]
async fn test_validation_lists_every_bad_field() {
    let h = harness().await;
    let (status, body, _) = send(
        &h.router,
        post(
            "/api/safeprotocol/verify-identity/collect",
            json!({ "orderRef": "", "signerId": "not-a-uuid" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["orderRef", "signerId"]);
}

#[tokio::test]
async fn test_malformed_personal_number_rejected_before_provider() {
    let (h, signer) = seeded().await;
    let (status, body, _) = send(
        &h.router,
        post(
            "/api/safeprotocol/verify-identity/init",
            json!({ "signerId": signer.id, "personalNumber": "12345" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "personalNumber");
    assert_eq!(h.service.provider().initiate_count(), 0);
}

#[tokio::test]
async fn test_exhausted_gate_is_rate_limited() {
    let gate = Arc::new(BudgetGate::new(0));
    let (service, _) = make_test_service_with_gate(Arc::clone(&gate) as Arc<dyn RateLimitGate>);
    let signer = make_signer(None);
    service.store().insert_signer(signer.clone()).await.unwrap();

    let config = GatewayConfig::default();
    let rate_limit = Arc::new(RateLimitState::new(config.rate_limit.clone()));
    let router = ApiGatewayService::new(config, Arc::new(service), rate_limit)
        .unwrap()
        .router();

    let (status, _, headers) = send(
        &router,
        post(
            "/api/safeprotocol/verify-identity/init",
            json!({ "signerId": signer.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "60");
}

// =============================================================================
// CLIENT IP AND TEMPLATES
// =============================================================================

#[tokio::test]
async fn test_forwarded_ip_reaches_rate_limit_key() {
    let (h, signer) = seeded().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/safeprotocol/verify-identity/init")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "198.51.100.9, 10.0.0.1")
        .body(Body::from(json!({ "signerId": signer.id }).to_string()))
        .unwrap();

    let (status, _, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.gate.keys(), vec!["verify-init:198.51.100.9".to_string()]);
}

#[tokio::test]
async fn test_templates_by_category() {
    let h = harness().await;

    let (status, body, _) = send(&h.router, get("/api/safeprotocol/consent/templates")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["templates"].as_object().unwrap().len(), 2);

    let (status, body, _) = send(
        &h.router,
        get("/api/safeprotocol/consent/templates?category=data_processing_consent"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "data_processing_consent");
    assert!(body["text"].as_str().unwrap().contains("GDPR"));

    let (status, body, _) = send(
        &h.router,
        get("/api/safeprotocol/consent/templates?category=marketing"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "category");
}

#[tokio::test]
async fn test_templates_accept_type_parameter() {
    let h = harness().await;

    let (status, body, _) = send(
        &h.router,
        get("/api/safeprotocol/consent/templates?type=eidas_advanced_signature"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "identity_signature_consent");

    let (status, body, _) = send(
        &h.router,
        get("/api/safeprotocol/consent/templates?lang=sv"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "query");
}

#[tokio::test]
async fn test_health() {
    let h = harness().await;
    let (status, body, _) = send(&h.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
