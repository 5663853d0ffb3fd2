//! Integration tests for the HTTP surface.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use crm_payment_relay::api::{MAX_BODY_BYTES, create_router};
use crm_payment_relay::app::{AppState, PipelineConfig};
use crm_payment_relay::domain::{Money, WebhookResponse};
use crm_payment_relay::test_utils::fixtures::{self, PAYMENT_ID};
use crm_payment_relay::test_utils::{MockCrmGateway, MockJournal};

const WEBHOOK_BODY: &str = "event=ONSALEPAYMENTPAID&data%5BFIELDS%5D%5BID%5D=42&ts=1714550000";

fn create_test_state(gateway: Arc<MockCrmGateway>, journal: Arc<MockJournal>) -> Arc<AppState> {
    Arc::new(AppState::new(gateway, journal, &PipelineConfig::default()))
}

fn webhook_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body.into())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_webhook_records_payment() {
    let gateway = Arc::new(fixtures::resolvable_gateway(Money::from_minor(150_000), Utc::now()));
    let journal = Arc::new(MockJournal::new());
    let router = create_router(create_test_state(gateway.clone(), journal.clone()));

    let response = router.oneshot(webhook_request(WEBHOOK_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["already_exists"], false);
    assert_eq!(json["payment_id"], PAYMENT_ID);
    assert_eq!(json["amount"], "1500.00");
    assert_eq!(json["balance_new"], "1500.00");

    assert_eq!(journal.payloads(), vec![WEBHOOK_BODY.to_string()]);
    let outcomes = journal.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], WebhookResponse::Recorded(_)));
    assert_eq!(gateway.transactions().len(), 1);
}

#[tokio::test]
async fn test_repeated_webhook_reports_existing_transaction() {
    let gateway = Arc::new(fixtures::resolvable_gateway(Money::from_minor(150_000), Utc::now()));
    let router = create_router(create_test_state(gateway.clone(), Arc::new(MockJournal::new())));

    router.clone().oneshot(webhook_request(WEBHOOK_BODY)).await.unwrap();
    let response = router.oneshot(webhook_request(WEBHOOK_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["already_exists"], true);
    assert_eq!(gateway.transactions().len(), 1);
}

#[tokio::test]
async fn test_webhook_without_payment_id() {
    let journal = Arc::new(MockJournal::new());
    let router = create_router(create_test_state(Arc::new(MockCrmGateway::new()), journal.clone()));

    let response = router
        .oneshot(webhook_request("event=ONSALEPAYMENTPAID"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["step"], "parse_webhook");
    assert_eq!(json["error_kind"], "validation_error");
    assert_eq!(journal.outcomes().len(), 1);
}

#[tokio::test]
async fn test_unknown_payment_is_logical_failure() {
    let router = create_router(create_test_state(
        Arc::new(MockCrmGateway::new()),
        Arc::new(MockJournal::new()),
    ));

    let response = router.oneshot(webhook_request(WEBHOOK_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["step"], "get_payment");
    assert_eq!(json["error_kind"], "not_found");
}

#[tokio::test]
async fn test_journal_failure_does_not_block_processing() {
    let gateway = Arc::new(fixtures::resolvable_gateway(Money::from_minor(100), Utc::now()));
    let router = create_router(create_test_state(gateway.clone(), Arc::new(MockJournal::failing())));

    let response = router.oneshot(webhook_request(WEBHOOK_BODY)).await.unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(gateway.transactions().len(), 1);
}

#[tokio::test]
async fn test_oversized_body_gets_json_failure() {
    let gateway = Arc::new(MockCrmGateway::new());
    let journal = Arc::new(MockJournal::new());
    let router = create_router(create_test_state(gateway.clone(), journal.clone()));

    let body = vec![b'a'; MAX_BODY_BYTES + 1];
    let response = router.oneshot(webhook_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["step"], "parse_webhook");
    assert_eq!(json["error_kind"], "validation_error");
    assert_eq!(journal.outcomes().len(), 1);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_health_reports_crm_status() {
    let gateway = Arc::new(MockCrmGateway::new());
    let router = create_router(create_test_state(gateway.clone(), Arc::new(MockJournal::new())));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["crm"], "healthy");

    gateway.set_healthy(false);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let json = json_body(router.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(json["crm"], "unhealthy");

    let request = Request::builder().uri("/health/ready").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_liveness_and_openapi() {
    let router = create_router(create_test_state(
        Arc::new(MockCrmGateway::new()),
        Arc::new(MockJournal::new()),
    ));

    let request = Request::builder().uri("/health/live").body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"]["/webhook"]["post"].is_object());
}
