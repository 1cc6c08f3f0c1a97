//! Integration tests for the checkout HTTP surface

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::*;
use course_checkout::api::{self, CheckoutState};
use course_checkout::database::models::PurchaseStatus;
use course_checkout::database::store::PurchaseStore;
use course_checkout::health::HealthChecker;
use course_checkout::identity::HeaderIdentityProvider;
use course_checkout::payments::types::GatewayResultCode;
use course_checkout::payments::utils::sign_hmac_sha256_hex;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const USER_HEADER: &str = "x-user-id";

fn create_test_app(h: &Harness) -> Router {
    let state = CheckoutState {
        lifecycle: h.lifecycle.clone(),
        reconciliation: h.reconciliation.clone(),
        identity: Arc::new(HeaderIdentityProvider::new(USER_HEADER)),
        gateway: h.gateway.clone(),
    };
    api::router(state).merge(api::health_router(HealthChecker::new(
        h.store.clone(),
        "memory",
        "mock",
    )))
}

fn request(method: Method, uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn initiate(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/courses/{}/purchase", COURSE_ID),
            Some(BUYER),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["purchaseId"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_create_purchase_returns_payment_url() {
    let h = harness().await;
    let app = create_test_app(&h);

    let response = app
        .oneshot(request(
            Method::POST,
            &format!("/api/courses/{}/purchase", COURSE_ID),
            Some(BUYER),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["purchaseId"].is_string());
    assert!(body["paymentUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://gateway.test/pay/"));
}

#[tokio::test]
async fn test_create_purchase_error_responses() {
    let h = harness().await;
    let app = create_test_app(&h);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/courses/{}/purchase", COURSE_ID),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "UNAUTHENTICATED");

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/courses/course_missing/purchase",
            Some(BUYER),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    initiate(&app).await;
    let response = app
        .oneshot(request(
            Method::POST,
            &format!("/api/courses/{}/purchase", COURSE_ID),
            Some(BUYER),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "CONFLICT_IN_PROGRESS");
}

#[tokio::test]
async fn test_gateway_failure_is_server_error() {
    let h = harness().await;
    h.gateway.fail_creation();
    let app = create_test_app(&h);

    let response = app
        .oneshot(request(
            Method::POST,
            &format!("/api/courses/{}/purchase", COURSE_ID),
            Some(BUYER),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.store.purchase_count(BUYER, COURSE_ID).await, 0);
}

#[tokio::test]
async fn test_payment_status_reports_reconciled_pair() {
    let h = harness().await;
    let app = create_test_app(&h);
    let purchase_id = initiate(&app).await;
    h.gateway.answer(GatewayResultCode::Success);

    let response = app
        .oneshot(request(
            Method::GET,
            &format!("/api/payments/{}", purchase_id),
            Some(BUYER),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"status": "COMPLETED", "purchase": {"status": "ACTIVE"}})
    );
}

#[tokio::test]
async fn test_payment_status_access_rules() {
    let h = harness().await;
    let app = create_test_app(&h);
    let purchase_id = initiate(&app).await;
    let uri = format!("/api/payments/{}", purchase_id);

    let response = app
        .clone()
        .oneshot(request(Method::GET, &uri, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(request(Method::GET, &uri, Some(OTHER_BUYER)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "UNAUTHORIZED");

    let response = app
        .oneshot(request(Method::GET, "/api/payments/not-a-uuid", Some(BUYER)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_then_delete_purchase() {
    let h = harness().await;
    let app = create_test_app(&h);
    let purchase_id = initiate(&app).await;
    let cancel_uri = format!(
        "/api/courses/{}/purchase/{}/cancel",
        COURSE_ID, purchase_id
    );

    let response = app
        .clone()
        .oneshot(request(Method::PATCH, &cancel_uri, Some(BUYER)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(request(Method::PATCH, &cancel_uri, Some(BUYER)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "INVALID_STATE");

    let response = app
        .oneshot(request(
            Method::DELETE,
            &format!("/api/courses/{}/purchase/{}", COURSE_ID, purchase_id),
            Some(BUYER),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.store.purchase_count(BUYER, COURSE_ID).await, 0);
}

#[tokio::test]
async fn test_delete_active_purchase_is_rejected() {
    let h = harness().await;
    let app = create_test_app(&h);
    let purchase_id = initiate(&app).await;
    h.gateway.answer(GatewayResultCode::Success);
    app.clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/payments/{}", purchase_id),
            Some(BUYER),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(request(
            Method::DELETE,
            &format!("/api/courses/{}/purchase/{}", COURSE_ID, purchase_id),
            Some(BUYER),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.store.purchase_count(BUYER, COURSE_ID).await, 1);
}

#[tokio::test]
async fn test_gateway_return_redirects_to_status_page() {
    let h = harness().await;
    let app = create_test_app(&h);

    for path in ["/api/payment/redirect", "/api/payment/status"] {
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("{}?purchaseId=p_1&courseId={}", path, COURSE_ID),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            format!(
                "/courses/{}/payment-status?purchaseId=p_1&courseId={}",
                COURSE_ID, COURSE_ID
            )
            .as_str()
        );
    }

    let response = app
        .oneshot(request(
            Method::POST,
            "/api/payment/redirect?purchaseId=p_1",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

fn callback_request(body: &Value, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/paytabs")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_signed_callback_settles_purchase() {
    let h = harness().await;
    let app = create_test_app(&h);
    let purchase_id = initiate(&app).await;
    let reference = reference_for(&h.gateway.last_request().unwrap());

    let payload = json!({
        "tran_ref": reference,
        "cart_id": purchase_id,
        "payment_result": {"response_status": "A", "response_message": "Authorised"}
    });
    let signature = sign_hmac_sha256_hex(payload.to_string().as_bytes(), CALLBACK_SECRET).unwrap();

    let response = app
        .clone()
        .oneshot(callback_request(&payload, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // status read without asking the gateway again
    let response = app
        .oneshot(request(
            Method::GET,
            &format!("/api/payments/{}", purchase_id),
            Some(BUYER),
        ))
        .await
        .unwrap();
    assert_eq!(
        json_body(response).await,
        json!({"status": "COMPLETED", "purchase": {"status": "ACTIVE"}})
    );
    assert_eq!(h.gateway.verify_calls(), 0);
}

#[tokio::test]
async fn test_callback_signature_is_required() {
    let h = harness().await;
    let app = create_test_app(&h);
    let purchase_id = initiate(&app).await;
    let payload = json!({
        "tran_ref": reference_for(&h.gateway.last_request().unwrap()),
        "payment_result": {"response_status": "A"}
    });

    let response = app
        .clone()
        .oneshot(callback_request(&payload, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(callback_request(&payload, Some("deadbeef")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let record = h
        .store
        .find_purchase(purchase_id.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.purchase.status, PurchaseStatus::Pending);
}

#[tokio::test]
async fn test_callback_for_unknown_transaction_is_acknowledged() {
    let h = harness().await;
    let app = create_test_app(&h);
    let payload = json!({
        "tran_ref": "TST_UNKNOWN",
        "payment_result": {"response_status": "A"}
    });
    let signature = sign_hmac_sha256_hex(payload.to_string().as_bytes(), CALLBACK_SECRET).unwrap();

    let response = app
        .oneshot(callback_request(&payload, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = harness().await;
    let app = create_test_app(&h);

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(Method::GET, "/health/live", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
