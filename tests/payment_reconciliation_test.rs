//! Integration tests for payment reconciliation, cancellation and deletion

mod common;

use common::*;
use course_checkout::database::models::{PaymentStatus, PurchaseStatus};
use course_checkout::database::store::PurchaseStore;
use course_checkout::error::AppErrorKind;
use course_checkout::identity::CallerId;
use course_checkout::payments::types::GatewayResultCode;
use course_checkout::services::StatusPair;
use uuid::Uuid;

fn buyer() -> CallerId {
    CallerId::new(BUYER)
}

async fn pending_purchase(h: &Harness) -> Uuid {
    h.lifecycle
        .initiate(Some(&buyer()), COURSE_ID)
        .await
        .unwrap()
        .purchase_id
}

#[tokio::test]
async fn test_success_activates_purchase() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    h.gateway.answer(GatewayResultCode::Success);

    let pair = h
        .reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    assert_eq!(
        pair,
        StatusPair::new(PaymentStatus::Completed, PurchaseStatus::Active)
    );
    let record = h.store.find_purchase(purchase_id).await.unwrap().unwrap();
    assert_eq!(record.purchase.status, PurchaseStatus::Active);
    assert_eq!(record.payment.unwrap().status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_reconcile_is_idempotent_after_success() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    h.gateway.answer(GatewayResultCode::Success);

    let first = h
        .reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();
    // a late, contradicting answer must not undo a completed payment
    h.gateway.answer(GatewayResultCode::Declined);
    let second = h
        .reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.gateway.verify_calls(), 1);
}

#[tokio::test]
async fn test_failure_codes_fail_the_purchase() {
    for (code, payment_status) in [
        (GatewayResultCode::Declined, PaymentStatus::Failed),
        (GatewayResultCode::Error, PaymentStatus::Failed),
        (GatewayResultCode::Expired, PaymentStatus::Failed),
        (GatewayResultCode::Canceled, PaymentStatus::Canceled),
    ] {
        let h = harness().await;
        let purchase_id = pending_purchase(&h).await;
        h.gateway.answer(code);

        let pair = h
            .reconciliation
            .reconcile(Some(&buyer()), purchase_id)
            .await
            .unwrap();

        assert_eq!(
            pair,
            StatusPair::new(payment_status, PurchaseStatus::Failed)
        );
    }
}

#[tokio::test]
async fn test_unrecognized_code_leaves_status_unchanged() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    h.gateway
        .answer(GatewayResultCode::Unrecognized("H".to_string()));

    let pair = h
        .reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    assert_eq!(
        pair,
        StatusPair::new(PaymentStatus::Pending, PurchaseStatus::Pending)
    );
}

#[tokio::test]
async fn test_gateway_error_returns_stored_status() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    h.gateway.answer_error();

    let pair = h
        .reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    assert_eq!(
        pair,
        StatusPair::new(PaymentStatus::Pending, PurchaseStatus::Pending)
    );
    let record = h.store.find_purchase(purchase_id).await.unwrap().unwrap();
    assert_eq!(record.purchase.status, PurchaseStatus::Pending);
}

#[tokio::test]
async fn test_reconcile_checks_caller_and_ownership() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;

    let err = h
        .reconciliation
        .reconcile(None, purchase_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, AppErrorKind::Unauthenticated);

    let err = h
        .reconciliation
        .reconcile(Some(&buyer()), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err.kind, AppErrorKind::NotFound { .. }));

    let err = h
        .reconciliation
        .reconcile(Some(&CallerId::new(OTHER_BUYER)), purchase_id)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, AppErrorKind::Unauthorized { .. }));
    assert_eq!(err.status_code(), 401);
    assert_eq!(h.gateway.verify_calls(), 0);
}

#[tokio::test]
async fn test_callback_result_applies_by_reference() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    let reference = reference_for(&h.gateway.last_request().unwrap());

    let pair = h
        .reconciliation
        .apply_gateway_result(&reference, &GatewayResultCode::Success)
        .await
        .unwrap();

    assert_eq!(
        pair,
        Some(StatusPair::new(
            PaymentStatus::Completed,
            PurchaseStatus::Active
        ))
    );
    let record = h.store.find_purchase(purchase_id).await.unwrap().unwrap();
    assert_eq!(record.purchase.status, PurchaseStatus::Active);

    let unknown = h
        .reconciliation
        .apply_gateway_result("TST_UNKNOWN", &GatewayResultCode::Success)
        .await
        .unwrap();
    assert!(unknown.is_none());
}

#[tokio::test]
async fn test_cancel_pending_fails_the_purchase() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;

    let pair = h
        .reconciliation
        .cancel_pending(Some(&buyer()), COURSE_ID, purchase_id)
        .await
        .unwrap();

    assert_eq!(
        pair,
        StatusPair::new(PaymentStatus::Canceled, PurchaseStatus::Failed)
    );
    assert_eq!(h.gateway.verify_calls(), 0);

    let err = h
        .reconciliation
        .cancel_pending(Some(&buyer()), COURSE_ID, purchase_id)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, AppErrorKind::InvalidState { .. }));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_cancel_requires_matching_owner_and_course() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;

    let err = h
        .reconciliation
        .cancel_pending(Some(&CallerId::new(OTHER_BUYER)), COURSE_ID, purchase_id)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, AppErrorKind::NotFound { .. }));

    let err = h
        .reconciliation
        .cancel_pending(Some(&buyer()), DRAFT_COURSE_ID, purchase_id)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, AppErrorKind::NotFound { .. }));

    let record = h.store.find_purchase(purchase_id).await.unwrap().unwrap();
    assert_eq!(record.purchase.status, PurchaseStatus::Pending);
}

#[tokio::test]
async fn test_delete_terminal_refuses_active_purchase() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    h.gateway.answer(GatewayResultCode::Success);
    h.reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    let err = h
        .reconciliation
        .delete_terminal(Some(&buyer()), COURSE_ID, purchase_id)
        .await
        .unwrap_err();

    assert!(matches!(err.kind, AppErrorKind::InvalidState { .. }));
    let record = h.store.find_purchase(purchase_id).await.unwrap().unwrap();
    assert_eq!(record.purchase.status, PurchaseStatus::Active);
    assert_eq!(record.payment.unwrap().status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_delete_terminal_removes_failed_purchase_and_payment() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    h.gateway.answer(GatewayResultCode::Declined);
    h.reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    h.reconciliation
        .delete_terminal(Some(&buyer()), COURSE_ID, purchase_id)
        .await
        .unwrap();

    assert!(h.store.find_purchase(purchase_id).await.unwrap().is_none());
    assert_eq!(h.store.payment_count().await, 0);

    let err = h
        .reconciliation
        .delete_terminal(Some(&buyer()), COURSE_ID, purchase_id)
        .await
        .unwrap_err();
    assert!(matches!(err.kind, AppErrorKind::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_terminal_keeps_purchase_activated_meanwhile() {
    let h = racing_harness().await;
    let purchase_id = h
        .lifecycle
        .initiate(Some(&buyer()), COURSE_ID)
        .await
        .unwrap()
        .purchase_id;
    h.gateway.answer(GatewayResultCode::Declined);
    h.reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    h.racing.activate_after_next_read(purchase_id);
    let err = h
        .reconciliation
        .delete_terminal(Some(&buyer()), COURSE_ID, purchase_id)
        .await
        .unwrap_err();

    assert!(matches!(err.kind, AppErrorKind::InvalidState { .. }));
    let record = h.store.find_purchase(purchase_id).await.unwrap().unwrap();
    assert_eq!(record.purchase.status, PurchaseStatus::Active);
    assert_eq!(h.store.payment_count().await, 1);
}

#[tokio::test]
async fn test_late_decline_does_not_overwrite_cancellation() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    h.reconciliation
        .cancel_pending(Some(&buyer()), COURSE_ID, purchase_id)
        .await
        .unwrap();
    h.gateway.answer(GatewayResultCode::Declined);

    let pair = h
        .reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    assert_eq!(
        pair,
        StatusPair::new(PaymentStatus::Canceled, PurchaseStatus::Failed)
    );
    let record = h.store.find_purchase(purchase_id).await.unwrap().unwrap();
    assert_eq!(record.payment.unwrap().status, PaymentStatus::Canceled);
}

#[tokio::test]
async fn test_failed_payment_only_moves_on_to_success() {
    let h = harness().await;
    let purchase_id = pending_purchase(&h).await;
    h.gateway.answer(GatewayResultCode::Declined);
    h.reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();

    h.gateway.answer(GatewayResultCode::Canceled);
    let pair = h
        .reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();
    assert_eq!(
        pair,
        StatusPair::new(PaymentStatus::Failed, PurchaseStatus::Failed)
    );

    h.gateway.answer(GatewayResultCode::Success);
    let pair = h
        .reconciliation
        .reconcile(Some(&buyer()), purchase_id)
        .await
        .unwrap();
    assert_eq!(
        pair,
        StatusPair::new(PaymentStatus::Completed, PurchaseStatus::Active)
    );
}
