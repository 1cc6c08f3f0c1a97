//! Shared fixtures: an in-memory store seeded with a course and buyers, and a
//! scriptable gateway.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use course_checkout::config::CheckoutConfig;
use course_checkout::database::memory::MemoryPurchaseStore;
use course_checkout::database::error::DatabaseError;
use course_checkout::database::models::{
    Course, NewPayment, Payment, PaymentStatus, Purchase, PurchaseRecord, PurchaseStatus,
    StatusTransition, User,
};
use course_checkout::database::store::PurchaseStore;
use course_checkout::payments::error::{GatewayError, GatewayResult};
use course_checkout::payments::gateway::PaymentGateway;
use course_checkout::payments::paytabs::result_code;
use course_checkout::payments::types::{
    CallbackEvent, CallbackVerification, CreateTransactionRequest, GatewayResultCode,
    HostedTransaction,
};
use course_checkout::payments::utils::verify_hmac_sha256_hex;
use course_checkout::services::{PaymentReconciliationService, PurchaseLifecycleService};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const COURSE_ID: &str = "course_rust_101";
pub const DRAFT_COURSE_ID: &str = "course_draft";
pub const BUYER: &str = "user_buyer";
pub const OTHER_BUYER: &str = "user_other";
pub const NO_EMAIL_BUYER: &str = "user_no_email";
pub const CALLBACK_SECRET: &str = "test_server_key";

pub struct MockGateway {
    create_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    fail_create: Mutex<bool>,
    verify_result: Mutex<GatewayResult<GatewayResultCode>>,
    last_request: Mutex<Option<CreateTransactionRequest>>,
    fixed_reference: Mutex<Option<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            create_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            fail_create: Mutex::new(false),
            verify_result: Mutex::new(Ok(GatewayResultCode::Unrecognized("H".to_string()))),
            last_request: Mutex::new(None),
            fixed_reference: Mutex::new(None),
        }
    }

    /// Hand out the same transaction reference for every new transaction
    pub fn reuse_reference(&self, reference: &str) {
        *self.fixed_reference.lock().unwrap() = Some(reference.to_string());
    }

    pub fn fail_creation(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    pub fn answer(&self, result: GatewayResultCode) {
        *self.verify_result.lock().unwrap() = Ok(result);
    }

    pub fn answer_error(&self) {
        *self.verify_result.lock().unwrap() = Err(GatewayError::Network {
            message: "connection reset".to_string(),
        });
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CreateTransactionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

pub fn reference_for(request: &CreateTransactionRequest) -> String {
    format!("TST{}", request.cart_id.simple())
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> GatewayResult<HostedTransaction> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if *self.fail_create.lock().unwrap() {
            return Err(GatewayError::Provider {
                gateway: "mock".to_string(),
                message: "Profile is not active".to_string(),
                provider_code: Some("206".to_string()),
                retryable: false,
            });
        }

        let transaction_reference = self
            .fixed_reference
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| reference_for(&request));
        Ok(HostedTransaction {
            transaction_reference,
            redirect_url: format!("https://gateway.test/pay/{}", request.cart_id),
        })
    }

    async fn verify_transaction(
        &self,
        _transaction_reference: &str,
    ) -> GatewayResult<GatewayResultCode> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verify_result.lock().unwrap().clone()
    }

    fn verify_callback(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> GatewayResult<CallbackVerification> {
        let valid = verify_hmac_sha256_hex(payload, CALLBACK_SECRET, signature);
        Ok(CallbackVerification {
            valid,
            reason: (!valid).then(|| "signature mismatch".to_string()),
        })
    }

    fn parse_callback(&self, payload: &[u8]) -> GatewayResult<CallbackEvent> {
        let body: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| GatewayError::InvalidResponse {
                message: e.to_string(),
            })?;
        let transaction_reference = body["tran_ref"]
            .as_str()
            .ok_or(GatewayError::InvalidResponse {
                message: "missing tran_ref".to_string(),
            })?
            .to_string();
        let status = body["payment_result"]["response_status"]
            .as_str()
            .unwrap_or("");

        Ok(CallbackEvent {
            transaction_reference,
            cart_id: body["cart_id"].as_str().map(str::to_string),
            result: result_code(status),
            payload: body.clone(),
            received_at: Utc::now().to_rfc3339(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub async fn seeded_store() -> Arc<MemoryPurchaseStore> {
    let store = MemoryPurchaseStore::new();
    store
        .insert_course(Course {
            id: COURSE_ID.to_string(),
            title: "Practical Rust".to_string(),
            price: Some(BigDecimal::from_str("49.99").unwrap()),
            is_published: true,
        })
        .await;
    store
        .insert_course(Course {
            id: DRAFT_COURSE_ID.to_string(),
            title: "Unreleased".to_string(),
            price: Some(BigDecimal::from(10)),
            is_published: false,
        })
        .await;
    for (id, email) in [
        (BUYER, Some("buyer@example.com")),
        (OTHER_BUYER, Some("other@example.com")),
        (NO_EMAIL_BUYER, None),
    ] {
        store
            .insert_user(User {
                id: id.to_string(),
                name: Some("Test Buyer".to_string()),
                email: email.map(str::to_string),
            })
            .await;
    }
    Arc::new(store)
}

pub fn checkout_config(pending_expiry: Duration) -> CheckoutConfig {
    CheckoutConfig {
        app_base_url: "https://learn.example.com".to_string(),
        pending_expiry,
        ..CheckoutConfig::default()
    }
}

pub struct Harness {
    pub store: Arc<MemoryPurchaseStore>,
    pub gateway: Arc<MockGateway>,
    pub lifecycle: Arc<PurchaseLifecycleService>,
    pub reconciliation: Arc<PaymentReconciliationService>,
}

pub async fn harness_with_expiry(pending_expiry: Duration) -> Harness {
    let store = seeded_store().await;
    let gateway = Arc::new(MockGateway::new());
    let lifecycle = Arc::new(PurchaseLifecycleService::new(
        store.clone(),
        gateway.clone(),
        checkout_config(pending_expiry),
    ));
    let reconciliation = Arc::new(PaymentReconciliationService::new(
        store.clone(),
        gateway.clone(),
    ));
    Harness {
        store,
        gateway,
        lifecycle,
        reconciliation,
    }
}

pub async fn harness() -> Harness {
    harness_with_expiry(Duration::from_secs(30 * 60)).await
}

/// Memory store that lets a settlement land between a read and the write
/// that follows it: once armed, the next read of the armed purchase is
/// followed by its activation.
pub struct RacingStore {
    inner: Arc<MemoryPurchaseStore>,
    activate_after_read: Mutex<Option<Uuid>>,
}

impl RacingStore {
    pub fn new(inner: Arc<MemoryPurchaseStore>) -> Self {
        Self {
            inner,
            activate_after_read: Mutex::new(None),
        }
    }

    pub fn activate_after_next_read(&self, purchase_id: Uuid) {
        *self.activate_after_read.lock().unwrap() = Some(purchase_id);
    }

    async fn after_read(
        &self,
        found: Option<PurchaseRecord>,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let armed = *self.activate_after_read.lock().unwrap();
        if let (Some(armed), Some(record)) = (armed, found.as_ref()) {
            if record.purchase.id == armed {
                self.activate_after_read.lock().unwrap().take();
                self.inner
                    .apply_transition(&StatusTransition {
                        purchase_id: armed,
                        payment_id: record.payment.as_ref().map(|p| p.id),
                        expected: None,
                        payment_status: PaymentStatus::Completed,
                        purchase_status: PurchaseStatus::Active,
                    })
                    .await?;
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl PurchaseStore for RacingStore {
    async fn find_published_course(
        &self,
        course_id: &str,
    ) -> Result<Option<Course>, DatabaseError> {
        self.inner.find_published_course(course_id).await
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        self.inner.find_user(user_id).await
    }

    async fn find_purchase(
        &self,
        purchase_id: Uuid,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let found = self.inner.find_purchase(purchase_id).await?;
        self.after_read(found).await
    }

    async fn find_purchase_for(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        let found = self.inner.find_purchase_for(user_id, course_id).await?;
        self.after_read(found).await
    }

    async fn find_purchase_by_reference(
        &self,
        transaction_reference: &str,
    ) -> Result<Option<PurchaseRecord>, DatabaseError> {
        self.inner
            .find_purchase_by_reference(transaction_reference)
            .await
    }

    async fn create_purchase(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Purchase, DatabaseError> {
        self.inner.create_purchase(user_id, course_id).await
    }

    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        self.inner.create_payment(payment).await
    }

    async fn delete_purchase(
        &self,
        purchase_id: Uuid,
        deletable: &[PurchaseStatus],
    ) -> Result<bool, DatabaseError> {
        self.inner.delete_purchase(purchase_id, deletable).await
    }

    async fn apply_transition(
        &self,
        transition: &StatusTransition,
    ) -> Result<bool, DatabaseError> {
        self.inner.apply_transition(transition).await
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.inner.ping().await
    }
}

/// Services wired over a `RacingStore`; `store` is the memory store beneath it
pub struct RacingHarness {
    pub store: Arc<MemoryPurchaseStore>,
    pub racing: Arc<RacingStore>,
    pub gateway: Arc<MockGateway>,
    pub lifecycle: Arc<PurchaseLifecycleService>,
    pub reconciliation: Arc<PaymentReconciliationService>,
}

pub async fn racing_harness() -> RacingHarness {
    let store = seeded_store().await;
    let racing = Arc::new(RacingStore::new(store.clone()));
    let gateway = Arc::new(MockGateway::new());
    let lifecycle = Arc::new(PurchaseLifecycleService::new(
        racing.clone(),
        gateway.clone(),
        checkout_config(Duration::from_secs(30 * 60)),
    ));
    let reconciliation = Arc::new(PaymentReconciliationService::new(
        racing.clone(),
        gateway.clone(),
    ));
    RacingHarness {
        store,
        racing,
        gateway,
        lifecycle,
        reconciliation,
    }
}
