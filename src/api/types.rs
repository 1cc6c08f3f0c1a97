//! Shared handler state and wire types for the checkout API

use crate::database::models::{PaymentStatus, PurchaseStatus};
use crate::error::AppError;
use crate::identity::{CallerId, IdentityProvider};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::gateway::PaymentGateway;
use crate::services::{PaymentReconciliationService, PurchaseLifecycleService, StatusPair};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct CheckoutState {
    pub lifecycle: Arc<PurchaseLifecycleService>,
    pub reconciliation: Arc<PaymentReconciliationService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutState {
    pub fn caller(&self, headers: &HeaderMap) -> Option<CallerId> {
        self.identity.resolve_caller(headers)
    }
}

/// Attach the request id assigned by the request-id layer, if any
pub fn tag_request(err: AppError, headers: &HeaderMap) -> AppError {
    match get_request_id_from_headers(headers) {
        Some(request_id) => err.with_request_id(request_id),
        None => err,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseStatusBody {
    pub status: PurchaseStatus,
}

/// Body of `GET /api/payments/{purchaseId}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentStatusResponse {
    pub status: PaymentStatus,
    pub purchase: PurchaseStatusBody,
}

impl From<StatusPair> for PaymentStatusResponse {
    fn from(pair: StatusPair) -> Self {
        Self {
            status: pair.payment_status,
            purchase: PurchaseStatusBody {
                status: pair.purchase_status,
            },
        }
    }
}

/// Query string the gateway appends when returning the buyer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnParams {
    pub purchase_id: Option<String>,
    pub course_id: Option<String>,
}
