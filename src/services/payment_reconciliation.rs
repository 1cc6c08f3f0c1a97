//! Payment Reconciliation Service
//!
//! Owns every status change of a purchase after initiation. Gateway results
//! (polled or pushed via callback) and buyer-driven cancellation all go
//! through the same lock-step transition so a purchase and its payment can
//! never disagree.

use crate::database::models::{
    Payment, PaymentStatus, PurchaseRecord, PurchaseStatus, StatusTransition,
};
use crate::database::store::{owned_by, PurchaseStore};
use crate::error::{AppError, AppErrorKind, AppResult};
use crate::identity::CallerId;
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::GatewayResultCode;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Payment and purchase status as one consistent pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusPair {
    pub payment_status: PaymentStatus,
    pub purchase_status: PurchaseStatus,
}

impl StatusPair {
    pub fn new(payment_status: PaymentStatus, purchase_status: PurchaseStatus) -> Self {
        Self {
            payment_status,
            purchase_status,
        }
    }

    fn stored(purchase: &PurchaseRecord, payment: &Payment) -> Self {
        Self::new(payment.status, purchase.purchase.status)
    }
}

/// Statuses a gateway result moves a purchase to. `None` leaves it untouched.
pub fn target_statuses(result: &GatewayResultCode) -> Option<StatusPair> {
    match result {
        GatewayResultCode::Success => Some(StatusPair::new(
            PaymentStatus::Completed,
            PurchaseStatus::Active,
        )),
        GatewayResultCode::Declined | GatewayResultCode::Error | GatewayResultCode::Expired => {
            Some(StatusPair::new(PaymentStatus::Failed, PurchaseStatus::Failed))
        }
        GatewayResultCode::Canceled => Some(StatusPair::new(
            PaymentStatus::Canceled,
            PurchaseStatus::Failed,
        )),
        GatewayResultCode::Unrecognized(_) => None,
    }
}

pub struct PaymentReconciliationService {
    store: Arc<dyn PurchaseStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentReconciliationService {
    pub fn new(store: Arc<dyn PurchaseStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Bring the stored status in line with the gateway and return the latest pair.
    ///
    /// Safe to call any number of times. Gateway failures never change state.
    pub async fn reconcile(
        &self,
        caller: Option<&CallerId>,
        purchase_id: Uuid,
    ) -> AppResult<StatusPair> {
        let caller = caller.ok_or_else(AppError::unauthenticated)?;

        let record = self
            .store
            .find_purchase(purchase_id)
            .await?
            .ok_or_else(|| AppError::not_found("Purchase", purchase_id.to_string()))?;

        if record.purchase.user_id != caller.as_str() {
            warn!(
                purchase_id = %purchase_id,
                user_id = %caller,
                "Status check for a purchase owned by another user"
            );
            return Err(AppError::new(AppErrorKind::Unauthorized {
                purchase_id: purchase_id.to_string(),
            }));
        }

        let payment = record
            .payment
            .clone()
            .ok_or_else(|| AppError::not_found("Payment", purchase_id.to_string()))?;
        let stored = StatusPair::stored(&record, &payment);

        if payment.status == PaymentStatus::Completed {
            return Ok(stored);
        }

        let result = match self
            .gateway
            .verify_transaction(&payment.transaction_reference)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    purchase_id = %purchase_id,
                    transaction_reference = %payment.transaction_reference,
                    error = %e,
                    "Gateway verification failed, returning stored status"
                );
                return Ok(stored);
            }
        };

        self.apply_result(&record, &payment, &result).await
    }

    /// Apply a result pushed by the gateway. Returns `None` for an unknown reference.
    pub async fn apply_gateway_result(
        &self,
        transaction_reference: &str,
        result: &GatewayResultCode,
    ) -> AppResult<Option<StatusPair>> {
        let record = match self
            .store
            .find_purchase_by_reference(transaction_reference)
            .await?
        {
            Some(record) => record,
            None => return Ok(None),
        };
        let payment = match record.payment.clone() {
            Some(payment) => payment,
            None => return Ok(None),
        };

        self.apply_result(&record, &payment, result).await.map(Some)
    }

    /// Buyer-side abandonment: PENDING becomes CANCELED/FAILED without asking the gateway
    pub async fn cancel_pending(
        &self,
        caller: Option<&CallerId>,
        course_id: &str,
        purchase_id: Uuid,
    ) -> AppResult<StatusPair> {
        let record = self.owned_purchase(caller, course_id, purchase_id).await?;

        if record.purchase.status != PurchaseStatus::Pending {
            return Err(invalid_state(purchase_id, record.purchase.status, "cancel"));
        }

        let transition = StatusTransition {
            purchase_id,
            payment_id: record.payment.as_ref().map(|p| p.id),
            expected: Some(PurchaseStatus::Pending),
            payment_status: PaymentStatus::Canceled,
            purchase_status: PurchaseStatus::Failed,
        };

        if !self.store.apply_transition(&transition).await? {
            // Resolved by a concurrent reconciliation
            let current = self
                .store
                .find_purchase(purchase_id)
                .await?
                .map(|r| r.purchase.status)
                .ok_or_else(|| AppError::not_found("Purchase", purchase_id.to_string()))?;
            return Err(invalid_state(purchase_id, current, "cancel"));
        }

        info!(purchase_id = %purchase_id, course_id = %course_id, "Pending purchase canceled");
        Ok(StatusPair::new(
            PaymentStatus::Canceled,
            PurchaseStatus::Failed,
        ))
    }

    /// Remove a PENDING or FAILED purchase together with its payment
    pub async fn delete_terminal(
        &self,
        caller: Option<&CallerId>,
        course_id: &str,
        purchase_id: Uuid,
    ) -> AppResult<()> {
        let record = self.owned_purchase(caller, course_id, purchase_id).await?;

        if record.purchase.status == PurchaseStatus::Active {
            return Err(invalid_state(purchase_id, record.purchase.status, "delete"));
        }

        let deletable = [PurchaseStatus::Pending, PurchaseStatus::Failed];
        if !self.store.delete_purchase(purchase_id, &deletable).await? {
            // changed underneath us
            return Err(match self.store.find_purchase(purchase_id).await? {
                Some(current) => invalid_state(purchase_id, current.purchase.status, "delete"),
                None => AppError::not_found("Purchase", purchase_id.to_string()),
            });
        }

        info!(
            purchase_id = %purchase_id,
            course_id = %course_id,
            status = %record.purchase.status,
            "Purchase deleted"
        );
        Ok(())
    }

    async fn owned_purchase(
        &self,
        caller: Option<&CallerId>,
        course_id: &str,
        purchase_id: Uuid,
    ) -> AppResult<PurchaseRecord> {
        let caller = caller.ok_or_else(AppError::unauthenticated)?;

        self.store
            .find_purchase(purchase_id)
            .await?
            .filter(|record| owned_by(record, caller.as_str(), course_id))
            .ok_or_else(|| AppError::not_found("Purchase", purchase_id.to_string()))
    }

    /// The single write path for gateway-driven status changes
    async fn apply_result(
        &self,
        record: &PurchaseRecord,
        payment: &Payment,
        result: &GatewayResultCode,
    ) -> AppResult<StatusPair> {
        let purchase_id = record.purchase.id;
        let stored = StatusPair::stored(record, payment);

        let target = match target_statuses(result) {
            Some(target) => target,
            None => {
                debug!(
                    purchase_id = %purchase_id,
                    result = %result,
                    "Unrecognized gateway result, status unchanged"
                );
                return Ok(stored);
            }
        };

        // A settled payment only moves on to COMPLETED, and never away from it
        let settled = stored.payment_status.is_terminal()
            && target.payment_status != PaymentStatus::Completed;
        if target == stored || stored.payment_status == PaymentStatus::Completed || settled {
            return Ok(stored);
        }

        let transition = StatusTransition {
            purchase_id,
            payment_id: Some(payment.id),
            expected: Some(stored.purchase_status),
            payment_status: target.payment_status,
            purchase_status: target.purchase_status,
        };

        if self.store.apply_transition(&transition).await? {
            info!(
                purchase_id = %purchase_id,
                payment_status = %target.payment_status,
                purchase_status = %target.purchase_status,
                "Purchase reconciled"
            );
            return Ok(target);
        }

        // Lost a race; report whatever won
        let latest = self
            .store
            .find_purchase(purchase_id)
            .await?
            .ok_or_else(|| AppError::not_found("Purchase", purchase_id.to_string()))?;
        Ok(match latest.payment.as_ref() {
            Some(payment) => StatusPair::stored(&latest, payment),
            None => StatusPair::new(payment.status, latest.purchase.status),
        })
    }
}

fn invalid_state(purchase_id: Uuid, status: PurchaseStatus, operation: &str) -> AppError {
    AppError::new(AppErrorKind::InvalidState {
        purchase_id: purchase_id.to_string(),
        status: status.to_string(),
        operation: operation.to_string(),
    })
}
