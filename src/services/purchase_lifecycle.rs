//! Purchase Lifecycle Service
//!
//! Turns a buyer's intent into a PENDING purchase with a hosted gateway
//! transaction: eligibility checks, stale-attempt replacement, the gateway
//! handoff, and a compensating delete when the handoff fails.

use crate::config::CheckoutConfig;
use crate::database::models::{
    Course, NewPayment, Purchase, PurchaseRecord, PurchaseStatus, User,
};
use crate::database::store::PurchaseStore;
use crate::error::{AppError, AppErrorKind, AppResult};
use crate::identity::CallerId;
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{CreateTransactionRequest, CustomerDetails};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const DEFAULT_CUSTOMER_NAME: &str = "Customer";

/// Result of a successful initiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedPurchase {
    pub purchase_id: Uuid,
    pub payment_url: String,
}

pub struct PurchaseLifecycleService {
    store: Arc<dyn PurchaseStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: CheckoutConfig,
}

impl PurchaseLifecycleService {
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Start a checkout for `course_id` on behalf of the caller
    pub async fn initiate(
        &self,
        caller: Option<&CallerId>,
        course_id: &str,
    ) -> AppResult<InitiatedPurchase> {
        // 1. Caller must be known
        let caller = caller.ok_or_else(AppError::unauthenticated)?;
        let user_id = caller.as_str();

        info!(user_id = %user_id, course_id = %course_id, "Purchase attempt");

        // 2. Course must exist and be published
        let course = self
            .store
            .find_published_course(course_id)
            .await?
            .ok_or_else(|| {
                warn!(course_id = %course_id, "Course not found or not published");
                AppError::not_found("Course", course_id)
            })?;

        // 3. Resolve any earlier attempt for the same course
        if let Some(existing) = self.store.find_purchase_for(user_id, course_id).await? {
            if let Some(stale) = self.replaceable_attempt(existing)? {
                self.remove_stale(&stale, user_id, course_id).await?;
            }
        }

        // 4. Gateway needs a contact email
        let user = self
            .store
            .find_user(user_id)
            .await?
            .filter(|u| u.email.as_deref().is_some_and(|e| !e.trim().is_empty()))
            .ok_or_else(|| {
                warn!(user_id = %user_id, "No email on file for buyer");
                AppError::new(AppErrorKind::MissingContactInfo {
                    user_id: user_id.to_string(),
                })
            })?;

        // 5. Claim the (user, course) slot
        let purchase = self
            .store
            .create_purchase(user_id, course_id)
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    warn!(
                        user_id = %user_id,
                        course_id = %course_id,
                        "Concurrent initiation lost the race for the purchase slot"
                    );
                    AppError::new(AppErrorKind::ConflictInProgress {
                        course_id: course_id.to_string(),
                    })
                } else {
                    AppError::from(e)
                }
            })?;

        // 6-7. Hand off to the gateway, or roll the purchase back
        match self.hand_off(&purchase, &course, &user).await {
            Ok(initiated) => {
                info!(
                    purchase_id = %initiated.purchase_id,
                    user_id = %user_id,
                    course_id = %course_id,
                    "Purchase initiated"
                );
                Ok(initiated)
            }
            Err(err) => {
                self.compensate(purchase.id).await;
                Err(err)
            }
        }
    }

    /// Decide what an earlier attempt means for a new one. Returns the record
    /// to delete when it must be replaced.
    fn replaceable_attempt(
        &self,
        existing: PurchaseRecord,
    ) -> AppResult<Option<PurchaseRecord>> {
        let purchase = &existing.purchase;
        match purchase.status {
            PurchaseStatus::Active => Err(AppError::new(AppErrorKind::AlreadyOwned {
                course_id: purchase.course_id.clone(),
            })),
            PurchaseStatus::Pending => {
                if self.is_expired(purchase) {
                    info!(
                        purchase_id = %purchase.id,
                        "Removing expired pending purchase"
                    );
                    Ok(Some(existing))
                } else {
                    Err(AppError::new(AppErrorKind::ConflictInProgress {
                        course_id: purchase.course_id.clone(),
                    }))
                }
            }
            PurchaseStatus::Failed => {
                info!(
                    purchase_id = %purchase.id,
                    "Removing previous failed purchase"
                );
                Ok(Some(existing))
            }
        }
    }

    /// Delete a stale attempt while it is still in the status it was read in.
    /// A row that moved on in the meantime blocks the new attempt.
    async fn remove_stale(
        &self,
        stale: &PurchaseRecord,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<()> {
        // payment goes with it
        if self
            .store
            .delete_purchase(stale.purchase.id, &[stale.purchase.status])
            .await?
        {
            return Ok(());
        }

        match self.store.find_purchase_for(user_id, course_id).await? {
            None => Ok(()),
            Some(current) => {
                warn!(
                    purchase_id = %current.purchase.id,
                    status = %current.purchase.status,
                    "Earlier attempt changed while being replaced"
                );
                let course_id = current.purchase.course_id;
                Err(AppError::new(match current.purchase.status {
                    PurchaseStatus::Active => AppErrorKind::AlreadyOwned { course_id },
                    _ => AppErrorKind::ConflictInProgress { course_id },
                }))
            }
        }
    }

    fn is_expired(&self, purchase: &Purchase) -> bool {
        let age = (Utc::now() - purchase.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age >= self.config.pending_expiry
    }

    async fn hand_off(
        &self,
        purchase: &Purchase,
        course: &Course,
        user: &User,
    ) -> AppResult<InitiatedPurchase> {
        let amount = course.checkout_amount();
        let request = CreateTransactionRequest {
            cart_id: purchase.id,
            course_id: course.id.clone(),
            description: course.title.clone(),
            amount: amount.clone(),
            customer: CustomerDetails {
                name: user
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
                email: user.email.clone().unwrap_or_default(),
            },
            callback_url: self.callback_url(),
            return_url: self.return_url(purchase.id, &course.id),
        };

        let hosted = self.gateway.create_transaction(request).await.map_err(|e| {
            error!(
                purchase_id = %purchase.id,
                gateway = self.gateway.name(),
                error = %e,
                "Payment creation failed"
            );
            AppError::from(e)
        })?;

        self.store
            .create_payment(NewPayment {
                purchase_id: purchase.id,
                transaction_reference: hosted.transaction_reference,
                amount,
            })
            .await?;

        Ok(InitiatedPurchase {
            purchase_id: purchase.id,
            payment_url: hosted.redirect_url,
        })
    }

    async fn compensate(&self, purchase_id: Uuid) {
        match self
            .store
            .delete_purchase(purchase_id, &[PurchaseStatus::Pending])
            .await
        {
            Ok(true) => info!(purchase_id = %purchase_id, "Rolled back purchase after failed handoff"),
            Ok(false) => warn!(
                purchase_id = %purchase_id,
                "Purchase left the PENDING state before it could be rolled back"
            ),
            Err(e) => error!(
                purchase_id = %purchase_id,
                error = %e,
                "Failed to roll back purchase after failed handoff"
            ),
        }
    }

    pub fn callback_url(&self) -> String {
        format!("{}/api/webhooks/paytabs", self.config.app_base_url)
    }

    pub fn return_url(&self, purchase_id: Uuid, course_id: &str) -> String {
        format!(
            "{}/courses/{}/payment-status?purchaseId={}&courseId={}",
            self.config.app_base_url, course_id, purchase_id, course_id
        )
    }
}
