//! Checkout-page flow: start a purchase, and release it again when the buyer
//! walks away before reaching the gateway.

use crate::client::api::{ClientError, PurchaseApi};
use crate::client::session::{CheckoutSession, PendingCheckout};
use crate::database::models::{PaymentStatus, PurchaseStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one abandonment cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// No remembered checkout
    Nothing,
    /// Pending purchase canceled on the server
    Canceled { purchase_id: String },
    /// Server says it is gone or no longer pending
    AlreadySettled { purchase_id: String },
    /// Checkout already finished, nothing to cancel
    Finished { purchase_id: String },
    /// Cancel request failed; the checkout stays remembered
    Failed { purchase_id: String },
}

pub struct Checkout {
    api: Arc<dyn PurchaseApi>,
    session: Arc<CheckoutSession>,
    // set between a successful start and the gateway redirect
    armed: AtomicBool,
}

impl Checkout {
    pub fn new(api: Arc<dyn PurchaseApi>, session: Arc<CheckoutSession>) -> Self {
        Self {
            api,
            session,
            armed: AtomicBool::new(false),
        }
    }

    /// Create the purchase and return the gateway payment URL
    pub async fn start(&self, course_id: &str) -> Result<String, ClientError> {
        let initiated = self.api.initiate(course_id).await.map_err(|e| {
            warn!(course_id = %course_id, error = %e, "Failed to start checkout");
            e
        })?;

        let purchase_id = initiated.purchase_id.to_string();
        self.session.remember(PendingCheckout {
            purchase_id: purchase_id.clone(),
            course_id: course_id.to_string(),
        });
        self.armed.store(true, Ordering::SeqCst);

        info!(purchase_id = %purchase_id, course_id = %course_id, "Checkout started");
        Ok(initiated.payment_url)
    }

    /// The browser has left for the gateway
    pub fn on_redirect_complete(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Re-check a checkout remembered from an earlier visit and release it if
    /// it never completed.
    pub async fn on_page_load(&self) -> CleanupOutcome {
        let Some(pending) = self.session.current() else {
            return CleanupOutcome::Nothing;
        };

        match self.api.payment_status(&pending.purchase_id).await {
            Ok(view)
                if view.status == PaymentStatus::Pending
                    || view.purchase.status == PurchaseStatus::Pending =>
            {
                debug!(purchase_id = %pending.purchase_id, "Remembered checkout still pending");
                self.cleanup().await
            }
            Ok(_) => {
                self.session.clear_if(&pending.purchase_id);
                CleanupOutcome::Finished {
                    purchase_id: pending.purchase_id,
                }
            }
            Err(e) => {
                debug!(
                    purchase_id = %pending.purchase_id,
                    error = %e,
                    "Could not check remembered checkout"
                );
                self.cleanup().await
            }
        }
    }

    pub async fn on_page_hidden(&self) -> CleanupOutcome {
        self.cleanup_if_armed().await
    }

    pub async fn on_before_unload(&self) -> CleanupOutcome {
        self.cleanup_if_armed().await
    }

    async fn cleanup_if_armed(&self) -> CleanupOutcome {
        if !self.is_armed() {
            return CleanupOutcome::Nothing;
        }
        self.cleanup().await
    }

    /// Cancel the remembered pending purchase. Safe to call repeatedly.
    pub async fn cleanup(&self) -> CleanupOutcome {
        self.armed.store(false, Ordering::SeqCst);

        let Some(pending) = self.session.current() else {
            return CleanupOutcome::Nothing;
        };
        let purchase_id = pending.purchase_id.clone();

        match self
            .api
            .cancel_pending(&pending.course_id, &pending.purchase_id)
            .await
        {
            Ok(()) => {
                self.session.clear_if(&purchase_id);
                info!(purchase_id = %purchase_id, "Abandoned checkout canceled");
                CleanupOutcome::Canceled { purchase_id }
            }
            Err(e) if matches!(e.status(), Some(400) | Some(404)) => {
                self.session.clear_if(&purchase_id);
                debug!(purchase_id = %purchase_id, error = %e, "Checkout already settled");
                CleanupOutcome::AlreadySettled { purchase_id }
            }
            Err(e) => {
                warn!(purchase_id = %purchase_id, error = %e, "Failed to cancel abandoned checkout");
                CleanupOutcome::Failed { purchase_id }
            }
        }
    }
}
