use std::sync::{Mutex, MutexGuard};

/// A checkout the buyer started but has not been seen to finish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCheckout {
    pub purchase_id: String,
    pub course_id: String,
}

/// Per-tab memory of the pending checkout, shared by the checkout flow and the poller
#[derive(Debug, Default)]
pub struct CheckoutSession {
    pending: Mutex<Option<PendingCheckout>>,
}

impl CheckoutSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<PendingCheckout>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn remember(&self, pending: PendingCheckout) {
        *self.slot() = Some(pending);
    }

    pub fn current(&self) -> Option<PendingCheckout> {
        self.slot().clone()
    }

    /// Forget the pending checkout if it is still `purchase_id`. Returns whether it was.
    pub fn clear_if(&self, purchase_id: &str) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(pending) if pending.purchase_id == purchase_id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}
