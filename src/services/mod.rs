//! Services module for the checkout business logic

pub mod payment_reconciliation;
pub mod purchase_lifecycle;

pub use payment_reconciliation::{PaymentReconciliationService, StatusPair};
pub use purchase_lifecycle::{InitiatedPurchase, PurchaseLifecycleService};
