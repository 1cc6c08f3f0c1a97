//! Browser-side checkout logic: the purchase page, abandonment cleanup and
//! the payment-status poller.

pub mod api;
pub mod checkout;
pub mod poller;
pub mod session;

pub use api::{ClientError, HttpPurchaseApi, PurchaseApi};
pub use checkout::{Checkout, CleanupOutcome};
pub use poller::{retry_path, Navigator, PaymentStatusPoller, PollState, PollerConfig, PollerHandle};
pub use session::{CheckoutSession, PendingCheckout};
