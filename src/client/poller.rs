//! Payment-status poller
//!
//! Drives the payment-status page after the buyer returns from the gateway:
//! an immediate check, then one every `interval`, bounded by `max_attempts`.
//! The task is cancellable at any point, and once torn down it publishes
//! nothing more and navigates nowhere.

use crate::api::types::PaymentStatusResponse;
use crate::client::api::PurchaseApi;
use crate::client::session::CheckoutSession;
use crate::database::models::{PaymentStatus, PurchaseStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the page shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Still confirming; `attempt` is the check in flight (0 before the first)
    Polling { attempt: u32 },
    Success,
    Error,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Pause on the success screen before leaving it
    pub redirect_delay: Duration,
    pub account_path: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 12,
            redirect_delay: Duration::from_secs(2),
            account_path: "/dashboard".to_string(),
        }
    }
}

/// Client-side navigation
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Where "try again" sends the buyer
pub fn retry_path(course_id: &str) -> String {
    format!("/courses/{}/purchase", course_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Settled(PollState),
    Pending,
}

fn classify(view: &PaymentStatusResponse) -> Verdict {
    if view.status == PaymentStatus::Completed || view.purchase.status == PurchaseStatus::Active {
        Verdict::Settled(PollState::Success)
    } else if view.status == PaymentStatus::Failed || view.purchase.status == PurchaseStatus::Failed
    {
        Verdict::Settled(PollState::Error)
    } else {
        Verdict::Pending
    }
}

/// Publishes state unless the poller has been torn down.
///
/// Teardown takes the same lock, so after `PollerHandle::cancel` returns no
/// further state or navigation can be observed.
#[derive(Clone)]
struct Outlet {
    state_tx: Arc<watch::Sender<PollState>>,
    torn_down: Arc<Mutex<bool>>,
}

impl Outlet {
    fn while_live(&self, f: impl FnOnce()) -> bool {
        let torn_down = self
            .torn_down
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *torn_down {
            return false;
        }
        f();
        true
    }

    fn publish(&self, state: PollState) -> bool {
        self.while_live(|| {
            self.state_tx.send_replace(state);
        })
    }

    fn tear_down(&self) {
        let mut torn_down = self
            .torn_down
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *torn_down = true;
    }
}

/// Handle to a running poll. Dropping it tears the poll down.
pub struct PollerHandle {
    state_rx: watch::Receiver<PollState>,
    cancel_tx: watch::Sender<bool>,
    outlet: Outlet,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state_rx.clone()
    }

    /// Wait for success or error. Returns the last published state if the
    /// poll is torn down first.
    pub async fn wait_terminal(&self) -> PollState {
        let mut rx = self.state_rx.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();
        // no watch borrow may outlive the select
        tokio::select! {
            biased;
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => {}
            _ = rx.wait_for(|state| state.is_terminal()) => {}
        }
        *self.state_rx.borrow()
    }

    /// Stop polling now. Idempotent.
    pub fn cancel(&self) {
        self.outlet.tear_down();
        let _ = self.cancel_tx.send(true);
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    // A dropped sender also means teardown
    let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
}

#[derive(Clone)]
pub struct PaymentStatusPoller {
    api: Arc<dyn PurchaseApi>,
    session: Arc<CheckoutSession>,
    navigator: Arc<dyn Navigator>,
    config: PollerConfig,
}

impl PaymentStatusPoller {
    pub fn new(
        api: Arc<dyn PurchaseApi>,
        session: Arc<CheckoutSession>,
        navigator: Arc<dyn Navigator>,
        config: PollerConfig,
    ) -> Self {
        Self {
            api,
            session,
            navigator,
            config,
        }
    }

    /// Start polling for the ids taken from the return URL
    pub fn spawn(&self, purchase_id: Option<String>, course_id: Option<String>) -> PollerHandle {
        let (state_tx, state_rx) = watch::channel(PollState::Polling { attempt: 0 });
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let outlet = Outlet {
            state_tx: Arc::new(state_tx),
            torn_down: Arc::new(Mutex::new(false)),
        };

        let poller = self.clone();
        let task_outlet = outlet.clone();
        let task = tokio::spawn(async move {
            poller
                .run(purchase_id, course_id, task_outlet, cancel_rx)
                .await
        });

        PollerHandle {
            state_rx,
            cancel_tx,
            outlet,
            task,
        }
    }

    async fn run(
        self,
        purchase_id: Option<String>,
        course_id: Option<String>,
        outlet: Outlet,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let purchase_id = match (
            purchase_id.filter(|v| !v.is_empty()),
            course_id.filter(|v| !v.is_empty()),
        ) {
            (Some(purchase_id), Some(_)) => purchase_id,
            _ => {
                warn!("Missing purchaseId or courseId on payment status page");
                outlet.publish(PollState::Error);
                return;
            }
        };

        for attempt in 1..=self.config.max_attempts {
            if !outlet.publish(PollState::Polling { attempt }) {
                return;
            }
            debug!(purchase_id = %purchase_id, attempt, "Checking payment status");

            let checked = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => return,
                checked = self.api.payment_status(&purchase_id) => checked,
            };

            let verdict = match checked {
                Ok(view) => classify(&view),
                Err(e) => {
                    // a failed check counts as still pending
                    debug!(purchase_id = %purchase_id, error = %e, "Payment status check failed");
                    Verdict::Pending
                }
            };

            if let Verdict::Settled(state) = verdict {
                self.settle(&purchase_id, state, &outlet, &mut cancel_rx).await;
                return;
            }

            if attempt < self.config.max_attempts {
                tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel_rx) => return,
                    _ = tokio::time::sleep(self.config.interval) => {}
                }
            }
        }

        // The remembered checkout stays so the next checkout-page load can clean it up
        info!(
            purchase_id = %purchase_id,
            attempts = self.config.max_attempts,
            "Max check attempts reached"
        );
        outlet.publish(PollState::Error);
    }

    async fn settle(
        &self,
        purchase_id: &str,
        state: PollState,
        outlet: &Outlet,
        cancel_rx: &mut watch::Receiver<bool>,
    ) {
        // the remembered checkout is only forgotten by a live poll
        let live = outlet.while_live(|| {
            self.session.clear_if(purchase_id);
            outlet.state_tx.send_replace(state);
        });
        if !live {
            return;
        }
        info!(purchase_id = %purchase_id, state = ?state, "Payment settled");

        if state == PollState::Success {
            tokio::select! {
                biased;
                _ = cancelled(cancel_rx) => {}
                _ = tokio::time::sleep(self.config.redirect_delay) => {
                    outlet.while_live(|| self.navigator.navigate(&self.config.account_path));
                }
            }
        }
    }
}
