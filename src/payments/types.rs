use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::payments::error::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
}

/// Everything the gateway needs to open a hosted payment page
#[derive(Debug, Clone)]
pub struct CreateTransactionRequest {
    /// Merchant-side cart id; the purchase id
    pub cart_id: Uuid,
    pub course_id: String,
    pub description: String,
    pub amount: BigDecimal,
    pub customer: CustomerDetails,
    pub callback_url: String,
    pub return_url: String,
}

impl CreateTransactionRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.amount < BigDecimal::from(0) {
            return Err(GatewayError::Validation {
                message: "amount must not be negative".to_string(),
                field: Some("amount".to_string()),
            });
        }
        if self.customer.email.trim().is_empty() {
            return Err(GatewayError::Validation {
                message: "customer email is required".to_string(),
                field: Some("customer.email".to_string()),
            });
        }
        Ok(())
    }
}

/// A transaction the buyer can complete on the gateway's hosted page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedTransaction {
    pub transaction_reference: String,
    pub redirect_url: String,
}

/// Final result reported by the gateway for a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResultCode {
    Success,
    Declined,
    Error,
    Expired,
    Canceled,
    /// Anything the gateway may add later, or a transaction still in flight
    Unrecognized(String),
}

impl GatewayResultCode {
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, GatewayResultCode::Unrecognized(_))
    }
}

impl std::fmt::Display for GatewayResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayResultCode::Success => write!(f, "success"),
            GatewayResultCode::Declined => write!(f, "declined"),
            GatewayResultCode::Error => write!(f, "error"),
            GatewayResultCode::Expired => write!(f, "expired"),
            GatewayResultCode::Canceled => write!(f, "canceled"),
            GatewayResultCode::Unrecognized(code) => write!(f, "unrecognized({})", code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackVerification {
    pub valid: bool,
    pub reason: Option<String>,
}

/// Server-to-server notification about a transaction's outcome
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub transaction_reference: String,
    pub cart_id: Option<String>,
    pub result: GatewayResultCode,
    pub payload: JsonValue,
    pub received_at: String,
}
