//! Purchase aggregate records and their status vocabularies

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};

/// Lifecycle status of a purchase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Pending,
    Active,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "PENDING",
            PurchaseStatus::Active => "ACTIVE",
            PurchaseStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(PurchaseStatus::Pending),
            "ACTIVE" => Ok(PurchaseStatus::Active),
            "FAILED" => Ok(PurchaseStatus::Failed),
            other => Err(DatabaseError::new(DatabaseErrorKind::Decode {
                message: format!("unknown purchase status: {}", other),
            })),
        }
    }
}

/// Status of the gateway transaction backing a purchase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELED" => Ok(PaymentStatus::Canceled),
            other => Err(DatabaseError::new(DatabaseErrorKind::Decode {
                message: format!("unknown payment status: {}", other),
            })),
        }
    }
}

/// Course as seen by the checkout core (read-only)
#[derive(Debug, Clone)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub price: Option<BigDecimal>,
    pub is_published: bool,
}

impl Course {
    /// Price charged at checkout; an unset price is free
    pub fn checkout_amount(&self) -> BigDecimal {
        self.price.clone().unwrap_or_else(|| BigDecimal::from(0))
    }
}

/// Contact details of a user (read-only)
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub transaction_reference: String,
    pub amount: BigDecimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// A purchase loaded together with its (optional) payment
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRecord {
    pub purchase: Purchase,
    pub payment: Option<Payment>,
}

/// Payment to be persisted right after a successful gateway handoff
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub purchase_id: Uuid,
    pub transaction_reference: String,
    pub amount: BigDecimal,
}

/// A lock-step status write for a purchase and its payment.
///
/// When `expected` is set the write only applies while the purchase still
/// holds that status.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub purchase_id: Uuid,
    pub payment_id: Option<Uuid>,
    pub expected: Option<PurchaseStatus>,
    pub payment_status: PaymentStatus,
    pub purchase_status: PurchaseStatus,
}
