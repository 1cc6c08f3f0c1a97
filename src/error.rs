//! Error handling for the checkout core
//!
//! One error type covers every failure the purchase services can surface,
//! with HTTP status mapping, user-facing messages and stable error codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error codes for client handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "UNAUTHENTICATED")]
    Unauthenticated,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "ALREADY_OWNED")]
    AlreadyOwned,
    #[serde(rename = "CONFLICT_IN_PROGRESS")]
    ConflictInProgress,
    #[serde(rename = "MISSING_CONTACT_INFO")]
    MissingContactInfo,
    #[serde(rename = "INVALID_STATE")]
    InvalidState,
    #[serde(rename = "GATEWAY_ERROR")]
    GatewayError,
    #[serde(rename = "STORE_ERROR")]
    StoreError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorKind {
    /// No caller identity could be resolved
    Unauthenticated,
    /// The caller does not own the purchase
    Unauthorized { purchase_id: String },
    NotFound { entity: String, id: String },
    AlreadyOwned { course_id: String },
    /// A live checkout already exists for this user and course
    ConflictInProgress { course_id: String },
    MissingContactInfo { user_id: String },
    InvalidState {
        purchase_id: String,
        status: String,
        operation: String,
    },
    Gateway { message: String, is_retryable: bool },
    Store { message: String, is_retryable: bool },
}

/// Unified application error
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(AppErrorKind::Unauthenticated)
    }

    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        })
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Unauthenticated => 401,
            AppErrorKind::Unauthorized { .. } => 401,
            AppErrorKind::NotFound { .. } => 404,
            AppErrorKind::AlreadyOwned { .. } => 400,
            AppErrorKind::ConflictInProgress { .. } => 400,
            AppErrorKind::MissingContactInfo { .. } => 400,
            AppErrorKind::InvalidState { .. } => 400,
            AppErrorKind::Gateway { .. } => 500,
            AppErrorKind::Store { .. } => 500,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Unauthenticated => ErrorCode::Unauthenticated,
            AppErrorKind::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppErrorKind::NotFound { .. } => ErrorCode::NotFound,
            AppErrorKind::AlreadyOwned { .. } => ErrorCode::AlreadyOwned,
            AppErrorKind::ConflictInProgress { .. } => ErrorCode::ConflictInProgress,
            AppErrorKind::MissingContactInfo { .. } => ErrorCode::MissingContactInfo,
            AppErrorKind::InvalidState { .. } => ErrorCode::InvalidState,
            AppErrorKind::Gateway { .. } => ErrorCode::GatewayError,
            AppErrorKind::Store { .. } => ErrorCode::StoreError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Unauthenticated => {
                "Unauthorized - Please sign in to make a purchase".to_string()
            }
            AppErrorKind::Unauthorized { .. } => "Unauthorized".to_string(),
            AppErrorKind::NotFound { entity, .. } => match entity.as_str() {
                "Course" => "Course not found or not available for purchase".to_string(),
                other => format!("{} not found", other),
            },
            AppErrorKind::AlreadyOwned { .. } => {
                "You have already purchased this course".to_string()
            }
            AppErrorKind::ConflictInProgress { .. } => {
                "You have a pending purchase for this course. Please complete the payment or try again later".to_string()
            }
            AppErrorKind::MissingContactInfo { .. } => {
                "Your account email is required for payment processing".to_string()
            }
            AppErrorKind::InvalidState {
                status, operation, ..
            } => format!("Cannot {} a purchase in status {}", operation, status),
            AppErrorKind::Gateway { message, .. } => format!("Payment Error: {}", message),
            AppErrorKind::Store { .. } => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Gateway { is_retryable, .. } => *is_retryable,
            AppErrorKind::Store { is_retryable, .. } => *is_retryable,
            // A pending checkout expires, so retrying later can succeed
            AppErrorKind::ConflictInProgress { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}: {}", context, self.user_message()),
            None => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
