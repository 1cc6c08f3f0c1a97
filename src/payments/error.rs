use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// Gateway answered 2xx but the body was unusable
    #[error("Invalid gateway response: {message}")]
    InvalidResponse { message: String },

    #[error("Callback verification failed: {message}")]
    CallbackVerification { message: String },

    #[error("Gateway error: gateway={gateway}, message={message}")]
    Provider {
        gateway: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Validation { .. } => false,
            GatewayError::Network { .. } => true,
            GatewayError::RateLimited { .. } => true,
            GatewayError::InvalidResponse { .. } => false,
            GatewayError::CallbackVerification { .. } => false,
            GatewayError::Provider { retryable, .. } => *retryable,
        }
    }

    /// Short reason safe to show to the buyer
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Validation { message, .. } => message.clone(),
            GatewayError::Network { .. } => "Payment gateway is temporarily unavailable".to_string(),
            GatewayError::RateLimited { .. } => {
                "Too many requests to payment gateway. Please retry shortly".to_string()
            }
            GatewayError::InvalidResponse { .. } => {
                "Payment gateway returned an unexpected response".to_string()
            }
            GatewayError::CallbackVerification { .. } => "Invalid callback signature".to_string(),
            GatewayError::Provider { message, .. } => message.clone(),
        }
    }
}

impl From<GatewayError> for crate::error::AppError {
    fn from(err: GatewayError) -> Self {
        use crate::error::{AppError, AppErrorKind};

        AppError::new(AppErrorKind::Gateway {
            message: err.user_message(),
            is_retryable: err.is_retryable(),
        })
        .with_context(err.to_string())
    }
}
