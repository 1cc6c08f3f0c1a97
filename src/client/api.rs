//! Client for the checkout API as used by the purchase and payment-status pages

use crate::api::types::PaymentStatusResponse;
use crate::middleware::error::ErrorResponse;
use crate::services::InitiatedPurchase;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Checkout endpoints the browser side talks to
#[async_trait]
pub trait PurchaseApi: Send + Sync {
    async fn initiate(&self, course_id: &str) -> Result<InitiatedPurchase, ClientError>;

    async fn payment_status(&self, purchase_id: &str)
        -> Result<PaymentStatusResponse, ClientError>;

    async fn cancel_pending(&self, course_id: &str, purchase_id: &str) -> Result<(), ClientError>;
}

/// `PurchaseApi` over HTTP, acting as one signed-in user
#[derive(Clone)]
pub struct HttpPurchaseApi {
    client: Client,
    base_url: String,
    identity_header: String,
    caller_id: String,
}

impl HttpPurchaseApi {
    pub fn new(
        base_url: impl Into<String>,
        identity_header: impl Into<String>,
        caller_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity_header: identity_header.into(),
            caller_id: caller_id.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(self.identity_header.as_str(), self.caller_id.as_str())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(|e| ClientError::Network {
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        debug!(status = status.as_u16(), message = %message, "Checkout API request failed");

        Err(ClientError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PurchaseApi for HttpPurchaseApi {
    async fn initiate(&self, course_id: &str) -> Result<InitiatedPurchase, ClientError> {
        let response = self
            .send(self.request(Method::POST, &format!("/api/courses/{}/purchase", course_id)))
            .await?;
        response
            .json::<InitiatedPurchase>()
            .await
            .map_err(|e| ClientError::Decode {
                message: e.to_string(),
            })
    }

    async fn payment_status(
        &self,
        purchase_id: &str,
    ) -> Result<PaymentStatusResponse, ClientError> {
        let response = self
            .send(self.request(Method::GET, &format!("/api/payments/{}", purchase_id)))
            .await?;
        response
            .json::<PaymentStatusResponse>()
            .await
            .map_err(|e| ClientError::Decode {
                message: e.to_string(),
            })
    }

    async fn cancel_pending(&self, course_id: &str, purchase_id: &str) -> Result<(), ClientError> {
        self.send(self.request(
            Method::PATCH,
            &format!("/api/courses/{}/purchase/{}/cancel", course_id, purchase_id),
        ))
        .await?;
        Ok(())
    }
}
