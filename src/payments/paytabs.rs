use crate::config::GatewayConfig;
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{
    CallbackEvent, CallbackVerification, CreateTransactionRequest, GatewayResultCode,
    HostedTransaction,
};
use crate::payments::utils::{verify_hmac_sha256_hex, GatewayHttpClient, Retry};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct PaymentRequestResponse {
    tran_ref: Option<String>,
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResult {
    response_status: Option<String>,
    response_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    payment_result: Option<PaymentResult>,
}

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    tran_ref: Option<String>,
    cart_id: Option<String>,
    payment_result: Option<PaymentResult>,
}

/// Map a PayTabs `response_status` letter to a result code
pub fn result_code(response_status: &str) -> GatewayResultCode {
    match response_status.trim() {
        "A" => GatewayResultCode::Success,
        "D" => GatewayResultCode::Declined,
        "E" => GatewayResultCode::Error,
        "X" => GatewayResultCode::Expired,
        "C" => GatewayResultCode::Canceled,
        other => GatewayResultCode::Unrecognized(other.to_string()),
    }
}

fn amount_value(amount: &BigDecimal) -> JsonValue {
    let rendered = amount.with_scale(2).to_string();
    match serde_json::Number::from_str(&rendered) {
        Ok(number) => JsonValue::Number(number),
        Err(_) => JsonValue::String(rendered),
    }
}

fn profile_value(profile_id: &str) -> JsonValue {
    match profile_id.trim().parse::<u64>() {
        Ok(id) => JsonValue::from(id),
        Err(_) => JsonValue::String(profile_id.to_string()),
    }
}

pub struct PayTabsGateway {
    config: GatewayConfig,
    http: GatewayHttpClient,
}

impl PayTabsGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let http = GatewayHttpClient::new(
            Duration::from_secs(config.timeout_secs),
            config.max_query_retries,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn create_payload(&self, request: &CreateTransactionRequest) -> JsonValue {
        serde_json::json!({
            "profile_id": profile_value(&self.config.profile_id),
            "tran_type": "sale",
            "tran_class": "ecom",
            "cart_id": request.cart_id.to_string(),
            "cart_currency": self.config.currency,
            "cart_amount": amount_value(&request.amount),
            "cart_description": request.description,
            "callback": request.callback_url,
            "return": request.return_url,
            "customer_details": {
                "name": request.customer.name,
                "email": request.customer.email,
            },
        })
    }
}

#[async_trait]
impl PaymentGateway for PayTabsGateway {
    async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> GatewayResult<HostedTransaction> {
        request.validate()?;

        let payload = self.create_payload(&request);
        let response: PaymentRequestResponse = self
            .http
            .post_json(
                &self.endpoint("/payment/request"),
                &payload,
                &[("authorization", self.config.server_key.as_str())],
                Retry::Never,
            )
            .await?;

        let transaction_reference = response
            .tran_ref
            .filter(|v| !v.trim().is_empty())
            .ok_or(GatewayError::InvalidResponse {
                message: "missing tran_ref in payment request response".to_string(),
            })?;
        let redirect_url = response
            .redirect_url
            .filter(|v| !v.trim().is_empty())
            .ok_or(GatewayError::InvalidResponse {
                message: "missing redirect_url in payment request response".to_string(),
            })?;

        info!(
            purchase_id = %request.cart_id,
            course_id = %request.course_id,
            transaction_reference = %transaction_reference,
            "PayTabs hosted transaction created"
        );

        Ok(HostedTransaction {
            transaction_reference,
            redirect_url,
        })
    }

    async fn verify_transaction(
        &self,
        transaction_reference: &str,
    ) -> GatewayResult<GatewayResultCode> {
        if transaction_reference.trim().is_empty() {
            return Err(GatewayError::Validation {
                message: "transaction reference is required".to_string(),
                field: Some("tran_ref".to_string()),
            });
        }

        let payload = serde_json::json!({
            "profile_id": profile_value(&self.config.profile_id),
            "tran_ref": transaction_reference,
        });
        let response: QueryResponse = self
            .http
            .post_json(
                &self.endpoint("/payment/query"),
                &payload,
                &[("authorization", self.config.server_key.as_str())],
                Retry::Idempotent,
            )
            .await?;

        let result = response
            .payment_result
            .ok_or(GatewayError::InvalidResponse {
                message: "missing payment_result in query response".to_string(),
            })?;
        let code = result_code(result.response_status.as_deref().unwrap_or(""));

        debug!(
            transaction_reference = %transaction_reference,
            result = %code,
            message = result.response_message.as_deref().unwrap_or(""),
            "PayTabs transaction queried"
        );
        Ok(code)
    }

    fn verify_callback(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> GatewayResult<CallbackVerification> {
        let valid = verify_hmac_sha256_hex(payload, &self.config.server_key, signature);
        Ok(CallbackVerification {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid paytabs signature".to_string())
            },
        })
    }

    fn parse_callback(&self, payload: &[u8]) -> GatewayResult<CallbackEvent> {
        let raw: JsonValue =
            serde_json::from_slice(payload).map_err(|e| GatewayError::CallbackVerification {
                message: format!("invalid callback JSON payload: {}", e),
            })?;
        let parsed: CallbackPayload = serde_json::from_value(raw.clone()).map_err(|e| {
            GatewayError::CallbackVerification {
                message: format!("unexpected callback shape: {}", e),
            }
        })?;

        let transaction_reference = parsed
            .tran_ref
            .filter(|v| !v.trim().is_empty())
            .ok_or(GatewayError::CallbackVerification {
                message: "callback is missing tran_ref".to_string(),
            })?;
        let result = parsed
            .payment_result
            .and_then(|r| r.response_status)
            .map(|status| result_code(&status))
            .unwrap_or_else(|| GatewayResultCode::Unrecognized(String::new()));

        Ok(CallbackEvent {
            transaction_reference,
            cart_id: parsed.cart_id,
            result,
            payload: raw,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn name(&self) -> &'static str {
        "paytabs"
    }
}
