use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use crate::api::types::CheckoutState;

const SIGNATURE_HEADER: &str = "signature";

fn ack() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

/// POST /api/webhooks/paytabs
///
/// Anything past signature verification is acknowledged with 200 so the
/// gateway does not keep redelivering; failures are logged.
pub async fn handle_paytabs_callback(
    State(state): State<CheckoutState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let gateway = state.gateway.name();
    info!(gateway = gateway, "Received payment callback");

    let signature = match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(signature) => signature.to_string(),
        None => {
            warn!(gateway = gateway, "Missing callback signature");
            return (StatusCode::UNAUTHORIZED, "Missing signature").into_response();
        }
    };

    match state.gateway.verify_callback(&body, &signature) {
        Ok(verification) if verification.valid => {}
        Ok(verification) => {
            warn!(
                gateway = gateway,
                reason = verification.reason.as_deref().unwrap_or("unknown"),
                "Invalid callback signature"
            );
            return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
        }
        Err(e) => {
            warn!(gateway = gateway, error = %e, "Callback verification failed");
            return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
        }
    }

    let event = match state.gateway.parse_callback(&body) {
        Ok(event) => event,
        Err(e) => {
            error!(gateway = gateway, error = %e, "Unparseable callback payload");
            return ack();
        }
    };

    match state
        .reconciliation
        .apply_gateway_result(&event.transaction_reference, &event.result)
        .await
    {
        Ok(Some(pair)) => {
            info!(
                gateway = gateway,
                transaction_reference = %event.transaction_reference,
                payment_status = %pair.payment_status,
                purchase_status = %pair.purchase_status,
                "Callback processed successfully"
            );
        }
        Ok(None) => {
            warn!(
                gateway = gateway,
                transaction_reference = %event.transaction_reference,
                cart_id = event.cart_id.as_deref().unwrap_or(""),
                "Callback for unknown transaction"
            );
        }
        Err(e) => {
            error!(
                gateway = gateway,
                transaction_reference = %event.transaction_reference,
                error = %e,
                "Callback processing failed"
            );
        }
    }

    ack()
}
