//! Purchase endpoints: initiate, status, cancel and delete

use crate::api::types::{tag_request, CheckoutState, PaymentStatusResponse};
use crate::error::{AppError, AppResult};
use crate::identity::CallerId;
use crate::services::InitiatedPurchase;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;
use uuid::Uuid;

/// Resolve the purchase id of a request made by `caller`.
///
/// Anonymous callers are rejected before the id is looked at, and ids that do
/// not parse cannot name an existing purchase.
fn purchase_id_for(caller: Option<&CallerId>, raw: &str) -> AppResult<Uuid> {
    if caller.is_none() {
        return Err(AppError::unauthenticated());
    }
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("Purchase", raw))
}

/// POST /api/courses/{courseId}/purchase
pub async fn create_purchase(
    State(state): State<CheckoutState>,
    Path(course_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InitiatedPurchase>, AppError> {
    let caller = state.caller(&headers);

    state
        .lifecycle
        .initiate(caller.as_ref(), &course_id)
        .await
        .map(Json)
        .map_err(|e| tag_request(e, &headers))
}

/// GET /api/payments/{purchaseId}
pub async fn get_payment_status(
    State(state): State<CheckoutState>,
    Path(purchase_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let caller = state.caller(&headers);
    let purchase_id =
        purchase_id_for(caller.as_ref(), &purchase_id).map_err(|e| tag_request(e, &headers))?;

    state
        .reconciliation
        .reconcile(caller.as_ref(), purchase_id)
        .await
        .map(|pair| Json(PaymentStatusResponse::from(pair)))
        .map_err(|e| tag_request(e, &headers))
}

/// PATCH /api/courses/{courseId}/purchase/{purchaseId}/cancel
pub async fn cancel_purchase(
    State(state): State<CheckoutState>,
    Path((course_id, purchase_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let caller = state.caller(&headers);
    let purchase_id =
        purchase_id_for(caller.as_ref(), &purchase_id).map_err(|e| tag_request(e, &headers))?;

    state
        .reconciliation
        .cancel_pending(caller.as_ref(), &course_id, purchase_id)
        .await
        .map_err(|e| tag_request(e, &headers))?;

    info!(purchase_id = %purchase_id, course_id = %course_id, "Purchase canceled by buyer");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/courses/{courseId}/purchase/{purchaseId}
pub async fn delete_purchase(
    State(state): State<CheckoutState>,
    Path((course_id, purchase_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let caller = state.caller(&headers);
    let purchase_id =
        purchase_id_for(caller.as_ref(), &purchase_id).map_err(|e| tag_request(e, &headers))?;

    state
        .reconciliation
        .delete_terminal(caller.as_ref(), &course_id, purchase_id)
        .await
        .map_err(|e| tag_request(e, &headers))?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_caller_is_rejected_before_id_parsing() {
        let err = purchase_id_for(None, "not-a-uuid").unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn malformed_purchase_id_is_not_found() {
        let caller = CallerId::new("user_1");
        let err = purchase_id_for(Some(&caller), "not-a-uuid").unwrap_err();
        assert_eq!(err.status_code(), 404);

        let id = Uuid::new_v4();
        assert_eq!(purchase_id_for(Some(&caller), &id.to_string()).unwrap(), id);
    }
}
