//! Browser return from the hosted payment page

use crate::api::types::ReturnParams;
use crate::middleware::error::{get_request_id_from_headers, json_error_response};
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use tracing::{info, warn};

/// Page the buyer lands on to watch the payment settle
pub fn payment_status_path(purchase_id: &str, course_id: &str) -> String {
    format!(
        "/courses/{}/payment-status?purchaseId={}&courseId={}",
        course_id, purchase_id, course_id
    )
}

/// POST /api/payment/redirect and POST /api/payment/status
pub async fn payment_return(Query(params): Query<ReturnParams>, headers: HeaderMap) -> Response {
    let purchase_id = params.purchase_id.filter(|v| !v.trim().is_empty());
    let course_id = params.course_id.filter(|v| !v.trim().is_empty());

    match (purchase_id, course_id) {
        (Some(purchase_id), Some(course_id)) => {
            info!(purchase_id = %purchase_id, course_id = %course_id, "Buyer returned from gateway");
            Redirect::temporary(&payment_status_path(&purchase_id, &course_id)).into_response()
        }
        (purchase_id, _) => {
            let field = if purchase_id.is_none() {
                "purchaseId"
            } else {
                "courseId"
            };
            warn!(field = field, "Gateway return is missing a parameter");
            json_error_response(
                StatusCode::BAD_REQUEST,
                field,
                "Missing required parameters",
                get_request_id_from_headers(&headers),
            )
            .into_response()
        }
    }
}
