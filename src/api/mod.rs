//! HTTP surface of the checkout service

pub mod payment_return;
pub mod purchases;
pub mod types;
pub mod webhooks;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use tracing::{debug, error};

use crate::health::{HealthChecker, HealthStatus};
pub use types::CheckoutState;

/// Build the checkout routes over `state`
pub fn router(state: CheckoutState) -> Router {
    Router::new()
        .route(
            "/api/courses/{course_id}/purchase",
            post(purchases::create_purchase),
        )
        .route(
            "/api/courses/{course_id}/purchase/{purchase_id}",
            delete(purchases::delete_purchase),
        )
        .route(
            "/api/courses/{course_id}/purchase/{purchase_id}/cancel",
            patch(purchases::cancel_purchase),
        )
        .route(
            "/api/payments/{purchase_id}",
            get(purchases::get_payment_status),
        )
        .route(
            "/api/payment/redirect",
            post(payment_return::payment_return),
        )
        .route("/api/payment/status", post(payment_return::payment_return))
        .route(
            "/api/webhooks/paytabs",
            post(webhooks::handle_paytabs_callback),
        )
        .with_state(state)
}

/// Health, readiness and liveness probes
pub fn health_router(checker: HealthChecker) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(checker)
}

async fn health(
    State(checker): State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = checker.check_health().await;

    if health_status.is_healthy() {
        debug!("Health check passed");
        Ok(Json(health_status))
    } else {
        error!("Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    }
}

/// Readiness checks all dependencies
async fn readiness(
    state: State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    health(state).await
}

async fn liveness() -> &'static str {
    "OK"
}
