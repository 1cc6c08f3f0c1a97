//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error};

use crate::database::error::DatabaseError;
use crate::database::store::PurchaseStore;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn PurchaseStore>,
    store_kind: &'static str,
    gateway_name: &'static str,
    check_timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        store_kind: &'static str,
        gateway_name: &'static str,
    ) -> Self {
        Self {
            store,
            store_kind,
            gateway_name,
            check_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut overall_healthy = true;

        match timeout(self.check_timeout, check_store_health(self.store.as_ref())).await {
            Ok(Ok(response_time)) => {
                health_status.checks.insert(
                    "store".to_string(),
                    ComponentHealth::up(Some(response_time), Some(self.store_kind.to_string())),
                );
                debug!("Store health check: OK ({}ms)", response_time);
            }
            Ok(Err(e)) => {
                overall_healthy = false;
                health_status.checks.insert(
                    "store".to_string(),
                    ComponentHealth::down(Some(e.to_string())),
                );
                error!("Store health check failed: {}", e);
            }
            Err(_) => {
                overall_healthy = false;
                health_status.checks.insert(
                    "store".to_string(),
                    ComponentHealth::down(Some("Timeout".to_string())),
                );
                error!("Store health check timed out");
            }
        }

        // Gateway reachability is only known per request; report what is wired in
        health_status.checks.insert(
            "gateway".to_string(),
            ComponentHealth::up(None, Some(self.gateway_name.to_string())),
        );

        health_status.status = if overall_healthy {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        health_status
    }
}

pub async fn check_store_health(store: &dyn PurchaseStore) -> Result<u128, DatabaseError> {
    let start = Instant::now();
    store.ping().await?;
    Ok(start.elapsed().as_millis())
}
