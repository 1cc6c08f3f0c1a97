use course_checkout::api::{self, CheckoutState};
use course_checkout::config::AppConfig;
use course_checkout::database::memory::MemoryPurchaseStore;
use course_checkout::database::store::PurchaseStore;
use course_checkout::health::HealthChecker;
use course_checkout::identity::HeaderIdentityProvider;
use course_checkout::logging::init_tracing;
use course_checkout::middleware::logging::{request_logging_middleware, UuidRequestId};
use course_checkout::payments::gateway::PaymentGateway;
use course_checkout::payments::paytabs::PayTabsGateway;
use course_checkout::services::{PaymentReconciliationService, PurchaseLifecycleService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(feature = "database")]
async fn postgres_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn PurchaseStore>, &'static str)> {
    use course_checkout::database::{init_pool_from_config, postgres::PgPurchaseStore};

    info!("📊 Initializing database connection pool...");
    let pool = init_pool_from_config(&config.database)
        .await
        .map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            e
        })?;

    info!(
        max_connections = pool.options().get_max_connections(),
        "✅ Database connection pool initialized"
    );
    Ok((Arc::new(PgPurchaseStore::new(pool)), "postgres"))
}

#[cfg(not(feature = "database"))]
async fn postgres_store(
    _config: &AppConfig,
) -> anyhow::Result<(Arc<dyn PurchaseStore>, &'static str)> {
    Err(anyhow::anyhow!(
        "built without the `database` feature; set SKIP_EXTERNALS=true"
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "🚀 Starting course checkout service"
    );
    info!(
        host = %config.server.host,
        port = config.server.port,
        app_base_url = %config.checkout.app_base_url,
        pending_expiry_secs = config.checkout.pending_expiry.as_secs(),
        "Server configuration loaded"
    );

    // Persistent store
    let (store, store_kind): (Arc<dyn PurchaseStore>, &'static str) =
        if config.server.skip_externals {
            info!("⏭️  Skipping database initialization (SKIP_EXTERNALS=true)");
            warn!("Using the in-memory store; purchases are lost on restart");
            (Arc::new(MemoryPurchaseStore::new()), "memory")
        } else {
            postgres_store(&config).await?
        };

    // Payment gateway
    info!("💳 Initializing payment gateway client...");
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(PayTabsGateway::new(config.gateway.clone()).map_err(|e| {
            error!("Failed to initialize payment gateway: {}", e);
            e
        })?);
    info!(gateway = gateway.name(), "✅ Payment gateway initialized");

    let lifecycle = Arc::new(PurchaseLifecycleService::new(
        store.clone(),
        gateway.clone(),
        config.checkout.clone(),
    ));
    let reconciliation = Arc::new(PaymentReconciliationService::new(
        store.clone(),
        gateway.clone(),
    ));
    let state = CheckoutState {
        lifecycle,
        reconciliation,
        identity: Arc::new(HeaderIdentityProvider::new(
            config.checkout.identity_header.clone(),
        )),
        gateway: gateway.clone(),
    };

    info!("🏥 Initializing health checker...");
    let health_checker = HealthChecker::new(store, store_kind, gateway.name());

    info!("🛣️  Setting up application routes...");
    let app = api::router(state)
        .merge(api::health_router(health_checker))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            e
        })?;

    info!("👋 Server shutdown complete");

    Ok(())
}
