//! Application startup and lifecycle management.

use crate::config::{Config, StorageBackend};
use crate::handlers;
use crate::services::{
    Database, InMemoryStore, PaymentGateway, PaymentOrderManager, RazorpayClient, Repositories,
};
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub payments: Arc<PaymentOrderManager>,
    /// Present when running against Postgres; used by the readiness probe.
    pub db: Option<Database>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let razorpay = RazorpayClient::new(config.razorpay.clone())?;
        if razorpay.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!("Razorpay credentials not configured; checkout will fail");
        }
        let gateway: Arc<dyn PaymentGateway> = Arc::new(razorpay);

        let (repos, db) = match config.storage {
            StorageBackend::Postgres => {
                let db_config = config.database.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("database configuration is missing"))
                })?;

                let db = Database::new(
                    db_config.url.expose_secret(),
                    db_config.max_connections,
                    db_config.min_connections,
                    config.ledger.clone(),
                )
                .await?;
                db.run_migrations().await?;

                (Repositories::from_store(Arc::new(db.clone())), Some(db))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                (Repositories::from_store(Arc::new(InMemoryStore::new())), None)
            }
        };

        Self::build_with(config, repos, gateway, db).await
    }

    /// Build around explicit stores and gateway.
    pub async fn build_with(
        config: Config,
        repos: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        db: Option<Database>,
    ) -> Result<Self, AppError> {
        let state = AppState {
            payments: Arc::new(PaymentOrderManager::new(repos, gateway)),
            config: config.clone(),
            db,
        };

        // Port 0 picks a random port, used by tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(service = %config.service_name, port, "HTTP listener bound");

        Ok(Self {
            port,
            listener,
            router: router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route("/payments/:intent_id", get(handlers::payments::get_payment))
        .route(
            "/payments/amount/:payment_type/:target_id",
            get(handlers::payments::quote_amount),
        )
        .route("/coupons/apply", post(handlers::coupons::apply_coupon))
        .route("/coupons/:payment_type", get(handlers::coupons::list_coupons))
        .route("/wallets", post(handlers::wallets::create_wallet))
        .route("/wallets/me", get(handlers::wallets::get_my_wallet))
        .route(
            "/wallets/me/transactions",
            get(handlers::wallets::list_my_transactions),
        )
        .route(
            "/wallets/me/payments",
            post(handlers::wallets::pay_from_wallet),
        )
        .route(
            "/admin/wallets/:wallet_id/top-up",
            post(handlers::admin::top_up_wallet),
        )
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                    admin_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
