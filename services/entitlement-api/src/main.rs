//! Scribe Entitlement API
//!
//! Usage and entitlement microservice for the thesis-writing product.
//! Callers identify the user with the `x-user-id` header.
//!
//! ## REST Endpoints
//!
//! - `GET /api/v1/entitlements/{feature}` - Check access to a feature
//! - `GET /api/v1/usage` - Usage summary
//! - `POST /api/v1/usage/{feature}` - Record one use
//! - `POST /api/v1/usage/{feature}/reserve` - Reserve one unit of quota
//! - `POST /api/v1/usage/{feature}/commit` - Commit a reservation
//! - `POST /api/v1/usage/{feature}/release` - Release a reservation
//! - `DELETE /api/v1/usage/documents` - Record a deleted document
//! - `POST /webhooks/stripe` - Stripe webhook handler
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check
//! - `GET /metrics` - Prometheus metrics

mod config;
mod error;
mod extractors;
mod handlers;
mod state;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use scribe_core::QuotaService;
use scribe_db::pg::Repositories;
use scribe_db::{PoolOptions, SubscriptionRepository, UsageRepository};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::handlers::{health, ready};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("entitlement_api=debug".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Scribe Entitlement API");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        http_port = config.http_port,
        tier_cache = config.quota.tier_cache_ttl.is_some(),
        priced_tiers = config.quota.price_tiers.len(),
        "Configuration loaded"
    );

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    // Create database pool
    let pool = scribe_db::create_pool_with_options(
        &config.database_url,
        PoolOptions {
            max_connections: config.db_max_connections,
            ..PoolOptions::default()
        },
    )
    .await?;
    tracing::info!("Database pool created");

    if config.run_migrations {
        scribe_db::run_migrations(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    // Create repositories and the quota service
    let repos = Repositories::new(pool.clone());
    let quota = QuotaService::new(
        Arc::new(repos.subscriptions),
        Arc::new(repos.usage),
        &config.quota,
    );

    // Create application state
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let state = AppState::new(quota, Some(pool), config);

    // Build HTTP router
    let app = build_router(state, metrics_handle);

    run_http_server(app, http_addr).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

pub(crate) fn build_router<S, U>(
    state: AppState<S, U>,
    metrics_handle: Option<PrometheusHandle>,
) -> Router
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let request_timeout = state.request_timeout();

    // API v1 routes
    let api_v1 = Router::new()
        .route(
            "/entitlements/{feature}",
            get(handlers::check_entitlement::<S, U>),
        )
        .route("/usage", get(handlers::get_usage::<S, U>))
        // Static segment wins over the {feature} capture
        .route("/usage/documents", delete(handlers::release_document::<S, U>))
        .route("/usage/{feature}", post(handlers::record_usage::<S, U>))
        .route(
            "/usage/{feature}/reserve",
            post(handlers::reserve_usage::<S, U>),
        )
        .route(
            "/usage/{feature}/commit",
            post(handlers::commit_usage::<S, U>),
        )
        .route(
            "/usage/{feature}/release",
            post(handlers::release_usage::<S, U>),
        );

    // Webhook route (separate - uses raw body, no JSON parsing)
    let webhook_routes =
        Router::new().route("/webhooks/stripe", post(handlers::stripe_webhook::<S, U>));

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready::<S, U>));

    // Metrics route (no timeout)
    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Build middleware stack (order matters - outermost first)
    let middleware = ServiceBuilder::new()
        // Request ID propagation (outermost)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        // Tracing with request details
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // Request timeout (innermost - closest to handler)
        .layer(TimeoutLayer::new(request_timeout));

    // Combine all routes
    Router::new()
        .nest("/api/v1", api_v1)
        .merge(webhook_routes)
        .layer(middleware)
        .merge(health_routes) // Health routes without timeout
        .with_state(state)
        .merge(metrics_route) // Metrics route without timeout
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let service: IntoMakeServiceWithConnectInfo<Router, SocketAddr> =
        app.into_make_service_with_connect_info();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    // Checks sit in front of every gated action, so most should finish well under 50ms
    let quota_latency_buckets = &[0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

    let builder = PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("scribe_operation_duration_seconds".to_string()),
        quota_latency_buckets,
    )?;

    let handle = builder.install_recorder()?;

    // Register metrics with descriptions
    metrics::describe_counter!(
        "scribe_entitlement_checks_total",
        "Total entitlement checks by feature and outcome"
    );
    metrics::describe_counter!(
        "scribe_usage_recorded_total",
        "Total uses recorded by feature"
    );
    metrics::describe_counter!(
        "scribe_quota_denied_total",
        "Total requests denied by quota or tier"
    );
    metrics::describe_counter!(
        "scribe_webhooks_processed_total",
        "Total billing webhooks processed by outcome"
    );
    metrics::describe_histogram!(
        "scribe_operation_duration_seconds",
        "Quota operation latency in seconds by operation type"
    );

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
