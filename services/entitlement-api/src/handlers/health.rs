//! Health check handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use scribe_db::{SubscriptionRepository, UsageRepository};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub database: &'static str,
}

/// Liveness check - always returns OK if the service is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - checks database connectivity
pub async fn ready<S, U>(
    State(state): State<AppState<S, U>>,
) -> Result<Json<ReadyResponse>, StatusCode>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let Some(pool) = &state.pool else {
        return Ok(Json(ReadyResponse {
            status: "ready",
            database: "not_configured",
        }));
    };

    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => Ok(Json(ReadyResponse {
            status: "ready",
            database: "connected",
        })),
        Err(e) => {
            tracing::error!(error = ?e, "Database health check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
