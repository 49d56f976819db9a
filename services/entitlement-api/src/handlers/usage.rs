//! Usage recording and reservation handlers

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use scribe_core::{QuotaError, Reservation, UsageSummary};
use scribe_db::{SubscriptionRepository, UsageRepository};
use scribe_types::{Feature, UsageStats};
use tracing::instrument;

use crate::error::{ApiError, ApiResult};
use crate::extractors::CurrentUser;
use crate::handlers::shared::{parse_feature, record_denied, record_op_duration};
use crate::state::AppState;

/// GET /api/v1/usage
#[instrument(skip(state), fields(user_id = %user.0))]
pub async fn get_usage<S, U>(
    State(state): State<AppState<S, U>>,
    user: CurrentUser,
) -> ApiResult<Json<UsageSummary>>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let start = Instant::now();
    let result = state.quota.usage_summary(&user.0).await;
    record_op_duration("usage_summary", start, result.is_ok());

    Ok(Json(result?))
}

/// POST /api/v1/usage/{feature}
///
/// Hot path: counts one use after the action already happened.
#[instrument(skip(state), fields(user_id = %user.0))]
pub async fn record_usage<S, U>(
    State(state): State<AppState<S, U>>,
    user: CurrentUser,
    Path(feature): Path<String>,
) -> ApiResult<Json<UsageStats>>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let start = Instant::now();
    let feature = parse_feature(&feature)?;

    let result = state.quota.record_usage(&user.0, feature).await;
    record_op_duration("record_usage", start, result.is_ok());
    let stats = result?;

    metrics::counter!("scribe_usage_recorded_total", "feature" => feature.as_str()).increment(1);

    Ok(Json(stats))
}

/// POST /api/v1/usage/{feature}/reserve
#[instrument(skip(state), fields(user_id = %user.0))]
pub async fn reserve_usage<S, U>(
    State(state): State<AppState<S, U>>,
    user: CurrentUser,
    Path(feature): Path<String>,
) -> ApiResult<Json<Reservation>>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let start = Instant::now();
    let feature = parse_feature(&feature)?;

    let result = state.quota.reserve(&user.0, feature).await;
    record_op_duration("reserve", start, result.is_ok());

    match result {
        Ok(reservation) => Ok(Json(reservation)),
        Err(err) => {
            if matches!(err, QuotaError::LimitExceeded { .. }) {
                record_denied(feature);
            }
            Err(err.into())
        }
    }
}

/// POST /api/v1/usage/{feature}/commit
#[instrument(skip(state, reservation), fields(user_id = %user.0))]
pub async fn commit_usage<S, U>(
    State(state): State<AppState<S, U>>,
    user: CurrentUser,
    Path(feature): Path<String>,
    Json(reservation): Json<Reservation>,
) -> ApiResult<Json<UsageStats>>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let start = Instant::now();
    let feature = parse_feature(&feature)?;
    check_owner(&reservation, &user, feature)?;

    let result = state.quota.commit(&reservation).await;
    record_op_duration("commit", start, result.is_ok());
    let stats = result?;

    metrics::counter!("scribe_usage_recorded_total", "feature" => feature.as_str()).increment(1);

    Ok(Json(stats))
}

/// POST /api/v1/usage/{feature}/release
#[instrument(skip(state, reservation), fields(user_id = %user.0))]
pub async fn release_usage<S, U>(
    State(state): State<AppState<S, U>>,
    user: CurrentUser,
    Path(feature): Path<String>,
    Json(reservation): Json<Reservation>,
) -> ApiResult<Json<UsageStats>>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let start = Instant::now();
    let feature = parse_feature(&feature)?;
    check_owner(&reservation, &user, feature)?;

    let result = state.quota.release(&reservation).await;
    record_op_duration("release", start, result.is_ok());

    Ok(Json(result?))
}

/// DELETE /api/v1/usage/documents
#[instrument(skip(state), fields(user_id = %user.0))]
pub async fn release_document<S, U>(
    State(state): State<AppState<S, U>>,
    user: CurrentUser,
) -> ApiResult<Json<UsageStats>>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let start = Instant::now();
    let result = state.quota.release_document(&user.0).await;
    record_op_duration("release_document", start, result.is_ok());

    Ok(Json(result?))
}

/// A reservation may only be settled by its owner, on the route of its feature
fn check_owner(
    reservation: &Reservation,
    user: &CurrentUser,
    feature: Feature,
) -> Result<(), ApiError> {
    if reservation.user_id != user.0 {
        return Err(QuotaError::InvalidReservation("reservation belongs to another user".into()).into());
    }
    if reservation.feature != feature {
        return Err(QuotaError::InvalidReservation(format!(
            "reservation is for {}, not {feature}",
            reservation.feature
        ))
        .into());
    }
    Ok(())
}
