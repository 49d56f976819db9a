//! Entitlement check handler

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use scribe_db::{SubscriptionRepository, UsageRepository};
use scribe_types::AccessDecision;
use tracing::instrument;

use crate::error::ApiResult;
use crate::extractors::CurrentUser;
use crate::handlers::shared::{parse_feature, record_denied, record_op_duration};
use crate::state::AppState;

/// GET /api/v1/entitlements/{feature}
///
/// Always 200: a denial is a decision, not an error.
#[instrument(skip(state), fields(user_id = %user.0))]
pub async fn check_entitlement<S, U>(
    State(state): State<AppState<S, U>>,
    user: CurrentUser,
    Path(feature): Path<String>,
) -> ApiResult<Json<AccessDecision>>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let start = Instant::now();
    let feature = parse_feature(&feature)?;

    let decision = state.quota.check_access(&user.0, feature).await;

    let allowed = if decision.allowed { "true" } else { "false" };
    metrics::counter!(
        "scribe_entitlement_checks_total",
        "feature" => feature.as_str(),
        "allowed" => allowed
    )
    .increment(1);
    if !decision.allowed {
        record_denied(feature);
    }
    record_op_duration("check_access", start, true);

    Ok(Json(decision))
}
