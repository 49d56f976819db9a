//! Stripe webhook handler

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use scribe_core::QuotaError;
use scribe_db::{SubscriptionRepository, UsageRepository};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::handlers::shared::record_op_duration;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

/// POST /webhooks/stripe
///
/// Verifies the `stripe-signature` header against the raw body. Events for
/// unknown customers and unhandled event types are acknowledged with 200 so
/// the provider does not retry them.
pub async fn stripe_webhook<S, U>(
    State(state): State<AppState<S, U>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>>
where
    S: SubscriptionRepository + 'static,
    U: UsageRepository + 'static,
{
    let start = Instant::now();

    // Extract Stripe signature header
    let Some(sig_header) = headers.get("stripe-signature") else {
        tracing::warn!("Missing Stripe-Signature header");
        metrics::counter!("scribe_webhooks_processed_total", "status" => "rejected").increment(1);
        return Err(QuotaError::Webhook("missing stripe-signature header".into()).into());
    };

    let Ok(signature) = sig_header.to_str() else {
        tracing::warn!("Invalid Stripe-Signature header encoding");
        metrics::counter!("scribe_webhooks_processed_total", "status" => "rejected").increment(1);
        return Err(ApiError::BadRequest("stripe-signature is not valid text".into()));
    };

    match state.quota.process_webhook(&body, signature).await {
        Ok(outcome) => {
            tracing::info!(outcome = outcome.as_str(), "Webhook processed");
            metrics::counter!("scribe_webhooks_processed_total", "status" => outcome.as_str())
                .increment(1);
            record_op_duration("process_webhook", start, true);

            Ok(Json(WebhookResponse { received: true }))
        }
        Err(e) => {
            let status = if matches!(e, QuotaError::Webhook(_)) {
                tracing::warn!(error = %e, "Webhook rejected");
                "rejected"
            } else {
                "error"
            };
            metrics::counter!("scribe_webhooks_processed_total", "status" => status).increment(1);
            record_op_duration("process_webhook", start, false);

            Err(e.into())
        }
    }
}
