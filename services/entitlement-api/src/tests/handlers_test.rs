//! Handler tests driven through the full router

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use scribe_core::WebhookVerifier;
use scribe_types::{SubscriptionStatus, Tier, UsageStats, UserId};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{test_state, TestState, WEBHOOK_SECRET};
use crate::build_router;

fn router(state: TestState) -> Router {
    build_router(state, None)
}

fn get(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, user: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", user);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn stats_with(user: &str, f: impl FnOnce(&mut UsageStats)) -> UsageStats {
    let mut stats = UsageStats::new(UserId::parse(user).unwrap(), Utc::now());
    f(&mut stats);
    stats
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_returns_ok() {
    let (state, _, _) = test_state();
    let response = router(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_ready_without_database() {
    let (state, _, _) = test_state();
    let response = router(state)
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["database"], "not_configured");
}

// ============================================================================
// Identity
// ============================================================================

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let (state, _, _) = test_state();
    let request = Request::builder()
        .uri("/api/v1/entitlements/templates")
        .body(Body::empty())
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "MISSING_USER_ID");
}

#[tokio::test]
async fn test_malformed_user_id_is_bad_request() {
    let (state, _, _) = test_state();
    let response = router(state)
        .oneshot(get("/api/v1/entitlements/templates", "two parts"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_USER_ID");
}

// ============================================================================
// Entitlements
// ============================================================================

#[tokio::test]
async fn test_free_user_lacks_collaboration() {
    let (state, _, _) = test_state();
    let response = router(state)
        .oneshot(get("/api/v1/entitlements/collaboration", "ada"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["remaining"], 0);
    assert_eq!(body["reason"], "NOT_INCLUDED");
    assert_eq!(body["tier"], "FREE");
}

#[tokio::test]
async fn test_premium_scans_report_unlimited() {
    let (state, subs, _) = test_state();
    subs.insert("bo", Tier::Premium, SubscriptionStatus::Active);

    let response = router(state)
        .oneshot(get("/api/v1/entitlements/plagiarismScans", "bo"))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["remaining"], "unlimited");
}

#[tokio::test]
async fn test_unknown_feature_is_server_error() {
    let (state, _, _) = test_state();
    let response = router(state)
        .oneshot(get("/api/v1/entitlements/telepathy", "ada"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["code"], "UNKNOWN_FEATURE");
}

// ============================================================================
// Usage
// ============================================================================

#[tokio::test]
async fn test_last_free_suggestion_then_limit() {
    let (state, _, usage) = test_state();
    usage.insert(&stats_with("cy", |s| s.suggestions_used_in_period = 49));
    let app = router(state);

    let response = app
        .clone()
        .oneshot(post("/api/v1/usage/aiSuggestions", "cy", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["suggestionsUsedInPeriod"], 50);

    let response = app
        .oneshot(post("/api/v1/usage/aiSuggestions/reserve", "cy", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(response).await;
    assert_eq!(body["code"], "LIMIT_EXCEEDED");
    assert_eq!(body["error"], "AI suggestion limit reached for this period");
    assert_eq!(usage.get("cy").unwrap().suggestions_used_in_period, 50);
}

#[tokio::test]
async fn test_reserve_then_commit() {
    let (state, subs, usage) = test_state();
    subs.insert("dee", Tier::Pro, SubscriptionStatus::Active);
    let app = router(state);

    let response = app
        .clone()
        .oneshot(post("/api/v1/usage/plagiarismScans/reserve", "dee", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reservation = json_body(response).await;
    assert_eq!(reservation["used"], 1);
    assert_eq!(reservation["limit"], 10);

    let response = app
        .oneshot(post(
            "/api/v1/usage/plagiarismScans/commit",
            "dee",
            Some(&reservation),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats = usage.get("dee").unwrap();
    assert_eq!(stats.scans_used_in_period, 1);
    assert_eq!(stats.total_scans, 1);
}

#[tokio::test]
async fn test_reserve_then_release_returns_unit() {
    let (state, _, usage) = test_state();
    let app = router(state);

    let response = app
        .clone()
        .oneshot(post("/api/v1/usage/plagiarismScans/reserve", "eli", None))
        .await
        .unwrap();
    let reservation = json_body(response).await;

    let response = app
        .oneshot(post(
            "/api/v1/usage/plagiarismScans/release",
            "eli",
            Some(&reservation),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats = usage.get("eli").unwrap();
    assert_eq!(stats.scans_used_in_period, 0);
    assert_eq!(stats.total_scans, 0);
}

#[tokio::test]
async fn test_commit_of_foreign_reservation_is_rejected() {
    let (state, _, usage) = test_state();
    let app = router(state);

    let response = app
        .clone()
        .oneshot(post("/api/v1/usage/aiSuggestions/reserve", "fay", None))
        .await
        .unwrap();
    let reservation = json_body(response).await;

    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/usage/aiSuggestions/commit",
            "gus",
            Some(&reservation),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_RESERVATION");

    // Settling on the wrong feature route is rejected too
    let response = app
        .oneshot(post(
            "/api/v1/usage/plagiarismScans/commit",
            "fay",
            Some(&reservation),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(usage.get("fay").unwrap().total_suggestions, 0);
}

#[tokio::test]
async fn test_replayed_commit_is_rejected() {
    let (state, _, usage) = test_state();
    let app = router(state);

    let response = app
        .clone()
        .oneshot(post("/api/v1/usage/aiSuggestions/reserve", "jan", None))
        .await
        .unwrap();
    let reservation = json_body(response).await;
    assert!(reservation["id"].is_string());

    let commit = || post("/api/v1/usage/aiSuggestions/commit", "jan", Some(&reservation));
    let response = app.clone().oneshot(commit()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(commit()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_RESERVATION");

    let stats = usage.get("jan").unwrap();
    assert_eq!(stats.suggestions_used_in_period, 1);
    assert_eq!(stats.total_suggestions, 1);
}

#[tokio::test]
async fn test_release_of_unissued_reservation_keeps_usage() {
    let (state, subs, usage) = test_state();
    subs.insert("kit", Tier::Pro, SubscriptionStatus::Active);
    let app = router(state);

    let response = app
        .clone()
        .oneshot(post("/api/v1/usage/plagiarismScans", "kit", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let forged = json!({
        "id": uuid::Uuid::new_v4(),
        "userId": "kit",
        "feature": "plagiarismScans",
        "tier": "PRO",
        "periodStart": Utc::now(),
        "used": 1,
        "limit": 10,
    });
    let response = app
        .oneshot(post(
            "/api/v1/usage/plagiarismScans/release",
            "kit",
            Some(&forged),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stats = usage.get("kit").unwrap();
    assert_eq!(stats.scans_used_in_period, 1);
    assert_eq!(stats.total_scans, 1);
}

#[tokio::test]
async fn test_boolean_feature_cannot_be_recorded() {
    let (state, _, _) = test_state();
    let response = router(state)
        .oneshot(post("/api/v1/usage/templates", "hal", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["code"], "NOT_METERED");
}

#[tokio::test]
async fn test_delete_document_decrements_owned() {
    let (state, _, usage) = test_state();
    usage.insert(&stats_with("ivy", |s| {
        s.documents_owned = 3;
        s.total_documents = 5;
    }));

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/usage/documents")
        .header("x-user-id", "ivy")
        .body(Body::empty())
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stats = usage.get("ivy").unwrap();
    assert_eq!(stats.documents_owned, 2);
    assert_eq!(stats.total_documents, 5);
}

#[tokio::test]
async fn test_usage_summary_lists_every_feature() {
    let (state, subs, _) = test_state();
    subs.insert("jo", Tier::Pro, SubscriptionStatus::PastDue);

    let response = router(state)
        .oneshot(get("/api/v1/usage", "jo"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["tier"], "PRO");
    assert_eq!(body["features"].as_array().unwrap().len(), 5);
    assert_eq!(body["limits"]["maxPlagiarismScansPerPeriod"], 10);
}

// ============================================================================
// Webhook
// ============================================================================

fn signed_request(event: &Value, secret: &str) -> Request<Body> {
    let payload = event.to_string();
    let ts = Utc::now().timestamp().to_string();
    let sig = WebhookVerifier::new(secret, Duration::from_secs(300))
        .sign(&ts, payload.as_bytes())
        .unwrap();

    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("stripe-signature", format!("t={ts},v1={sig}"))
        .body(Body::from(payload))
        .unwrap()
}

fn checkout_event(user: &str, customer: &str) -> Value {
    json!({
        "id": "evt_checkout",
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "data": { "object": { "id": "cs_1", "client_reference_id": user, "customer": customer } }
    })
}

#[tokio::test]
async fn test_webhook_links_customer() {
    let (state, subs, _) = test_state();
    let response = router(state)
        .oneshot(signed_request(&checkout_event("kim", "cus_kim"), WEBHOOK_SECRET))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["received"], true);
    assert_eq!(
        subs.get("kim").unwrap().stripe_customer_id.as_deref(),
        Some("cus_kim")
    );
}

#[tokio::test]
async fn test_webhook_unknown_customer_is_acknowledged() {
    let (state, _, _) = test_state();
    let event = json!({
        "id": "evt_failed",
        "type": "invoice.payment_failed",
        "created": Utc::now().timestamp(),
        "data": { "object": { "id": "in_1", "customer": "cus_ghost" } }
    });

    let response = router(state)
        .oneshot(signed_request(&event, WEBHOOK_SECRET))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_wrong_secret_is_rejected() {
    let (state, subs, _) = test_state();
    let response = router(state)
        .oneshot(signed_request(&checkout_event("lu", "cus_lu"), "whsec_other"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "WEBHOOK_ERROR");
    assert!(subs.get("lu").is_none());
}

#[tokio::test]
async fn test_webhook_missing_signature_is_rejected() {
    let (state, _, _) = test_state();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .body(Body::from(checkout_event("mo", "cus_mo").to_string()))
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
