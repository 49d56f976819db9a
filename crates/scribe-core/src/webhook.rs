//! Stripe webhook handling

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Months, TimeZone, Utc};
use hmac::{Hmac, Mac};
use scribe_db::{LinkCustomer, SubscriptionRepository, SubscriptionRow, UpsertSubscription};
use scribe_types::{calendar_period_start, SubscriptionStatus, Tier, UserId, USAGE_PERIOD_MONTHS};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, error, info, instrument, warn};

use crate::{QuotaConfig, QuotaError, TierResolver};

/// Webhook event types we handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    /// Checkout session completed
    CheckoutSessionCompleted,
    /// Customer subscription created
    CustomerSubscriptionCreated,
    /// Customer subscription updated
    CustomerSubscriptionUpdated,
    /// Customer subscription deleted
    CustomerSubscriptionDeleted,
    /// Invoice paid
    InvoicePaid,
    /// Invoice payment failed
    InvoicePaymentFailed,
    /// Unknown event type
    Unknown(String),
}

impl From<&str> for WebhookEventType {
    fn from(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.created" => Self::CustomerSubscriptionCreated,
            "customer.subscription.updated" => Self::CustomerSubscriptionUpdated,
            "customer.subscription.deleted" => Self::CustomerSubscriptionDeleted,
            "invoice.paid" | "invoice.payment_succeeded" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Parsed webhook event
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Event ID
    pub id: String,
    /// Event type
    pub event_type: WebhookEventType,
    /// Event data
    pub data: WebhookEventData,
    /// When the event was created (Unix timestamp)
    pub created: i64,
}

/// Webhook event data
#[derive(Debug, Clone)]
pub enum WebhookEventData {
    /// Checkout session data
    CheckoutSession(CheckoutSessionData),
    /// Subscription data
    Subscription(SubscriptionData),
    /// Invoice data
    Invoice(InvoiceData),
    /// Events we do not act on
    Ignored,
}

/// Checkout session completed data
#[derive(Debug, Clone)]
pub struct CheckoutSessionData {
    /// Session ID
    pub session_id: String,
    /// Our user id, passed to checkout as `client_reference_id`
    pub client_reference_id: Option<String>,
    /// Customer ID
    pub customer_id: Option<String>,
    /// Subscription ID
    pub subscription_id: Option<String>,
}

/// Subscription event data
#[derive(Debug, Clone)]
pub struct SubscriptionData {
    /// Subscription ID
    pub subscription_id: String,
    /// Customer ID
    pub customer_id: String,
    /// Stripe status string
    pub status: String,
    /// Price of the first subscription item
    pub price_id: Option<String>,
    /// User id from subscription metadata, if checkout set one
    pub metadata_user_id: Option<String>,
    /// Current period start
    pub period_start: Option<DateTime<Utc>>,
    /// Current period end
    pub period_end: Option<DateTime<Utc>>,
}

/// Invoice event data
#[derive(Debug, Clone)]
pub struct InvoiceData {
    /// Invoice ID
    pub invoice_id: String,
    /// Customer ID
    pub customer_id: String,
}

/// Verifies Stripe signatures and parses events
#[derive(Clone)]
pub struct WebhookVerifier {
    webhook_secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    /// Create a new webhook verifier
    pub fn new(webhook_secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            tolerance,
        }
    }

    /// Verify and parse a webhook payload
    #[instrument(skip(self, payload, signature))]
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, QuotaError> {
        self.verify_signature(payload, signature, Utc::now().timestamp())?;
        parse_event(payload)
    }

    /// Verify a `t=<ts>,v1=<hex>` signature header against `now` (Unix seconds)
    pub fn verify_signature(
        &self,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> Result<(), QuotaError> {
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => signatures.push(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            warn!("Missing timestamp in webhook signature");
            QuotaError::Webhook("Missing timestamp".to_string())
        })?;

        if signatures.is_empty() {
            warn!("Missing v1 signature in webhook signature");
            return Err(QuotaError::Webhook("Missing signature".to_string()));
        }

        let expected = self.sign(timestamp, payload)?;

        // Stripe sends several v1 entries while a secret is being rolled
        if !signatures
            .iter()
            .any(|sig| constant_time_eq(sig.as_bytes(), expected.as_bytes()))
        {
            error!("Webhook signature verification failed");
            return Err(QuotaError::Webhook(
                "Signature verification failed".to_string(),
            ));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| QuotaError::Webhook("Invalid timestamp format".to_string()))?;
        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        if (now - ts).abs() > tolerance {
            warn!(timestamp = ts, now = now, "Webhook timestamp outside tolerance");
            return Err(QuotaError::Webhook("Timestamp too old".to_string()));
        }

        Ok(())
    }

    /// Hex HMAC-SHA256 of `"<timestamp>.<payload>"`
    pub fn sign(&self, timestamp: &str, payload: &[u8]) -> Result<String, QuotaError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| QuotaError::Internal("HMAC error".to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

/// Parse an already verified event body
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, QuotaError> {
    let raw_event: RawStripeEvent =
        serde_json::from_slice(payload).map_err(|e| QuotaError::Webhook(e.to_string()))?;

    debug!(event_id = %raw_event.id, event_type = %raw_event.event_type, "Parsed webhook event");

    let event_type = WebhookEventType::from(raw_event.event_type.as_str());
    let data = parse_event_data(&event_type, raw_event.data.object)?;

    Ok(WebhookEvent {
        id: raw_event.id,
        event_type,
        data,
        created: raw_event.created,
    })
}

fn parse_event_data(
    event_type: &WebhookEventType,
    object: serde_json::Value,
) -> Result<WebhookEventData, QuotaError> {
    let bad_payload = |e: serde_json::Error| QuotaError::Webhook(e.to_string());

    match event_type {
        WebhookEventType::CheckoutSessionCompleted => {
            let session: RawCheckoutSession = serde_json::from_value(object).map_err(bad_payload)?;
            Ok(WebhookEventData::CheckoutSession(CheckoutSessionData {
                session_id: session.id,
                client_reference_id: session.client_reference_id,
                customer_id: session.customer.map(StripeRef::into_id),
                subscription_id: session.subscription.map(StripeRef::into_id),
            }))
        }
        WebhookEventType::CustomerSubscriptionCreated
        | WebhookEventType::CustomerSubscriptionUpdated
        | WebhookEventType::CustomerSubscriptionDeleted => {
            let sub: RawSubscription = serde_json::from_value(object).map_err(bad_payload)?;
            let item = sub.items.data.into_iter().next();
            let period_start = sub
                .current_period_start
                .or_else(|| item.as_ref().and_then(|i| i.current_period_start));
            let period_end = sub
                .current_period_end
                .or_else(|| item.as_ref().and_then(|i| i.current_period_end));

            Ok(WebhookEventData::Subscription(SubscriptionData {
                subscription_id: sub.id,
                customer_id: sub.customer.into_id(),
                status: sub.status,
                price_id: item.and_then(|i| i.price).map(|p| p.id),
                metadata_user_id: sub
                    .metadata
                    .get("userId")
                    .or_else(|| sub.metadata.get("user_id"))
                    .cloned(),
                period_start: period_start.and_then(from_unix),
                period_end: period_end.and_then(from_unix),
            }))
        }
        WebhookEventType::InvoicePaid | WebhookEventType::InvoicePaymentFailed => {
            let inv: RawInvoice = serde_json::from_value(object).map_err(bad_payload)?;
            Ok(WebhookEventData::Invoice(InvoiceData {
                invoice_id: inv.id,
                customer_id: inv.customer.into_id(),
            }))
        }
        WebhookEventType::Unknown(kind) => {
            info!(event_type = %kind, "Received unhandled webhook event type");
            Ok(WebhookEventData::Ignored)
        }
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Constant-time comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// What processing an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The user's subscription changed
    Applied { user_id: UserId },
    /// The event names a customer we have no subscription for
    UnknownCustomer { customer_id: String },
    /// Nothing to do
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::UnknownCustomer { .. } => "unknown_customer",
            Self::Ignored => "ignored",
        }
    }
}

/// Applies verified billing events to stored subscriptions
pub struct SubscriptionLifecycle<S: SubscriptionRepository> {
    repo: Arc<S>,
    resolver: TierResolver<S>,
    price_tiers: HashMap<String, Tier>,
}

impl<S: SubscriptionRepository> SubscriptionLifecycle<S> {
    /// Create a lifecycle handler. `resolver` must share the cache used by
    /// entitlement checks so changes are visible immediately.
    pub fn new(repo: Arc<S>, resolver: TierResolver<S>, config: &QuotaConfig) -> Self {
        Self {
            repo,
            resolver,
            price_tiers: config.price_tiers.clone(),
        }
    }

    /// Apply one event
    #[instrument(skip_all, fields(event_id = %event.id, event_type = ?event.event_type))]
    pub async fn handle(&self, event: &WebhookEvent) -> Result<WebhookOutcome, QuotaError> {
        let outcome = match (&event.event_type, &event.data) {
            (WebhookEventType::CheckoutSessionCompleted, WebhookEventData::CheckoutSession(data)) => {
                self.on_checkout_completed(data).await?
            }
            (WebhookEventType::CustomerSubscriptionDeleted, WebhookEventData::Subscription(data)) => {
                self.on_subscription_deleted(data).await?
            }
            (_, WebhookEventData::Subscription(data)) => self.on_subscription_changed(data).await?,
            (WebhookEventType::InvoicePaymentFailed, WebhookEventData::Invoice(data)) => {
                self.on_payment_failed(data).await?
            }
            (WebhookEventType::InvoicePaid, WebhookEventData::Invoice(data)) => {
                self.on_invoice_paid(data).await?
            }
            _ => WebhookOutcome::Ignored,
        };

        match &outcome {
            WebhookOutcome::Applied { user_id } => {
                self.resolver.invalidate(user_id).await;
                info!(user_id = %user_id, "Subscription updated from webhook");
            }
            WebhookOutcome::UnknownCustomer { customer_id } => {
                warn!(customer_id = %customer_id, "Webhook for unknown customer");
            }
            WebhookOutcome::Ignored => {}
        }

        Ok(outcome)
    }

    async fn on_checkout_completed(
        &self,
        data: &CheckoutSessionData,
    ) -> Result<WebhookOutcome, QuotaError> {
        let (Some(user_ref), Some(customer_id)) = (&data.client_reference_id, &data.customer_id)
        else {
            warn!(session_id = %data.session_id, "Checkout session without user or customer");
            return Ok(WebhookOutcome::Ignored);
        };
        // Retrying cannot fix a bad reference, so acknowledge it
        let user_id = match UserId::parse(user_ref) {
            Ok(user_id) => user_id,
            Err(err) => {
                warn!(session_id = %data.session_id, error = %err, "Checkout session with invalid user reference");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let start = calendar_period_start(Utc::now());
        self.repo
            .link_customer(LinkCustomer {
                user_id: user_id.to_string(),
                stripe_customer_id: customer_id.clone(),
                stripe_subscription_id: data.subscription_id.clone(),
                current_period_start: start,
                current_period_end: period_end_after(start),
            })
            .await?;

        Ok(WebhookOutcome::Applied { user_id })
    }

    async fn on_subscription_changed(
        &self,
        data: &SubscriptionData,
    ) -> Result<WebhookOutcome, QuotaError> {
        let user_id = match self.repo.find_by_stripe_customer_id(&data.customer_id).await? {
            Some(row) => parse_user(&row)?,
            None => match data.metadata_user_id.as_deref().map(UserId::parse) {
                Some(Ok(user_id)) => user_id,
                Some(Err(err)) => {
                    warn!(customer_id = %data.customer_id, error = %err, "Subscription metadata has invalid user id");
                    return Ok(WebhookOutcome::UnknownCustomer {
                        customer_id: data.customer_id.clone(),
                    });
                }
                None => {
                    return Ok(WebhookOutcome::UnknownCustomer {
                        customer_id: data.customer_id.clone(),
                    })
                }
            },
        };

        let tier = match data.price_id.as_deref() {
            Some(price) => self.price_tiers.get(price).copied().unwrap_or_else(|| {
                warn!(price_id = %price, "Unknown price, using FREE");
                Tier::Free
            }),
            None => Tier::Free,
        };
        let status = SubscriptionStatus::from_provider(&data.status);
        let start = data
            .period_start
            .unwrap_or_else(|| calendar_period_start(Utc::now()));
        let end = data.period_end.unwrap_or_else(|| period_end_after(start));

        self.repo
            .upsert(UpsertSubscription {
                user_id: user_id.to_string(),
                tier: tier.as_str().to_string(),
                status: status.as_str().to_string(),
                stripe_customer_id: Some(data.customer_id.clone()),
                stripe_subscription_id: Some(data.subscription_id.clone()),
                current_period_start: start,
                current_period_end: end,
            })
            .await?;

        Ok(WebhookOutcome::Applied { user_id })
    }

    async fn on_subscription_deleted(
        &self,
        data: &SubscriptionData,
    ) -> Result<WebhookOutcome, QuotaError> {
        let Some(row) = self.repo.find_by_stripe_customer_id(&data.customer_id).await? else {
            return Ok(WebhookOutcome::UnknownCustomer {
                customer_id: data.customer_id.clone(),
            });
        };
        let user_id = parse_user(&row)?;
        self.repo.cancel(user_id.as_str()).await?;
        Ok(WebhookOutcome::Applied { user_id })
    }

    async fn on_payment_failed(&self, data: &InvoiceData) -> Result<WebhookOutcome, QuotaError> {
        let Some(row) = self.repo.find_by_stripe_customer_id(&data.customer_id).await? else {
            return Ok(WebhookOutcome::UnknownCustomer {
                customer_id: data.customer_id.clone(),
            });
        };
        let user_id = parse_user(&row)?;
        if row.status() == Some(SubscriptionStatus::Canceled) {
            return Ok(WebhookOutcome::Ignored);
        }
        self.repo
            .update_status(user_id.as_str(), SubscriptionStatus::PastDue.as_str())
            .await?;
        Ok(WebhookOutcome::Applied { user_id })
    }

    async fn on_invoice_paid(&self, data: &InvoiceData) -> Result<WebhookOutcome, QuotaError> {
        let Some(row) = self.repo.find_by_stripe_customer_id(&data.customer_id).await? else {
            return Ok(WebhookOutcome::UnknownCustomer {
                customer_id: data.customer_id.clone(),
            });
        };
        if row.status() != Some(SubscriptionStatus::PastDue) {
            debug!(invoice_id = %data.invoice_id, "Invoice paid, subscription already current");
            return Ok(WebhookOutcome::Ignored);
        }
        let user_id = parse_user(&row)?;
        self.repo
            .update_status(user_id.as_str(), SubscriptionStatus::Active.as_str())
            .await?;
        Ok(WebhookOutcome::Applied { user_id })
    }
}

fn parse_user(row: &SubscriptionRow) -> Result<UserId, QuotaError> {
    UserId::parse(&row.user_id)
        .map_err(|e| QuotaError::Internal(format!("stored user id: {e}")))
}

fn period_end_after(start: DateTime<Utc>) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(USAGE_PERIOD_MONTHS))
        .unwrap_or(start)
}

impl<S: SubscriptionRepository> std::fmt::Debug for SubscriptionLifecycle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionLifecycle")
            .field("prices", &self.price_tiers.len())
            .finish()
    }
}

// Raw Stripe event for parsing
#[derive(Debug, Deserialize)]
struct RawStripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
    #[serde(default)]
    created: i64,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// An id field Stripe may send either bare or expanded
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StripeRef {
    Id(String),
    Object { id: String },
}

impl StripeRef {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    client_reference_id: Option<String>,
    customer: Option<StripeRef>,
    subscription: Option<StripeRef>,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    customer: StripeRef,
    status: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    items: RawList<RawSubscriptionItem>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawList<T> {
    data: Vec<T>,
}

impl<T> Default for RawList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct RawSubscriptionItem {
    price: Option<RawPrice>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawInvoice {
    id: String,
    customer: StripeRef,
}
