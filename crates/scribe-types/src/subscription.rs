//! Subscription types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Tier, UserId};

/// Subscription status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Subscription is active
    #[default]
    Active,
    /// Payment is past due; the tier stays in effect
    PastDue,
    /// Subscription was canceled; the user falls back to FREE
    Canceled,
}

impl SubscriptionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::PastDue => "PAST_DUE",
            Self::Canceled => "CANCELED",
        }
    }

    /// Map a billing provider status string
    pub fn from_provider(status: &str) -> Self {
        match status {
            "past_due" | "unpaid" | "incomplete" => Self::PastDue,
            "canceled" | "incomplete_expired" => Self::Canceled,
            _ => Self::Active,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = crate::ScribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "PAST_DUE" => Ok(Self::PastDue),
            "CANCELED" | "CANCELLED" => Ok(Self::Canceled),
            _ => Err(crate::ScribeError::InvalidStatus(s.to_string())),
        }
    }
}

/// User subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// User who owns the subscription
    pub user_id: UserId,
    /// Purchased tier
    pub tier: Tier,
    /// Subscription status
    pub status: SubscriptionStatus,
    /// Current billing period start
    pub current_period_start: DateTime<Utc>,
    /// Current billing period end
    pub current_period_end: DateTime<Utc>,
}

impl Subscription {
    /// Implicit subscription of a user who never checked out
    pub fn free(user_id: UserId, now: DateTime<Utc>) -> Self {
        let start = crate::calendar_period_start(now);
        let end = start
            .checked_add_months(chrono::Months::new(crate::USAGE_PERIOD_MONTHS))
            .unwrap_or(start);
        Self {
            user_id,
            tier: Tier::Free,
            status: SubscriptionStatus::Active,
            current_period_start: start,
            current_period_end: end,
        }
    }

    /// Tier whose limits apply right now
    pub fn effective_tier(&self) -> Tier {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::PastDue => self.tier,
            SubscriptionStatus::Canceled => Tier::Free,
        }
    }
}
