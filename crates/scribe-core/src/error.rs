//! Quota errors

use scribe_types::{Feature, Tier, UserIdError};
use thiserror::Error;

/// Usage and entitlement errors
#[derive(Error, Debug)]
pub enum QuotaError {
    /// The user's tier limit for a counted feature is used up
    #[error("{} limit reached for this period", label(*feature))]
    LimitExceeded {
        feature: Feature,
        tier: Tier,
        limit: u64,
    },

    /// The feature is not part of the user's tier
    #[error("{feature} is not included in the {tier} plan")]
    NotIncluded { feature: Feature, tier: Tier },

    /// Usage or subscription state could not be read or written
    #[error("usage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Feature name that no catalog entry knows
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// Usage was recorded against a feature without a counter
    #[error("feature is not metered: {0}")]
    NotMetered(Feature),

    /// Malformed user id
    #[error("invalid user id: {0}")]
    InvalidUserId(#[from] UserIdError),

    /// Commit or release of a reservation that cannot exist
    #[error("invalid reservation: {0}")]
    InvalidReservation(String),

    /// Webhook signature or payload rejected
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuotaError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidUserId(_) | Self::InvalidReservation(_) | Self::Webhook(_) => 400,
            Self::NotIncluded { .. } => 403,
            Self::LimitExceeded { .. } => 429,
            Self::UnknownFeature(_) | Self::NotMetered(_) | Self::Internal(_) => 500,
            Self::BackendUnavailable(_) => 503,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            Self::NotIncluded { .. } => "NOT_INCLUDED",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::UnknownFeature(_) => "UNKNOWN_FEATURE",
            Self::NotMetered(_) => "NOT_METERED",
            Self::InvalidUserId(_) => "INVALID_USER_ID",
            Self::InvalidReservation(_) => "INVALID_RESERVATION",
            Self::Webhook(_) => "WEBHOOK_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<scribe_db::DbError> for QuotaError {
    fn from(err: scribe_db::DbError) -> Self {
        tracing::error!("Database error: {}", err);
        Self::BackendUnavailable(err.to_string())
    }
}

fn label(feature: Feature) -> &'static str {
    match feature {
        Feature::Documents => "Document",
        Feature::AiSuggestions => "AI suggestion",
        Feature::PlagiarismScans => "Plagiarism scan",
        Feature::Collaboration => "Collaboration",
        Feature::Templates => "Template",
    }
}
