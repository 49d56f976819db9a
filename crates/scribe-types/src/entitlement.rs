//! Entitlement and feature types

use serde::{Deserialize, Serialize};

use crate::{Tier, TierLimits, UsageCounter};

/// Gated features of the writing product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    /// Owned documents (metered, not periodic)
    Documents,
    /// AI writing suggestions (metered per period)
    AiSuggestions,
    /// Plagiarism scans (metered per period)
    PlagiarismScans,
    /// Real-time collaboration (capability flag)
    Collaboration,
    /// Thesis templates (capability flag)
    Templates,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Self::Documents,
        Self::AiSuggestions,
        Self::PlagiarismScans,
        Self::Collaboration,
        Self::Templates,
    ];

    /// Get the feature ID string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::AiSuggestions => "aiSuggestions",
            Self::PlagiarismScans => "plagiarismScans",
            Self::Collaboration => "collaboration",
            Self::Templates => "templates",
        }
    }

    /// The usage counter backing this feature, if it is metered
    pub const fn counter(&self) -> Option<UsageCounter> {
        match self {
            Self::Documents => Some(UsageCounter::Documents),
            Self::AiSuggestions => Some(UsageCounter::AiSuggestions),
            Self::PlagiarismScans => Some(UsageCounter::PlagiarismScans),
            Self::Collaboration | Self::Templates => None,
        }
    }

    /// Whether the feature is a countable quota rather than a flag
    pub const fn is_countable(&self) -> bool {
        self.counter().is_some()
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Feature {
    type Err = FeatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "documents" => Ok(Self::Documents),
            "aisuggestions" => Ok(Self::AiSuggestions),
            "plagiarismscans" => Ok(Self::PlagiarismScans),
            "collaboration" => Ok(Self::Collaboration),
            "templates" => Ok(Self::Templates),
            _ => Err(FeatureParseError(s.to_string())),
        }
    }
}

/// Error parsing a feature name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureParseError(pub String);

impl std::fmt::Display for FeatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown feature: {}", self.0)
    }
}

impl std::error::Error for FeatureParseError {}

/// Remaining quota for a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Limited(u64),
    Unlimited,
}

impl Remaining {
    pub const fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl Serialize for Remaining {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Limited(n) => serializer.serialize_u64(*n),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    /// Quota for the period is used up
    LimitExceeded,
    /// The tier does not include the capability
    NotIncluded,
    /// Usage state could not be read
    BackendUnavailable,
}

/// Resolved allow/deny decision for a user and feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub feature: Feature,
    /// Tier the decision was evaluated against
    pub tier: Tier,
    pub allowed: bool,
    pub remaining: Remaining,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DecisionReason>,
}

impl AccessDecision {
    /// Evaluate a feature against tier limits and the current counter value.
    ///
    /// `used` is ignored for capability flags.
    pub fn evaluate(feature: Feature, tier: Tier, limits: &TierLimits, used: u64) -> Self {
        match feature.counter() {
            Some(counter) => {
                let limit = counter.limit(limits);
                let allowed = limit.allows(used);
                Self {
                    feature,
                    tier,
                    allowed,
                    remaining: limit.remaining(used),
                    reason: (!allowed).then_some(DecisionReason::LimitExceeded),
                }
            }
            None => {
                let allowed = match feature {
                    Feature::Collaboration => limits.has_collaboration,
                    _ => limits.has_templates,
                };
                Self {
                    feature,
                    tier,
                    allowed,
                    remaining: if allowed {
                        Remaining::Unlimited
                    } else {
                        Remaining::Limited(0)
                    },
                    reason: (!allowed).then_some(DecisionReason::NotIncluded),
                }
            }
        }
    }

    /// Decision used when usage state cannot be read and the caller fails closed
    pub fn unavailable(feature: Feature, tier: Tier) -> Self {
        Self {
            feature,
            tier,
            allowed: false,
            remaining: Remaining::Limited(0),
            reason: Some(DecisionReason::BackendUnavailable),
        }
    }
}
