//! Subscription tier types

use serde::{Deserialize, Serialize};

/// Subscription tier levels
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Free tier - 3 documents, 50 suggestions and 1 scan per month
    #[default]
    Free,
    /// Pro tier - 20 documents, 500 suggestions and 10 scans per month
    Pro,
    /// Premium tier - unlimited usage, priority support
    Premium,
    /// Enterprise tier - unlimited usage, dedicated support
    Enterprise,
}

impl Tier {
    /// All tiers, cheapest first
    pub const ALL: [Tier; 4] = [Self::Free, Self::Pro, Self::Premium, Self::Enterprise];

    /// Get the standard limits for this tier
    pub const fn limits(&self) -> TierLimits {
        match self {
            Self::Free => TierLimits {
                max_documents: Limit::Limited(3),
                max_ai_suggestions: Limit::Limited(50),
                max_plagiarism_scans: Limit::Limited(1),
                has_collaboration: false,
                has_templates: true,
                support_level: SupportLevel::None,
            },
            Self::Pro => TierLimits {
                max_documents: Limit::Limited(20),
                max_ai_suggestions: Limit::Limited(500),
                max_plagiarism_scans: Limit::Limited(10),
                has_collaboration: true,
                has_templates: true,
                support_level: SupportLevel::Email,
            },
            Self::Premium => TierLimits {
                max_documents: Limit::Unlimited,
                max_ai_suggestions: Limit::Unlimited,
                max_plagiarism_scans: Limit::Unlimited,
                has_collaboration: true,
                has_templates: true,
                support_level: SupportLevel::Priority,
            },
            Self::Enterprise => TierLimits {
                max_documents: Limit::Unlimited,
                max_ai_suggestions: Limit::Unlimited,
                max_plagiarism_scans: Limit::Unlimited,
                has_collaboration: true,
                has_templates: true,
                support_level: SupportLevel::Dedicated,
            },
        }
    }

    /// Storage representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Pro => "PRO",
            Self::Premium => "PREMIUM",
            Self::Enterprise => "ENTERPRISE",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = crate::ScribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "PRO" | "PROFESSIONAL" => Ok(Self::Pro),
            "PREMIUM" => Ok(Self::Premium),
            "ENTERPRISE" => Ok(Self::Enterprise),
            _ => Err(crate::ScribeError::InvalidTier(s.to_string())),
        }
    }
}

/// Support level included with a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportLevel {
    None,
    Email,
    Priority,
    Dedicated,
}

/// A quota limit.
///
/// Storage and configuration use `-1` for unlimited; see [`Limit::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    /// At most this many uses
    Limited(u64),
    /// No cap
    Unlimited,
}

impl Limit {
    /// Convert from the `-1 = unlimited` representation. Any negative value is unlimited.
    pub fn from_raw(raw: i64) -> Self {
        u64::try_from(raw).map_or(Self::Unlimited, Self::Limited)
    }

    /// Convert to the `-1 = unlimited` representation
    pub fn as_raw(&self) -> i64 {
        match self {
            Self::Limited(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            Self::Unlimited => -1,
        }
    }

    /// Whether one more use is allowed at the given counter value
    pub const fn allows(&self, used: u64) -> bool {
        match self {
            Self::Limited(limit) => used < *limit,
            Self::Unlimited => true,
        }
    }

    /// Remaining uses at the given counter value
    pub const fn remaining(&self, used: u64) -> crate::Remaining {
        match self {
            Self::Limited(limit) => crate::Remaining::Limited(limit.saturating_sub(used)),
            Self::Unlimited => crate::Remaining::Unlimited,
        }
    }

    pub const fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl Serialize for Limit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_raw())
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from_raw)
    }
}

/// Numeric limits and capability flags of a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimits {
    /// Documents a user may own at once
    pub max_documents: Limit,
    /// AI suggestions per usage period
    #[serde(rename = "maxAISuggestionsPerPeriod")]
    pub max_ai_suggestions: Limit,
    /// Plagiarism scans per usage period
    #[serde(rename = "maxPlagiarismScansPerPeriod")]
    pub max_plagiarism_scans: Limit,
    pub has_collaboration: bool,
    pub has_templates: bool,
    pub support_level: SupportLevel,
}
