//! Tier catalog

use scribe_types::{Tier, TierLimits};

/// Immutable tier → limits table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierCatalog {
    limits: [TierLimits; 4],
}

impl TierCatalog {
    /// Catalog with the standard plan limits
    pub fn standard() -> Self {
        Self {
            limits: Tier::ALL.map(|tier| tier.limits()),
        }
    }

    /// Replace the limits of one tier
    pub fn with_limits(mut self, tier: Tier, limits: TierLimits) -> Self {
        self.limits[tier as usize] = limits;
        self
    }

    /// Limits for a tier
    pub fn limits_for(&self, tier: Tier) -> &TierLimits {
        &self.limits[tier as usize]
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
