//! Shared handler utilities
//!
//! Path parsing and metrics helpers used across handlers.

use std::time::Instant;

use scribe_core::QuotaError;
use scribe_types::Feature;

use crate::error::ApiError;

/// Maximum length of a feature path segment echoed back in errors
const MAX_FEATURE_LEN: usize = 64;

// ============================================================================
// Input Validation
// ============================================================================

/// Parse a feature from a path segment.
///
/// Unknown names are a caller bug in the surrounding application, so they
/// surface as `UnknownFeature` (500) rather than a client error.
pub fn parse_feature(raw: &str) -> Result<Feature, ApiError> {
    if raw.len() > MAX_FEATURE_LEN {
        return Err(ApiError::BadRequest(format!(
            "Feature name too long (max {MAX_FEATURE_LEN} chars)"
        )));
    }

    raw.parse::<Feature>()
        .map_err(|e| QuotaError::UnknownFeature(e.0).into())
}

// ============================================================================
// Metrics Helpers
// ============================================================================

/// Record operation duration with result label.
///
/// Labels: operation, result (ok/err)
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "err" };
    metrics::histogram!(
        "scribe_operation_duration_seconds",
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}

/// Count a request turned away by a quota or capability check
#[inline]
pub fn record_denied(feature: Feature) {
    metrics::counter!("scribe_quota_denied_total", "feature" => feature.as_str()).increment(1);
}
