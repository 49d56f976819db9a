//! Common error types

use thiserror::Error;

/// Errors parsing stored or configured values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScribeError {
    /// Invalid tier
    #[error("invalid tier: {0}")]
    InvalidTier(String),

    /// Invalid subscription status
    #[error("invalid subscription status: {0}")]
    InvalidStatus(String),
}
