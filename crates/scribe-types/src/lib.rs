//! Scribe Types - Shared domain types
//!
//! This crate contains domain types used across Scribe services:
//! - User identity
//! - Subscription tiers, limits and statuses
//! - Gated features, usage counters and entitlement decisions

pub mod entitlement;
pub mod error;
pub mod subscription;
pub mod tier;
pub mod usage;
pub mod user;

pub use entitlement::*;
pub use error::*;
pub use subscription::*;
pub use tier::*;
pub use usage::*;
pub use user::*;
