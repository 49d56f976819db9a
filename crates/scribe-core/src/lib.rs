//! Scribe Core - Usage and entitlement business logic
//!
//! Tier catalog lookups, entitlement checks, atomic usage recording with
//! reservations, and the billing webhook that drives subscription state.

pub mod catalog;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod recorder;
pub mod resolver;
pub mod service;
pub mod webhook;

pub use catalog::*;
pub use config::*;
pub use entitlement::*;
pub use error::*;
pub use gate::*;
pub use recorder::*;
pub use resolver::*;
pub use service::*;
pub use webhook::*;
