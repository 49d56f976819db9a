//! PostgreSQL repository implementations

mod subscription;
mod usage;

pub use subscription::PgSubscriptionRepository;
pub use usage::PgUsageRepository;

use crate::DbPool;

/// All repositories bundled together
#[derive(Clone)]
pub struct Repositories {
    pub subscriptions: PgSubscriptionRepository,
    pub usage: PgUsageRepository,
}

impl Repositories {
    /// Create all repositories from a database pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            subscriptions: PgSubscriptionRepository::new(pool.clone()),
            usage: PgUsageRepository::new(pool),
        }
    }
}
