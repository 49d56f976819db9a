//! Scribe DB - Database abstractions
//!
//! SQLx-based persistence for subscriptions and usage counters.
//!
//! # Example
//!
//! ```rust,ignore
//! use scribe_db::{create_pool, run_migrations, Repositories};
//!
//! let pool = create_pool("postgres://localhost/scribe").await?;
//! run_migrations(&pool).await?;
//! let repos = Repositories::new(pool);
//!
//! let stats = repos.usage.find_by_user_id("user_1").await?;
//! ```

pub mod error;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use models::*;
pub use pg::Repositories;
pub use pool::{create_pool, create_pool_with_options, run_migrations, DbPool, PoolOptions};
pub use repo::*;
