//! Database layer
//!
//! SQLite pool creation, embedded migrations and the repositories that hold
//! every SQL statement of the service.
//!
//! # Usage
//!
//! ```ignore
//! use agora::config::DatabaseConfig;
//! use agora::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping, DbPool};
