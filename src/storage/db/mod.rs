//! Database abstraction layer.
//!
//! Currently supports SQLite, which stands in for the hosted relational
//! backend. The abstraction is intentionally minimal:
//! - `SqlitePool`: Connection pool wrapper for SQLite with embedded migrations
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/pulseboard.db?mode=rwc").await?;
//! pool.migrate().await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
