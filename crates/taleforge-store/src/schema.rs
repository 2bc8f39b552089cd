//! Game store database schema.
//!
//! Records are stored as JSONB bodies next to the columns the store filters
//! on; the SQL lives in `migrations/` at the workspace root.

use sqlx::migrate::Migrator;

/// Embedded migrations, run once at startup.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
