//! Test database setup and management
#![allow(dead_code)]

use sea_orm::{DatabaseConnection, DbErr};

/// Fresh in-memory SQLite database with every table created.
///
/// A single pooled connection keeps the in-memory database alive for the
/// lifetime of the returned handle. The process-wide results cache is cleared
/// so ids reused across test databases never see stale aggregates.
pub async fn setup_test_database() -> Result<DatabaseConnection, DbErr> {
    let db = survey_platform::db::connect("sqlite::memory:", 1).await?;
    survey_platform::db::create_schema(&db).await?;
    survey_platform::cache::clear_results_cache();
    Ok(db)
}
