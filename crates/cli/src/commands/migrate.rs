//! Database migration command.
//!
//! Creates the `tower_sessions` schema and session table used by the web
//! front end. Safe to run repeatedly.
//!
//! # Environment Variables
//!
//! - `SABANG_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)

use sabang_web::db;
use secrecy::SecretString;
use thiserror::Error;
use tower_sessions_sqlx_store::PostgresStore;

/// Errors from running migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Create the session store schema.
///
/// # Errors
///
/// Returns `MigrationError` if the database URL is missing, the database is
/// unreachable, or the schema cannot be created.
pub async fn sessions() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("SABANG_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| MigrationError::MissingEnvVar("SABANG_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Creating session store schema...");
    PostgresStore::new(pool).migrate().await?;

    tracing::info!("Session store migration complete!");
    Ok(())
}
