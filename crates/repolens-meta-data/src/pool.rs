//! Connection pool construction from application configuration

use repolens_config::DatabaseConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{MetaDataError, MetaDataResult};

/// Create the shared connection pool
///
/// # Errors
///
/// Returns `MetaDataError::Connection` if the server is unreachable,
/// credentials are rejected, or the connect timeout elapses.
pub async fn create_pool(config: &DatabaseConfig) -> MetaDataResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .idle_timeout(config.idle_timeout())
        .connect_with(config.connect_options())
        .await
        .map_err(|e| MetaDataError::Connection(format!("failed to connect to postgres: {e}")))
}
