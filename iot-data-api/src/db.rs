use crate::config::DatabaseConfig;
use crate::errors::{Error, Result};
use crate::model::Record;
use crate::query::QueryShape;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Connection;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Read-only access to the telemetry table.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Executes `shape` and returns the rows in database order.
    async fn fetch(&self, shape: &QueryShape) -> Result<Vec<Record>>;

    /// Checks that the backend can serve a query right now.
    async fn ping(&self) -> Result<()>;
}

pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let ssl_mode = PgSslMode::from_str(&config.ssl_mode)
        .map_err(|_| Error::Config(format!("invalid sslmode '{}'", config.ssl_mode)))?;

    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.name)
        .username(&config.user)
        .password(&config.password)
        .ssl_mode(ssl_mode))
}

/// Builds the shared pool and opens one connection so that an unreachable
/// database fails startup.
pub async fn make_pool(config: &DatabaseConfig) -> Result<PgPool> {
    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        "Connecting to database..."
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(connect_options(config)?)
        .await?;

    info!(
        max_connections = config.max_connections,
        "Database connection established"
    );
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn fetch(&self, shape: &QueryShape) -> Result<Vec<Record>> {
        let sql = shape.sql();
        let query = sqlx::query_as::<_, Record>(&sql);

        let query = match *shape {
            QueryShape::After { cursor, limit } => query.bind(cursor).bind(limit),
            QueryShape::Recent { since, limit } => query.bind(since).bind(limit),
            QueryShape::Default { limit } => query.bind(limit),
            QueryShape::Latest => query,
        };

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ssl_mode: &str) -> DatabaseConfig {
        DatabaseConfig {
            host: "db.internal".to_string(),
            name: "iot".to_string(),
            user: "reader".to_string(),
            password: "s3cret".to_string(),
            port: 6432,
            ssl_mode: ssl_mode.to_string(),
            max_connections: 25,
            max_lifetime_secs: 300,
            acquire_timeout_secs: 10,
        }
    }

    #[test]
    fn test_connect_options_carry_config() {
        let options = connect_options(&config("require")).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_database(), Some("iot"));
        assert_eq!(options.get_username(), "reader");
    }

    #[test]
    fn test_connect_options_reject_unknown_sslmode() {
        let err = connect_options(&config("sometimes")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
