//! Database connection management

use anyhow::Context;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

pub type DbPool = Pool;

/// DDL for the songs and fingerprints relations
pub const SCHEMA: &str = include_str!("../schema.sql");

/// Server address, credentials and pool size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: usize,
}

/// Create a PostgreSQL connection pool. Connections are opened lazily.
pub fn create_pool(params: &ConnectionParams) -> anyhow::Result<DbPool> {
    let mut cfg = Config::new();
    cfg.host = Some(params.host.clone());
    cfg.port = Some(params.port);
    cfg.dbname = Some(params.database.clone());
    cfg.user = Some(params.user.clone());
    cfg.password = Some(params.password.clone());
    cfg.pool = Some(PoolConfig::new(params.max_connections.max(1)));
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .with_context(|| format!("Failed to create pool for {}:{}", params.host, params.port))
}

/// Open one pooled connection and ask the server for its version
pub async fn test_connection(pool: &DbPool) -> anyhow::Result<()> {
    let client = pool.get().await.context("No connection available")?;
    let row = client
        .query_one("SHOW server_version", &[])
        .await
        .context("Server did not answer")?;
    let version: String = row.get(0);
    log::debug!("PostgreSQL server version {}", version);
    Ok(())
}

/// Create tables and indexes if they do not exist yet
pub async fn ensure_schema(pool: &DbPool) -> anyhow::Result<()> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    log::debug!("Songprint schema is in place");
    Ok(())
}
