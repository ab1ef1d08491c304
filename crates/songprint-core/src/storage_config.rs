//! Storage configuration for Songprint
//!
//! One TOML file selects the backend and carries the matcher parameters:
//!
//! ```toml
//! [storage]
//! backend = "postgresql"
//!
//! [storage.postgresql]
//! host = "localhost"
//! database = "songprint"
//!
//! [matching]
//! top_k = 5
//! ```
//!
//! Every key except `storage.backend` may be omitted.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::MatcherConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SongprintConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub matching: MatcherConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: BackendKind,
    #[serde(default)]
    pub postgresql: PostgresqlConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local index, lost on exit
    Memory,
    Postgresql,
}

/// Connection settings; missing keys fall back to the local development
/// database
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PostgresqlConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl Default for PostgresqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            database: "songprint".into(),
            user: "songprint_user".into(),
            password: "songprint_pass".into(),
            max_connections: 10,
        }
    }
}

impl PostgresqlConfig {
    pub fn connection_params(&self) -> songprint_db::ConnectionParams {
        songprint_db::ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            max_connections: self.max_connections as usize,
        }
    }
}

impl SongprintConfig {
    /// Read, parse and validate a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SongprintConfig =
            toml::from_str(&content).context("Failed to parse TOML config")?;
        config
            .matching
            .validate()
            .context("Invalid [matching] section")?;
        Ok(config)
    }

    /// PostgreSQL URL with the password masked, for logging
    pub fn connection_string(&self) -> Option<String> {
        if self.storage.backend != BackendKind::Postgresql {
            return None;
        }
        let pg = &self.storage.postgresql;
        Some(format!(
            "postgresql://{}:***@{}:{}/{}",
            pg.user, pg.host, pg.port, pg.database
        ))
    }

    pub fn default_memory() -> Self {
        Self::with_backend(BackendKind::Memory)
    }

    pub fn default_postgresql() -> Self {
        Self::with_backend(BackendKind::Postgresql)
    }

    fn with_backend(backend: BackendKind) -> Self {
        Self {
            storage: StorageConfig {
                backend,
                postgresql: PostgresqlConfig::default(),
            },
            matching: MatcherConfig::default(),
        }
    }
}
