//! Data source configuration
//!
//! Loaded from TOML; every field has a default, so an empty file yields a
//! data source pointed at `localhost:6379`.
//!
//! ```toml
//! [endpoint]
//! host = "cache.internal"
//! port = 6380
//! database = 2
//!
//! [pool]
//! max_size = 16
//! min_idle = 1
//! connection_timeout_ms = 2000
//! exhaustion = "fail_fast"
//!
//! [index_store]
//! path = "/var/lib/graph/index-store.json"
//! ```

use kvindex_core::{Error, Result};
use kvindex_storage::{EndpointConfig, PoolConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where index metadata is persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexStoreConfig {
    /// JSON file backing the store; in-memory only if unset
    pub path: Option<PathBuf>,
}

/// Everything needed to construct a [`DataSource`](crate::DataSource)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Remote store endpoint
    pub endpoint: EndpointConfig,
    /// Connection pool policy
    pub pool: PoolConfig,
    /// Index metadata persistence
    pub index_store: IndexStoreConfig,
}

impl DataSourceConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: DataSourceConfig =
            toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Check the configuration without connecting anywhere
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.is_empty() {
            return Err(Error::Config("endpoint.host must not be empty".to_string()));
        }
        if self.endpoint.port == 0 {
            return Err(Error::Config("endpoint.port must not be 0".to_string()));
        }
        self.pool.validate()
    }
}
