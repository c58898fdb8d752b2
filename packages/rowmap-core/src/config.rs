//! Data source configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DataSourceError;

/// Data source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Owning table of the mapped rows
    pub table_name: String,
    /// Default bound for `wait_for_transaction` (None = wait forever)
    pub transaction_wait_timeout_ms: Option<u64>,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            table_name: "data".to_string(),
            transaction_wait_timeout_ms: None,
        }
    }
}

impl DataSourceConfig {
    /// Creates a configuration for the given table with default settings.
    pub fn for_table(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, DataSourceError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DataSourceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    ///
    /// # Arguments
    /// * `path` - Path to the JSON file
    ///
    /// # Returns
    /// The parsed configuration, or `DataSourceError::Config` on I/O or parse failure.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| DataSourceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Rejects configurations the data source cannot run with.
    pub fn validate(&self) -> Result<(), DataSourceError> {
        if self.table_name.is_empty() {
            return Err(DataSourceError::Config(
                "table_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn transaction_wait_timeout(&self) -> Option<Duration> {
        self.transaction_wait_timeout_ms.map(Duration::from_millis)
    }
}
