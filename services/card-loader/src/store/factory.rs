use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use svckit::{config::DatabaseConfig, errors::StoreError};
use super::{MemoryStore, ScyllaStore, TransactionStore};

/// Supported store drivers
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StoreDriver {
    #[default]
    Scylla,
    Memory,
}

impl From<&str> for StoreDriver {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" | "mem" | "in-memory" | "dry-run" => StoreDriver::Memory,
            "scylla" | "scylladb" | "cassandra" | "dse" => StoreDriver::Scylla,
            _ => StoreDriver::Scylla, // Default to the cluster
        }
    }
}

/// Store construction factory
pub struct StoreFactory;

impl StoreFactory {
    /// Create a store based on driver type
    pub async fn create(
        driver: StoreDriver,
        config: &DatabaseConfig,
        scan_fetch_size: i32,
        indexing_lag: Duration,
    ) -> Result<Arc<dyn TransactionStore>, StoreError> {
        info!("Creating transaction store with driver: {:?}", driver);
        
        match driver {
            StoreDriver::Scylla => {
                let store = ScyllaStore::connect(config, scan_fetch_size).await?;
                Ok(Arc::new(store))
            }
            StoreDriver::Memory => {
                info!("Using in-memory store with simulated indexing lag of {:?}", indexing_lag);
                Ok(Arc::new(MemoryStore::new(indexing_lag)))
            }
        }
    }
    
    /// Create a store for the driver named in `config.driver`
    pub async fn create_from_config(
        config: &DatabaseConfig,
        scan_fetch_size: i32,
        indexing_lag: Duration,
    ) -> Result<Arc<dyn TransactionStore>, StoreError> {
        let driver = StoreDriver::from(config.driver.as_str());
        Self::create(driver, config, scan_fetch_size, indexing_lag).await
    }
}
