use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::ConsistencyLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: String,
    pub hosts: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub pool_size: u32,
    pub read_consistency: ConsistencyLevel,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "scylla".to_string(),
            hosts: vec!["localhost".to_string()],
            port: 9042,
            keyspace: "datastax_liveindexing_demo".to_string(),
            username: None,
            password: None,
            connection_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            pool_size: 4,
            read_consistency: ConsistencyLevel::LocalOne,
        }
    }
}

impl DatabaseConfig {
    /// Contact points in `host:port` form. Hosts that already carry a port are kept as-is.
    pub fn contact_points(&self) -> Vec<String> {
        self.hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(|h| {
                if h.contains(':') {
                    h.to_string()
                } else {
                    format!("{}:{}", h, self.port)
                }
            })
            .collect()
    }
    
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
    
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub dump_metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            dump_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_points_append_default_port() {
        let config = DatabaseConfig {
            hosts: vec!["10.0.0.1".into(), "10.0.0.2:19042".into(), " ".into()],
            ..Default::default()
        };
        assert_eq!(
            config.contact_points(),
            vec!["10.0.0.1:9042".to_string(), "10.0.0.2:19042".to_string()]
        );
    }
}
