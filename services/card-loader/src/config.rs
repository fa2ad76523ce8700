use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use svckit::config::{DatabaseConfig, ObservabilityConfig};
use svckit::database::PollPolicy;

pub const ENV_PREFIX: &str = "CARD_LOADER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardLoaderConfig {
    pub database: DatabaseConfig,
    pub loader: LoaderConfig,
    pub probe: ProbeConfig,
    pub memory: MemoryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub transactions: usize,
    pub credit_cards: u64,
    /// Expected daily volume; drives the synthetic clock step when set
    pub transactions_per_day: Option<u64>,
    pub issuers: u64,
    pub locations: u64,
    pub seed: Option<u64>,
    pub bulk_read_concurrency: usize,
    pub scan_fetch_size: i32,
    pub verify_sample: usize,
    /// Draw card numbers from the users table instead of a numeric range
    pub use_known_cards: bool,
    pub show_progress: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            transactions: 100,
            credit_cards: 1_000_000_000,
            transactions_per_day: None,
            issuers: 5_000_000,
            locations: 10_000,
            seed: None,
            bulk_read_concurrency: 64,
            scan_fetch_size: 10_000,
            verify_sample: 100,
            use_known_cards: false,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            initial_backoff_ms: 5,
            max_backoff_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

impl ProbeConfig {
    pub fn to_policy(&self) -> PollPolicy {
        let initial = Duration::from_millis(self.initial_backoff_ms.max(1));
        PollPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            initial_delay: initial,
            max_delay: Duration::from_millis(self.max_backoff_ms).max(initial),
            exponential_base: self.backoff_multiplier.max(1.0),
        }
    }
}

/// Settings for the in-memory driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub indexing_lag_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { indexing_lag_ms: 250 }
    }
}

impl MemoryConfig {
    pub fn indexing_lag(&self) -> Duration {
        Duration::from_millis(self.indexing_lag_ms)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("database.hosts")
        .try_parsing(true)
}

fn build(path: &str, env: Environment) -> Result<CardLoaderConfig> {
    let config = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(env)
        .build()?;
    
    Ok(config.try_deserialize()?)
}

/// Defaults, overlaid by the YAML file at `path` if it exists, overlaid by
/// `CARD_LOADER__*` environment variables (`__` separates nested keys, e.g.
/// `CARD_LOADER__LOADER__TRANSACTIONS=500`).
pub fn load_config(path: &str) -> Result<CardLoaderConfig> {
    build(path, environment())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use svckit::types::ConsistencyLevel;

    fn env_from(pairs: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    fn write_yaml(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.yaml", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = build("does/not/exist/card-loader.yaml", env_from(&[])).unwrap();
        
        assert_eq!(config.loader.transactions, 100);
        assert_eq!(config.loader.credit_cards, 1_000_000_000);
        assert_eq!(config.database.keyspace, "datastax_liveindexing_demo");
        assert_eq!(config.probe.timeout_ms, 60_000);
        assert_eq!(config.memory.indexing_lag_ms, 250);
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let path = write_yaml(
            "card-loader-yaml",
            "database:\n  hosts: [\"10.0.0.1\", \"10.0.0.2:19042\"]\n  read_consistency: local_quorum\nloader:\n  transactions: 5000\n  seed: 42\n",
        );
        
        let config = build(path.to_str().unwrap(), env_from(&[])).unwrap();
        std::fs::remove_file(&path).ok();
        
        assert_eq!(config.loader.transactions, 5000);
        assert_eq!(config.loader.seed, Some(42));
        assert_eq!(config.loader.verify_sample, 100);
        assert_eq!(config.database.read_consistency, ConsistencyLevel::LocalQuorum);
        assert_eq!(
            config.database.contact_points(),
            vec!["10.0.0.1:9042".to_string(), "10.0.0.2:19042".to_string()]
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let path = write_yaml("card-loader-env", "loader:\n  transactions: 5000\n");
        let env = env_from(&[
            ("CARD_LOADER__LOADER__TRANSACTIONS", "7"),
            ("CARD_LOADER__DATABASE__HOSTS", "a,b,c"),
            ("CARD_LOADER__PROBE__TIMEOUT_MS", "1500"),
        ]);
        
        let config = build(path.to_str().unwrap(), env).unwrap();
        std::fs::remove_file(&path).ok();
        
        assert_eq!(config.loader.transactions, 7);
        assert_eq!(config.database.hosts, vec!["a", "b", "c"]);
        assert_eq!(config.probe.timeout_ms, 1500);
    }

    #[test]
    fn test_environment_uses_double_underscore_after_prefix() {
        let config = build(
            "does/not/exist/card-loader.yaml",
            env_from(&[
                ("CARD_LOADER__LOADER__TRANSACTIONS", "500"),
                ("CARD_LOADER_LOADER__VERIFY_SAMPLE", "3"),
            ]),
        )
        .unwrap();
        
        assert_eq!(config.loader.transactions, 500);
        // Single-underscore prefix is not a recognized form
        assert_eq!(config.loader.verify_sample, 100);
    }

    #[test]
    fn test_probe_policy_is_sane() {
        let policy = ProbeConfig {
            timeout_ms: 2_000,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 0.5,
        }
        .to_policy();
        
        assert_eq!(policy.timeout, Duration::from_secs(2));
        assert_eq!(policy.initial_delay, Duration::from_millis(1));
        assert_eq!(policy.max_delay, Duration::from_millis(1));
        assert_eq!(policy.exponential_base, 1.0);
    }
}
