use std::num::NonZeroUsize;
use std::sync::Arc;
use scylla::{Session, SessionBuilder};
use scylla::prepared_statement::PreparedStatement;
use scylla::transport::session::PoolSize;
use scylla::transport::execution_profile::ExecutionProfile;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::errors::StoreError;

/// Owns the cluster session for the lifetime of the process.
///
/// Cloning shares the same session; the session is closed when the last
/// clone is dropped or [`ScyllaConnection::shutdown`] is called on it.
#[derive(Clone)]
pub struct ScyllaConnection {
    session: Arc<Session>,
    config: DatabaseConfig,
}

impl ScyllaConnection {
    /// Open a session against the configured contact points
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let contact_points = config.contact_points();
        if contact_points.is_empty() {
            return Err(StoreError::Config("no contact points configured".to_string()));
        }
        
        info!("Connecting to cluster: {:?}", contact_points);

        let pool_size = NonZeroUsize::new(config.pool_size as usize)
            .unwrap_or(NonZeroUsize::MIN);

        let profile = ExecutionProfile::builder()
            .request_timeout(Some(config.request_timeout()))
            .consistency(config.read_consistency.into())
            .build();

        let mut session_builder = SessionBuilder::new()
            .known_nodes(&contact_points)
            .connection_timeout(config.connection_timeout())
            .pool_size(PoolSize::PerShard(pool_size))
            .default_execution_profile_handle(profile.into_handle())
            .use_keyspace(&config.keyspace, true);

        if let (Some(ref username), Some(ref password)) = (&config.username, &config.password) {
            session_builder = session_builder.user(username, password);
        }

        let session = session_builder
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to connect to {:?}: {}", contact_points, e)))?;

        info!("Connected to keyspace: {}", config.keyspace);

        Ok(Self {
            session: Arc::new(session),
            config: config.clone(),
        })
    }

    /// Get the underlying session
    pub fn get_session(&self) -> &Session {
        &self.session
    }
    
    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }

    /// Prepare a statement for repeated execution
    pub async fn prepare(&self, query: &str) -> Result<PreparedStatement, StoreError> {
        self.session
            .prepare(query)
            .await
            .map_err(|e| StoreError::Preparation(format!("{}: {}", query, e)))
    }

    /// Release this handle on the session. Used on the startup failure path so
    /// the cluster connections close before the error propagates.
    pub fn shutdown(self) {
        let handles = Arc::strong_count(&self.session);
        if handles > 1 {
            warn!("Session still shared by {} other handle(s); it closes when they drop", handles - 1);
        } else {
            info!("Closing session to {:?}", self.config.hosts);
        }
        drop(self.session);
    }
}
