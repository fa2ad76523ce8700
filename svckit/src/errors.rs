use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),
    
    #[error("Statement preparation error: {0}")]
    Preparation(String),
    
    #[error("Write error: {0}")]
    Write(String),
    
    #[error("Read error: {0}")]
    Read(String),
    
    #[error("Not found: no row for id {id}")]
    NotFound { id: String },
    
    #[error("Decode error: {0}")]
    Decode(String),
    
    #[error("Configuration error: {0}")]
    Config(String),
    
    #[error("Timeout error: operation timed out after {0:?}")]
    Timeout(Duration),
    
    #[error("Database error: {0}")]
    Database(String),
    
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound { id: id.into() }
    }
}

impl From<scylla::transport::errors::QueryError> for StoreError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Unknown(err.to_string())
    }
}
