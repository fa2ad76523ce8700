use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use scylla::frame::value::CqlTimestamp;
use scylla::QueryResult;
use std::collections::HashMap;
use tracing::{debug, error, info};

use svckit::{
    config::DatabaseConfig,
    database::ScyllaConnection,
    errors::StoreError,
};
use crate::model::{CardHolder, Transaction, TransactionStatus, User};
use super::statements::StatementRegistry;
use super::{CardHolderStream, SearchQuery, TransactionStore};

/// Row shape of `TRANSACTION_COLUMNS`, in column order
type TransactionRow = (
    String,
    CqlTimestamp,
    String,
    Option<HashMap<String, f64>>,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Row shape of `USER_COLUMNS`
type UserRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

pub struct ScyllaStore {
    connection: ScyllaConnection,
    statements: StatementRegistry,
}

impl ScyllaStore {
    /// Open the session and prepare every statement. If preparation fails
    /// the session is released before the error is returned.
    pub async fn connect(config: &DatabaseConfig, scan_fetch_size: i32) -> Result<Self, StoreError> {
        let connection = ScyllaConnection::new(config).await?;
        
        let prepared = StatementRegistry::prepare(
            &connection,
            config.read_consistency,
            scan_fetch_size,
        )
        .await;
        let (connection, statements) = release_on_failure(connection, prepared)?;
        
        info!("Transaction store ready on keyspace {}", connection.keyspace());
        
        Ok(Self {
            connection,
            statements,
        })
    }
    
    fn first_transaction(result: QueryResult) -> Result<Option<Transaction>, StoreError> {
        let mut rows = result
            .rows_typed::<TransactionRow>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        
        match rows.next() {
            Some(row) => {
                let row = row.map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(Some(row_to_transaction(row)?))
            }
            None => Ok(None),
        }
    }
}

/// Session handle that can be given back when startup cannot complete
trait Release {
    fn release(self);
}

impl Release for ScyllaConnection {
    fn release(self) {
        self.shutdown();
    }
}

/// Pair `connection` with the prepared value, or release the connection and
/// return the preparation error unchanged.
fn release_on_failure<C: Release, T>(
    connection: C,
    prepared: Result<T, StoreError>,
) -> Result<(C, T), StoreError> {
    match prepared {
        Ok(value) => Ok((connection, value)),
        Err(e) => {
            error!("Statement preparation failed, closing session: {}", e);
            connection.release();
            Err(e)
        }
    }
}

fn row_to_transaction(row: TransactionRow) -> Result<Transaction, StoreError> {
    let (cc_no, time, transaction_id, items, location, merchant, amount, user_id, status, notes) = row;
    
    let transaction_time = DateTime::<Utc>::from_timestamp_millis(time.0)
        .ok_or_else(|| StoreError::Decode(format!("timestamp out of range: {}", time.0)))?;
    
    let status = match status {
        Some(s) => s.parse::<TransactionStatus>().map_err(StoreError::Decode)?,
        None => {
            return Err(StoreError::Decode(format!(
                "transaction {} has no status",
                transaction_id
            )))
        }
    };
    
    Ok(Transaction {
        transaction_id,
        credit_card_no: cc_no,
        transaction_time,
        merchant: merchant.unwrap_or_default(),
        location: location.unwrap_or_default(),
        amount: amount.unwrap_or_default(),
        items: items.unwrap_or_default(),
        user_id: user_id.unwrap_or_default(),
        status,
        notes,
    })
}

fn row_to_user(row: UserRow) -> User {
    let (user_id, cc_no, first, last, gender, city, state) = row;
    User {
        user_id,
        credit_card_no: cc_no.unwrap_or_default(),
        first_name: first,
        last_name: last,
        gender,
        city,
        state,
    }
}

#[async_trait]
impl TransactionStore for ScyllaStore {
    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), StoreError> {
        let values = (
            txn.credit_card_no.clone(),
            CqlTimestamp(txn.transaction_time.timestamp_millis()),
            txn.transaction_id.clone(),
            txn.items.clone(),
            txn.location.clone(),
            txn.merchant.clone(),
            txn.amount,
            txn.user_id.clone(),
            txn.status.as_str().to_string(),
            txn.notes.clone(),
        );
        
        self.connection
            .get_session()
            .execute_unpaged(&self.statements.insert_transaction, values)
            .await
            .map_err(|e| StoreError::Write(format!("insert {}: {}", txn.transaction_id, e)))?;
        
        debug!("Inserted transaction {}", txn.transaction_id);
        Ok(())
    }
    
    async fn transaction_by_id(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError> {
        let result = self.connection
            .get_session()
            .execute_unpaged(&self.statements.transaction_by_id, (transaction_id,))
            .await
            .map_err(|e| StoreError::Read(format!("transaction {}: {}", transaction_id, e)))?;
        
        Self::first_transaction(result)
    }
    
    async fn latest_transactions(&self, card_no: &str) -> Result<Vec<Transaction>, StoreError> {
        let result = self.connection
            .get_session()
            .execute_unpaged(&self.statements.latest_by_card, (card_no,))
            .await
            .map_err(|e| StoreError::Read(format!("latest for card {}: {}", card_no, e)))?;
        
        result
            .rows_typed::<TransactionRow>()
            .map_err(|e| StoreError::Decode(e.to_string()))?
            .map(|row| {
                row.map_err(|e| StoreError::Decode(e.to_string()))
                    .and_then(row_to_transaction)
            })
            .collect()
    }
    
    async fn search_transactions(&self, query: &SearchQuery) -> Result<Option<Transaction>, StoreError> {
        let document = query.to_solr_json();
        let result = self.connection
            .get_session()
            .execute_unpaged(&self.statements.search_transactions, (document,))
            .await
            .map_err(|e| StoreError::Read(format!("search {:?}: {}", query, e)))?;
        
        Self::first_transaction(result)
    }
    
    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let result = self.connection
            .get_session()
            .execute_unpaged(&self.statements.user_by_id, (user_id,))
            .await
            .map_err(|e| StoreError::Read(format!("user {}: {}", user_id, e)))?;
        
        let mut rows = result
            .rows_typed::<UserRow>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        
        match rows.next() {
            Some(row) => Ok(Some(row_to_user(row.map_err(|e| StoreError::Decode(e.to_string()))?))),
            None => Ok(None),
        }
    }
    
    async fn scan_card_holders(&self, fetch_size: i32) -> Result<CardHolderStream, StoreError> {
        let mut statement = self.statements.scan_card_holders.clone();
        statement.set_page_size(fetch_size.max(1));
        
        let rows = self.connection
            .get_session()
            .execute_iter(statement, ())
            .await
            .map_err(|e| StoreError::Read(format!("users scan: {}", e)))?
            .into_typed::<(Option<String>, Option<String>)>();
        
        let stream = rows.map(|row| {
            let (cc_no, user_id) = row.map_err(|e| StoreError::Read(e.to_string()))?;
            Ok(CardHolder {
                credit_card_no: cc_no.unwrap_or_default(),
                user_id: user_id.unwrap_or_default(),
            })
        });
        
        Ok(stream.boxed())
    }
    
    fn driver_name(&self) -> &str {
        "scylla"
    }
}
