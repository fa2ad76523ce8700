use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use svckit::{errors::StoreError, metrics};
use crate::model::{CardHolder, Transaction, User};
use crate::store::{SearchQuery, TransactionStore};

pub struct CreditCardDao {
    store: Arc<dyn TransactionStore>,
    bulk_read_concurrency: usize,
    scan_fetch_size: i32,
}

impl CreditCardDao {
    pub fn new(store: Arc<dyn TransactionStore>, bulk_read_concurrency: usize, scan_fetch_size: i32) -> Self {
        Self {
            store,
            bulk_read_concurrency: bulk_read_concurrency.max(1),
            scan_fetch_size: scan_fetch_size.max(1),
        }
    }
    
    pub fn driver_name(&self) -> &str {
        self.store.driver_name()
    }
    
    fn observe<T>(&self, operation: &str, start: Instant, result: &Result<T, StoreError>) {
        metrics::record_operation(
            operation,
            self.store.driver_name(),
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
    }
    
    /// Write one transaction and wait for the store to acknowledge it.
    ///
    /// Returns once a quorum of local replicas has the row. The latest
    /// transactions view and the search index are updated later.
    pub async fn insert_transaction(&self, txn: &Transaction) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.store.insert_transaction(txn).await;
        self.observe("insert", start, &result);
        result
    }
    
    /// Point lookup. A missing row is an error: ids handed to this call are
    /// expected to have been written.
    pub async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, StoreError> {
        let start = Instant::now();
        let result = self
            .store
            .transaction_by_id(transaction_id)
            .await
            .and_then(|row| row.ok_or_else(|| StoreError::not_found(transaction_id)));
        self.observe("get_by_id", start, &result);
        result
    }
    
    /// Bulk lookup, results in the same order as `transaction_ids`.
    ///
    /// At most `bulk_read_concurrency` lookups are in flight. The first failed
    /// or missing lookup fails the whole batch and cancels the rest.
    pub async fn get_transactions(&self, transaction_ids: &[String]) -> Result<Vec<Transaction>, StoreError> {
        if transaction_ids.is_empty() {
            return Ok(Vec::new());
        }
        
        let start = Instant::now();
        let result = self.fan_out_by_id(transaction_ids).await;
        self.observe("get_by_ids", start, &result);
        result
    }
    
    async fn fan_out_by_id(&self, transaction_ids: &[String]) -> Result<Vec<Transaction>, StoreError> {
        let semaphore = Arc::new(Semaphore::new(self.bulk_read_concurrency));
        let mut join_set = JoinSet::new();
        let mut slots: Vec<Option<Transaction>> = vec![None; transaction_ids.len()];
        
        for (slot, id) in transaction_ids.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| StoreError::Unknown(format!("bulk read semaphore closed: {}", e)))?;
            let store = self.store.clone();
            let id = id.clone();
            
            join_set.spawn(async move {
                let result = store.transaction_by_id(&id).await;
                drop(permit);
                (slot, id, result)
            });
        }
        
        while let Some(joined) = join_set.join_next().await {
            let (slot, id, result) = joined
                .map_err(|e| StoreError::Unknown(format!("bulk read task failed: {}", e)))?;
            
            match result? {
                Some(txn) => slots[slot] = Some(txn),
                None => return Err(StoreError::not_found(id)),
            }
        }
        
        debug!("Bulk read of {} transactions complete", slots.len());
        
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| StoreError::Unknown("bulk read left an empty result slot".to_string()))
    }
    
    /// Latest transactions for a card from the denormalized view, newest first
    pub async fn latest_transactions_for_card(&self, card_no: &str) -> Result<Vec<Transaction>, StoreError> {
        let start = Instant::now();
        let result = self.store.latest_transactions(card_no).await;
        self.observe("latest_by_card", start, &result);
        result
    }
    
    /// Search-index lookup by card number. `None` means "not indexed yet",
    /// which is expected right after a write.
    pub async fn transaction_by_card_search(&self, card_no: &str) -> Result<Option<Transaction>, StoreError> {
        let start = Instant::now();
        let result = self.store.search_transactions(&SearchQuery::credit_card(card_no)).await;
        self.observe("search_by_card", start, &result);
        result
    }
    
    pub async fn get_user(&self, user_id: &str) -> Result<User, StoreError> {
        let start = Instant::now();
        let result = self
            .store
            .user_by_id(user_id)
            .await
            .and_then(|row| row.ok_or_else(|| StoreError::not_found(user_id)));
        self.observe("get_user", start, &result);
        result
    }
    
    /// Card number to user id for every user. A card listed twice keeps the
    /// user id of the row scanned last.
    pub async fn card_user_map(&self) -> Result<HashMap<String, String>, StoreError> {
        let start = Instant::now();
        let mut card_users = HashMap::new();
        let result = self
            .drain_scan(|row| {
                card_users.insert(row.credit_card_no, row.user_id);
            })
            .await;
        self.observe("scan_card_users", start, &result);
        result.map(|_| card_users)
    }
    
    /// Every card number in the users table, in scan order
    pub async fn credit_card_numbers(&self) -> Result<Vec<String>, StoreError> {
        let start = Instant::now();
        let mut card_numbers = Vec::new();
        let result = self
            .drain_scan(|row| card_numbers.push(row.credit_card_no))
            .await;
        self.observe("scan_card_numbers", start, &result);
        
        let count = result?;
        info!("Count (iter): {}", count);
        Ok(card_numbers)
    }
    
    /// Feed every scanned row to `on_row`, returning the row count. A row
    /// error ends the scan.
    async fn drain_scan<F>(&self, mut on_row: F) -> Result<usize, StoreError>
    where
        F: FnMut(CardHolder),
    {
        let mut rows = self.store.scan_card_holders(self.scan_fetch_size).await?;
        let mut count = 0;
        
        while let Some(row) = rows.next().await {
            on_row(row?);
            count += 1;
        }
        
        Ok(count)
    }
}
