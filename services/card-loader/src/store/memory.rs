use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use svckit::errors::StoreError;
use crate::model::{CardHolder, Transaction, User};
use super::{CardHolderStream, SearchQuery, TransactionStore};

#[derive(Debug, Clone)]
struct StoredTransaction {
    txn: Transaction,
    visible_at: Instant,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub writes: u64,
    pub reads: u64,
    pub searches: u64,
}

pub struct MemoryStore {
    transactions: DashMap<String, StoredTransaction>,
    users: RwLock<Vec<User>>,
    indexing_lag: Duration,
    reject_writes: AtomicBool,
    writes: AtomicU64,
    reads: AtomicU64,
    searches: AtomicU64,
}

impl MemoryStore {
    pub fn new(indexing_lag: Duration) -> Self {
        Self {
            transactions: DashMap::new(),
            users: RwLock::new(Vec::new()),
            indexing_lag,
            reject_writes: AtomicBool::new(false),
            writes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            searches: AtomicU64::new(0),
        }
    }
    
    /// Insert or replace a user, keeping first-insertion scan order
    pub fn upsert_user(&self, user: User) {
        let mut users = self.users.write();
        match users.iter_mut().find(|u| u.user_id == user.user_id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
    }
    
    /// Make every subsequent insert fail, to exercise the write error path
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
    
    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            writes: self.writes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
        }
    }
    
    fn indexed(&self, now: Instant) -> impl Iterator<Item = Transaction> + '_ {
        self.transactions
            .iter()
            .filter(move |entry| entry.value().visible_at <= now)
            .map(|entry| entry.value().txn.clone())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write(format!(
                "insert {}: not enough replicas available for LOCAL_QUORUM",
                txn.transaction_id
            )));
        }
        
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.transactions.insert(
            txn.transaction_id.clone(),
            StoredTransaction {
                txn: txn.clone(),
                visible_at: Instant::now() + self.indexing_lag,
            },
        );
        debug!("Stored transaction {} (index lag {:?})", txn.transaction_id, self.indexing_lag);
        Ok(())
    }
    
    async fn transaction_by_id(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.transactions.get(transaction_id).map(|entry| entry.value().txn.clone()))
    }
    
    async fn latest_transactions(&self, card_no: &str) -> Result<Vec<Transaction>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut latest: Vec<Transaction> = self
            .indexed(Instant::now())
            .filter(|txn| txn.credit_card_no == card_no)
            .collect();
        latest.sort_by(|a, b| b.transaction_time.cmp(&a.transaction_time));
        Ok(latest)
    }
    
    async fn search_transactions(&self, query: &SearchQuery) -> Result<Option<Transaction>, StoreError> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .indexed(Instant::now())
            .filter(|txn| query.matches(txn))
            .max_by(|a, b| a.transaction_time.cmp(&b.transaction_time)))
    }
    
    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.users.read().iter().find(|u| u.user_id == user_id).cloned())
    }
    
    async fn scan_card_holders(&self, fetch_size: i32) -> Result<CardHolderStream, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let rows: Vec<CardHolder> = self
            .users
            .read()
            .iter()
            .map(|u| CardHolder {
                credit_card_no: u.credit_card_no.clone(),
                user_id: u.user_id.clone(),
            })
            .collect();
        debug!("Scanning {} users with fetch size {}", rows.len(), fetch_size);
        
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }
    
    fn driver_name(&self) -> &str {
        "memory"
    }
}
