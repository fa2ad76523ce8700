pub mod factory;
pub mod memory;
pub mod scylla;
pub mod statements;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::json;

use svckit::errors::StoreError;
use crate::model::{CardHolder, Transaction, User};

pub use factory::StoreFactory;
pub use memory::MemoryStore;
pub use self::scylla::ScyllaStore;

/// Forward-only, single-pass rows from a paged users-table scan
pub type CardHolderStream = BoxStream<'static, Result<CardHolder, StoreError>>;

/// Search-enabled columns of the transactions table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    CreditCardNo,
}

impl SearchField {
    pub fn column(&self) -> &'static str {
        match self {
            SearchField::CreditCardNo => "cc_no",
        }
    }
}

/// Typed field/value search. The value is escaped when rendered, never
/// spliced into statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub field: SearchField,
    pub value: String,
}

impl SearchQuery {
    pub fn credit_card(card_no: impl Into<String>) -> Self {
        Self {
            field: SearchField::CreditCardNo,
            value: card_no.into(),
        }
    }
    
    /// Does `txn` satisfy this query
    pub fn matches(&self, txn: &Transaction) -> bool {
        match self.field {
            SearchField::CreditCardNo => txn.credit_card_no == self.value,
        }
    }

    /// JSON document bound to the `solr_query` column
    pub fn to_solr_json(&self) -> String {
        let q = format!("{}:{}", self.field.column(), escape_query_term(&self.value));
        json!({ "q": q }).to_string()
    }
}

/// Escape Lucene query syntax so the value is matched as a single term
fn escape_query_term(value: &str) -> String {
    const SPECIAL: &[char] = &[
        '\\', '+', '-', '!', '(', ')', ':', '^', '[', ']', '"', '{', '}', '~', '*', '?', '|', '&', '/', ' ',
    ];
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Everything the DAO needs from a transaction store
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Durable single-row insert at the write consistency level
    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), StoreError>;
    
    async fn transaction_by_id(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError>;
    
    /// Latest-transactions view for one card, newest first
    async fn latest_transactions(&self, card_no: &str) -> Result<Vec<Transaction>, StoreError>;
    
    /// First match from the search index, `None` while nothing is indexed
    async fn search_transactions(&self, query: &SearchQuery) -> Result<Option<Transaction>, StoreError>;
    
    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError>;
    
    /// Paged scan of the users table, `fetch_size` rows per page
    async fn scan_card_holders(&self, fetch_size: i32) -> Result<CardHolderStream, StoreError>;
    
    fn driver_name(&self) -> &str;
}
