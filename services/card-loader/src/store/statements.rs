use scylla::prepared_statement::PreparedStatement;
use scylla::statement::Consistency;
use tracing::info;

use svckit::{
    database::{QueryBuilder, ScyllaConnection},
    errors::StoreError,
    types::ConsistencyLevel,
};

pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const LATEST_TRANSACTIONS_TABLE: &str = "latest_transactions";
pub const USERS_TABLE: &str = "users";

/// Column order of every transaction read and of the insert bind values
pub const TRANSACTION_COLUMNS: [&str; 10] = [
    "cc_no",
    "transaction_time",
    "transaction_id",
    "items",
    "location",
    "merchant",
    "amount",
    "user_id",
    "status",
    "notes",
];

pub const USER_COLUMNS: [&str; 7] = ["user_id", "cc_no", "first", "last", "gender", "city", "state"];

/// Inserts must be acknowledged by a quorum of local replicas
pub const WRITE_CONSISTENCY: ConsistencyLevel = ConsistencyLevel::LocalQuorum;

/// CQL text for each statement, kept apart from preparation so it can be checked offline
#[derive(Debug, Clone)]
pub struct StatementText {
    pub insert_transaction: String,
    pub transaction_by_id: String,
    pub latest_by_card: String,
    pub search_transactions: String,
    pub user_by_id: String,
    pub scan_card_holders: String,
}

impl StatementText {
    pub fn for_keyspace(keyspace: &str) -> Self {
        Self {
            insert_transaction: QueryBuilder::build_insert_query(
                keyspace,
                TRANSACTIONS_TABLE,
                &TRANSACTION_COLUMNS,
            ),
            transaction_by_id: QueryBuilder::build_select_query(
                keyspace,
                TRANSACTIONS_TABLE,
                &TRANSACTION_COLUMNS,
                Some("transaction_id"),
            ),
            latest_by_card: QueryBuilder::order_by_desc(
                QueryBuilder::build_select_query(
                    keyspace,
                    LATEST_TRANSACTIONS_TABLE,
                    &TRANSACTION_COLUMNS,
                    Some("cc_no"),
                ),
                "transaction_time",
            ),
            search_transactions: QueryBuilder::limit(
                QueryBuilder::build_select_query(
                    keyspace,
                    TRANSACTIONS_TABLE,
                    &TRANSACTION_COLUMNS,
                    Some("solr_query"),
                ),
                1,
            ),
            user_by_id: QueryBuilder::build_select_query(
                keyspace,
                USERS_TABLE,
                &USER_COLUMNS,
                Some("user_id"),
            ),
            scan_card_holders: QueryBuilder::build_select_query(
                keyspace,
                USERS_TABLE,
                &["cc_no", "user_id"],
                None,
            ),
        }
    }
}

/// Statements prepared against a live session. Immutable after construction;
/// executing takes `&PreparedStatement`, so concurrent calls share them.
pub struct StatementRegistry {
    pub insert_transaction: PreparedStatement,
    pub transaction_by_id: PreparedStatement,
    pub latest_by_card: PreparedStatement,
    pub search_transactions: PreparedStatement,
    pub user_by_id: PreparedStatement,
    pub scan_card_holders: PreparedStatement,
}

impl StatementRegistry {
    pub async fn prepare(
        conn: &ScyllaConnection,
        read_consistency: ConsistencyLevel,
        scan_fetch_size: i32,
    ) -> Result<Self, StoreError> {
        let text = StatementText::for_keyspace(conn.keyspace());
        let read: Consistency = read_consistency.into();
        
        let mut insert_transaction = conn.prepare(&text.insert_transaction).await?;
        insert_transaction.set_consistency(WRITE_CONSISTENCY.into());
        
        let mut transaction_by_id = conn.prepare(&text.transaction_by_id).await?;
        transaction_by_id.set_consistency(read);
        
        let mut latest_by_card = conn.prepare(&text.latest_by_card).await?;
        latest_by_card.set_consistency(read);
        
        // Search nodes answer at ONE/LOCAL_ONE only
        let mut search_transactions = conn.prepare(&text.search_transactions).await?;
        search_transactions.set_consistency(Consistency::LocalOne);
        
        let mut user_by_id = conn.prepare(&text.user_by_id).await?;
        user_by_id.set_consistency(read);
        
        let mut scan_card_holders = conn.prepare(&text.scan_card_holders).await?;
        scan_card_holders.set_consistency(read);
        scan_card_holders.set_page_size(scan_fetch_size.max(1));
        
        info!(
            "Prepared 6 statements (writes at {}, reads at {}, scan fetch size {})",
            WRITE_CONSISTENCY, read_consistency, scan_fetch_size
        );
        
        Ok(Self {
            insert_transaction,
            transaction_by_id,
            latest_by_card,
            search_transactions,
            user_by_id,
            scan_card_holders,
        })
    }
}
