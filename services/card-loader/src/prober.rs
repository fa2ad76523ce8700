use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use svckit::{
    database::{PollOutcome, PollPolicy},
    errors::StoreError,
    metrics,
};
use crate::dao::CreditCardDao;
use crate::model::Transaction;

#[derive(Debug, Clone, PartialEq)]
pub enum Convergence {
    /// The search index returned a row for the card
    Indexed {
        transaction: Transaction,
        elapsed: Duration,
        attempts: u32,
    },
    /// Nothing was indexed before the deadline
    TimedOut {
        elapsed: Duration,
        attempts: u32,
    },
}

impl Convergence {
    pub fn elapsed(&self) -> Duration {
        match self {
            Convergence::Indexed { elapsed, .. } | Convergence::TimedOut { elapsed, .. } => *elapsed,
        }
    }
    
    pub fn is_indexed(&self) -> bool {
        matches!(self, Convergence::Indexed { .. })
    }
}

pub struct ConvergenceProber {
    dao: Arc<CreditCardDao>,
    policy: PollPolicy,
}

impl ConvergenceProber {
    pub fn new(dao: Arc<CreditCardDao>, policy: PollPolicy) -> Self {
        Self { dao, policy }
    }
    
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }
    
    /// Poll the search index for `card_no` until a row appears or the policy
    /// deadline passes. Only writes acknowledged before this call are
    /// guaranteed to be observable. Dropping the future cancels the wait.
    pub async fn await_indexed(&self, card_no: &str) -> Result<Convergence, StoreError> {
        info!(
            "Waiting for card {} to be searchable (timeout {:?})",
            card_no, self.policy.timeout
        );
        
        let outcome = self
            .policy
            .poll_until(|| self.dao.transaction_by_card_search(card_no))
            .await?;
        
        let convergence = match outcome {
            PollOutcome::Ready { value, attempts, elapsed } => {
                info!("Indexed in {}ms after {} searches", elapsed.as_millis(), attempts);
                Convergence::Indexed {
                    transaction: value,
                    elapsed,
                    attempts,
                }
            }
            PollOutcome::TimedOut { attempts, elapsed } => {
                warn!(
                    "Card {} not searchable after {}ms and {} searches",
                    card_no,
                    elapsed.as_millis(),
                    attempts
                );
                Convergence::TimedOut { elapsed, attempts }
            }
        };
        
        metrics::record_convergence(convergence.is_indexed(), convergence.elapsed().as_secs_f64());
        Ok(convergence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{format_card_number, TransactionStatus};
    use crate::store::{MemoryStore, TransactionStore};
    use chrono::Utc;
    use std::collections::HashMap;

    const LAG: Duration = Duration::from_millis(500);
    const POLL: Duration = Duration::from_millis(10);

    fn txn_for(card: &str) -> Transaction {
        Transaction {
            transaction_id: "t-42".into(),
            credit_card_no: card.to_string(),
            transaction_time: Utc::now(),
            merchant: "Costa".into(),
            location: "London".into(),
            amount: 0.0,
            items: HashMap::new(),
            user_id: "42".into(),
            status: TransactionStatus::Approved,
            notes: None,
        }
    }

    fn prober_over(store: Arc<MemoryStore>, timeout: Duration) -> ConvergenceProber {
        let dao = Arc::new(CreditCardDao::new(store, 4, 100));
        ConvergenceProber::new(dao, PollPolicy::fixed(timeout, POLL))
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_within_lag_window_and_never_before() {
        let store = Arc::new(MemoryStore::new(LAG));
        let card = "0000000000000042";
        assert_eq!(card, format_card_number(42));
        store.insert_transaction(&txn_for(card)).await.unwrap();
        
        let prober = prober_over(store.clone(), Duration::from_secs(5));
        let convergence = prober.await_indexed(card).await.unwrap();
        
        match convergence {
            Convergence::Indexed { transaction, elapsed, attempts } => {
                assert_eq!(transaction.credit_card_no, card);
                assert!(elapsed >= LAG, "indexed early: {:?}", elapsed);
                assert!(elapsed <= LAG + POLL, "indexed late: {:?}", elapsed);
                assert!(attempts > 1);
                assert_eq!(store.stats().searches, attempts as u64);
            }
            other => panic!("expected convergence, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_index_never_catches_up() {
        let store = Arc::new(MemoryStore::new(Duration::from_secs(3600)));
        store.insert_transaction(&txn_for("0000000000000007")).await.unwrap();
        
        let prober = prober_over(store, Duration::from_millis(200));
        let convergence = prober.await_indexed("0000000000000007").await.unwrap();
        
        assert!(!convergence.is_indexed());
        assert_eq!(convergence.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_lag_converges_on_first_search() {
        let store = Arc::new(MemoryStore::new(Duration::ZERO));
        store.insert_transaction(&txn_for("0000000000000001")).await.unwrap();
        
        let prober = prober_over(store, Duration::from_secs(1));
        match prober.await_indexed("0000000000000001").await.unwrap() {
            Convergence::Indexed { attempts, elapsed, .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(elapsed, Duration::ZERO);
            }
            other => panic!("expected convergence, got {:?}", other),
        }
    }
}
