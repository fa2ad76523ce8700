use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use svckit::errors::StoreError;
use crate::dao::CreditCardDao;
use crate::generator::{CardSource, SyntheticClock, TransactionGenerator};
use crate::model::{CardHolder, Transaction};
use crate::prober::{Convergence, ConvergenceProber};

/// Pick where the generator draws card numbers from. Known cards and their
/// owners come from a full users-table scan; an empty table falls back to
/// the numeric range.
pub async fn resolve_card_source(
    dao: &CreditCardDao,
    use_known_cards: bool,
    credit_cards: u64,
) -> Result<CardSource, StoreError> {
    if !use_known_cards {
        return Ok(CardSource::Range(credit_cards));
    }
    
    let mut holders: Vec<CardHolder> = dao
        .card_user_map()
        .await?
        .into_iter()
        .map(|(credit_card_no, user_id)| CardHolder { credit_card_no, user_id })
        .collect();
    if holders.is_empty() {
        warn!("Users table is empty, generating cards from 1..={}", credit_cards);
        return Ok(CardSource::Range(credit_cards));
    }
    // Stable order so a seeded run picks the same cards
    holders.sort_by(|a, b| a.credit_card_no.cmp(&b.credit_card_no));
    
    info!("Generating transactions for {} known cards", holders.len());
    Ok(CardSource::Known(holders))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Writing,
    Converging,
    Verifying,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Writing => write!(f, "writing"),
            RunPhase::Converging => write!(f, "converging"),
            RunPhase::Verifying => write!(f, "verifying"),
            RunPhase::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub transactions: usize,
    pub verify_sample: usize,
    pub show_progress: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub written: usize,
    pub last_card: Option<String>,
    pub convergence: Option<Convergence>,
    pub verified: usize,
    pub write_duration: std::time::Duration,
}

pub struct Orchestrator<R: Rng + Send> {
    dao: Arc<CreditCardDao>,
    prober: ConvergenceProber,
    generator: TransactionGenerator,
    settings: RunSettings,
    rng: R,
    clock: SyntheticClock,
    phase: RunPhase,
}

impl<R: Rng + Send> Orchestrator<R> {
    pub fn new(
        dao: Arc<CreditCardDao>,
        prober: ConvergenceProber,
        generator: TransactionGenerator,
        settings: RunSettings,
        rng: R,
        clock: SyntheticClock,
    ) -> Self {
        Self {
            dao,
            prober,
            generator,
            settings,
            rng,
            clock,
            phase: RunPhase::Writing,
        }
    }
    
    pub fn phase(&self) -> RunPhase {
        self.phase
    }
    
    fn enter(&mut self, phase: RunPhase) {
        debug!("Run phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }
    
    /// Execute the run. Any write or read failure aborts it.
    pub async fn run(&mut self) -> Result<RunReport, StoreError> {
        info!(
            "Writing {} transactions via {} store",
            self.settings.transactions,
            self.dao.driver_name()
        );
        
        let write_start = Instant::now();
        let (last, sample) = self.write_all().await?;
        let write_duration = write_start.elapsed();
        
        let Some(last) = last else {
            info!("No transactions written, nothing to converge on");
            self.enter(RunPhase::Done);
            return Ok(RunReport {
                written: 0,
                last_card: None,
                convergence: None,
                verified: 0,
                write_duration,
            });
        };
        
        info!(
            "Wrote {} transactions in {:?}; last card {}",
            self.settings.transactions, write_duration, last.credit_card_no
        );
        
        self.enter(RunPhase::Converging);
        let convergence = self.prober.await_indexed(&last.credit_card_no).await?;
        
        self.enter(RunPhase::Verifying);
        let verified = self.verify(&sample).await?;
        
        self.enter(RunPhase::Done);
        Ok(RunReport {
            written: self.settings.transactions,
            last_card: Some(last.credit_card_no),
            convergence: Some(convergence),
            verified,
            write_duration,
        })
    }
    
    /// Returns the last transaction written and a sample of the most recent ones
    async fn write_all(&mut self) -> Result<(Option<Transaction>, VecDeque<Transaction>), StoreError> {
        let total = self.settings.transactions;
        let progress = if self.settings.show_progress {
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} transactions ({per_sec})")
            {
                pb.set_style(style);
            }
            pb
        } else {
            ProgressBar::hidden()
        };
        
        let sample_size = self.settings.verify_sample;
        let mut sample: VecDeque<Transaction> = VecDeque::with_capacity(sample_size.min(total));
        let mut last = None;
        
        for i in 0..total {
            let (txn, clock) = self.generator.create_transaction(&mut self.rng, self.clock);
            self.clock = clock;
            
            debug!("Inserting transaction {} ({})", i, txn.transaction_id);
            self.dao.insert_transaction(&txn).await?;
            progress.inc(1);
            
            if sample_size > 0 {
                if sample.len() == sample_size {
                    sample.pop_front();
                }
                sample.push_back(txn.clone());
            }
            last = Some(txn);
        }
        
        progress.finish_and_clear();
        Ok((last, sample))
    }
    
    /// Bulk-read the sample and compare it with what was written
    async fn verify(&self, sample: &VecDeque<Transaction>) -> Result<usize, StoreError> {
        if sample.is_empty() {
            return Ok(0);
        }
        
        let ids: Vec<String> = sample.iter().map(|t| t.transaction_id.clone()).collect();
        let read = self.dao.get_transactions(&ids).await?;
        
        for (written, read) in sample.iter().zip(read.iter()) {
            if !read.is_balanced() {
                return Err(StoreError::Decode(format!(
                    "transaction {} amount {} does not match its items",
                    read.transaction_id, read.amount
                )));
            }
            if written != read {
                warn!("Read-back mismatch: wrote {:?}, read {:?}", written, read);
                return Err(StoreError::Decode(format!(
                    "transaction {} differs from what was written",
                    written.transaction_id
                )));
            }
        }
        
        info!("Verified {} transactions by bulk read-back", read.len());
        Ok(read.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{format_card_number, User};
    use crate::store::MemoryStore;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;
    use svckit::database::PollPolicy;

    const LAG: Duration = Duration::from_millis(250);

    fn orchestrator(
        store: Arc<MemoryStore>,
        transactions: usize,
        timeout: Duration,
    ) -> Orchestrator<StdRng> {
        let dao = Arc::new(CreditCardDao::new(store, 4, 100));
        let prober = ConvergenceProber::new(dao.clone(), PollPolicy::fixed(timeout, Duration::from_millis(5)));
        let generator = TransactionGenerator::new(CardSource::Range(1000), 25, 13);
        let clock = SyntheticClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ChronoDuration::seconds(100),
        );
        Orchestrator::new(
            dao,
            prober,
            generator,
            RunSettings {
                transactions,
                verify_sample: 10,
                show_progress: false,
            },
            StdRng::seed_from_u64(42),
            clock,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_writes_converges_and_verifies() {
        let store = Arc::new(MemoryStore::new(LAG));
        let mut run = orchestrator(store.clone(), 25, Duration::from_secs(5));
        
        let report = run.run().await.unwrap();
        
        assert_eq!(run.phase(), RunPhase::Done);
        assert_eq!(report.written, 25);
        assert_eq!(store.stats().writes, 25);
        assert_eq!(report.verified, 10);
        
        let convergence = report.convergence.unwrap();
        assert!(convergence.is_indexed());
        assert!(convergence.elapsed() >= LAG);
        if let Convergence::Indexed { transaction, .. } = convergence {
            assert_eq!(Some(transaction.credit_card_no), report.last_card);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_timeout_instead_of_spinning() {
        let store = Arc::new(MemoryStore::new(Duration::from_secs(600)));
        let mut run = orchestrator(store, 3, Duration::from_millis(100));
        
        let report = run.run().await.unwrap();
        
        let convergence = report.convergence.unwrap();
        assert!(!convergence.is_indexed());
        assert_eq!(convergence.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_write_failure_aborts_run() {
        let store = Arc::new(MemoryStore::new(LAG));
        store.reject_writes(true);
        let mut run = orchestrator(store, 5, Duration::from_secs(1));
        
        let result = run.run().await;
        
        assert!(matches!(result, Err(StoreError::Write(_))));
        assert_eq!(run.phase(), RunPhase::Writing);
    }

    #[tokio::test]
    async fn test_zero_transactions_skips_convergence() {
        let store = Arc::new(MemoryStore::new(LAG));
        let mut run = orchestrator(store.clone(), 0, Duration::from_secs(1));
        
        let report = run.run().await.unwrap();
        
        assert_eq!(report.written, 0);
        assert!(report.convergence.is_none());
        assert_eq!(store.stats().searches, 0);
    }

    #[tokio::test]
    async fn test_card_source_prefers_known_cards() {
        let store = Arc::new(MemoryStore::new(LAG));
        let dao = CreditCardDao::new(store.clone(), 4, 100);
        
        let empty = resolve_card_source(&dao, true, 500).await.unwrap();
        assert!(matches!(empty, CardSource::Range(500)));
        
        for (n, user_id) in [(900, "ada"), (77, "grace")] {
            store.upsert_user(User {
                user_id: user_id.to_string(),
                credit_card_no: format_card_number(n),
                first_name: None,
                last_name: None,
                gender: None,
                city: None,
                state: None,
            });
        }
        
        match resolve_card_source(&dao, true, 500).await.unwrap() {
            CardSource::Known(holders) => assert_eq!(
                holders,
                vec![
                    CardHolder {
                        credit_card_no: format_card_number(77),
                        user_id: "grace".to_string(),
                    },
                    CardHolder {
                        credit_card_no: format_card_number(900),
                        user_id: "ada".to_string(),
                    },
                ]
            ),
            other => panic!("expected known cards, got {:?}", other),
        }
        assert!(matches!(
            resolve_card_source(&dao, false, 500).await.unwrap(),
            CardSource::Range(500)
        ));
    }

    #[tokio::test]
    async fn test_write_keeps_only_the_most_recent_sample() {
        let store = Arc::new(MemoryStore::new(LAG));
        let mut run = orchestrator(store, 25, Duration::from_secs(1));
        
        let (last, sample) = run.write_all().await.unwrap();
        
        assert_eq!(sample.len(), 10);
        assert_eq!(sample.back(), last.as_ref());
        let times: Vec<_> = sample.iter().map(|t| t.transaction_time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
