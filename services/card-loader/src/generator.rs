use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{format_card_number, CardHolder, Transaction, TransactionStatus};

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const MAX_ITEMS: u32 = 5;
const MAX_ITEM_AMOUNT: f64 = 1000.0;
const DEFAULT_MAX_STEP_SECS: i64 = 100;

const LOCATIONS: &[&str] = &[
    "London", "Manchester", "Liverpool", "Glasgow", "Dundee", "Birmingham", "New York", "Chicago",
    "Denver", "Los Angeles", "San Jose", "Santa Clara", "San Fransisco",
];

const ISSUERS: &[&str] = &[
    "Tesco", "Sainsbury", "Asda Wal-Mart Stores", "Morrisons", "Marks & Spencer", "Boots",
    "John Lewis", "Waitrose", "Argos", "Co-op", "Currys", "PC World", "B&Q", "Somerfield", "Next",
    "Spar", "Amazon", "Costa", "Starbucks", "BestBuy", "Wickes", "TFL", "National Rail",
    "Pizza Hut", "Local Pub",
];

/// Resolution of each clock step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepUnit {
    /// Whole seconds, matching the demo data set
    Seconds,
    Millis,
}

/// Monotonic synthetic clock. Each generated transaction advances it by a
/// random step no larger than `max_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticClock {
    pub now: DateTime<Utc>,
    pub max_step: ChronoDuration,
    pub unit: StepUnit,
}

impl SyntheticClock {
    /// Steps are whole seconds when `max_step` is, milliseconds otherwise
    pub fn new(start: DateTime<Utc>, max_step: ChronoDuration) -> Self {
        let whole_seconds = max_step.num_milliseconds() >= 1000 && max_step.num_milliseconds() % 1000 == 0;
        Self {
            now: start,
            max_step,
            unit: if whole_seconds { StepUnit::Seconds } else { StepUnit::Millis },
        }
    }
    
    /// Midnight `days` days before `reference`, stepping up to 100 seconds per call
    pub fn days_before(reference: DateTime<Utc>, days: i64) -> Self {
        let start = (reference - ChronoDuration::days(days))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(reference);
        Self::new(start, ChronoDuration::seconds(DEFAULT_MAX_STEP_SECS))
    }
    
    /// Millisecond step bound derived from a transactions-per-day rate: the
    /// mean gap at that rate, jittered by a factor drawn from [0.5, 1.5).
    pub fn with_rate_hint<R: Rng + ?Sized>(self, rng: &mut R, transactions_per_day: u64) -> Self {
        if transactions_per_day == 0 {
            return self;
        }
        let divisor = transactions_per_day as f64 * (rng.gen::<f64>() + 0.5);
        let step_ms = (MILLIS_PER_DAY / divisor).max(1.0) as i64;
        Self {
            max_step: ChronoDuration::milliseconds(step_ms),
            unit: StepUnit::Millis,
            ..self
        }
    }
    
    /// Advance by a random step in `[0, max_step)`
    pub fn tick<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let step = match self.unit {
            StepUnit::Seconds => {
                let bound = self.max_step.num_seconds();
                let secs = if bound > 0 { rng.gen_range(0..bound) } else { 0 };
                ChronoDuration::seconds(secs)
            }
            StepUnit::Millis => {
                let bound = self.max_step.num_milliseconds();
                let ms = if bound > 0 { rng.gen_range(0..bound) } else { 0 };
                ChronoDuration::milliseconds(ms)
            }
        };
        Self {
            now: self.now + step,
            ..self
        }
    }
}

/// Where card numbers come from
#[derive(Debug, Clone)]
pub enum CardSource {
    /// Uniform over `1..=n`, zero-padded
    Range(u64),
    /// Uniform over card holders read from the users table
    Known(Vec<CardHolder>),
}

#[derive(Debug, Clone)]
pub struct TransactionGenerator {
    cards: CardSource,
    issuers: u64,
    locations: u64,
}

impl TransactionGenerator {
    pub fn new(cards: CardSource, issuers: u64, locations: u64) -> Self {
        Self {
            cards,
            issuers: issuers.max(1),
            locations: locations.max(1),
        }
    }
    
    /// Build one transaction stamped with the advanced clock, returning the
    /// clock to use for the next call.
    pub fn create_transaction<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        clock: SyntheticClock,
    ) -> (Transaction, SyntheticClock) {
        let clock = clock.tick(rng);
        let (credit_card_no, user_id) = self.pick_card(rng);
        
        let issuer_no = rng.gen_range(0..self.issuers);
        let merchant = match ISSUERS.get(issuer_no as usize) {
            Some(name) => name.to_string(),
            None => format!("Issuer{}", issuer_no + 1),
        };
        
        let location_no = rng.gen_range(0..self.locations);
        let location = match LOCATIONS.get(location_no as usize) {
            Some(name) => name.to_string(),
            None => format!("City-{}", location_no + 1),
        };
        
        let items = random_items(rng);
        
        let txn = Transaction {
            transaction_id: Uuid::new_v4().to_string(),
            credit_card_no,
            transaction_time: clock.now,
            merchant,
            location,
            amount: Transaction::items_total(&items),
            items,
            user_id,
            status: TransactionStatus::Approved,
            notes: None,
        };
        
        (txn, clock)
    }
    
    fn pick_card<R: Rng + ?Sized>(&self, rng: &mut R) -> (String, String) {
        match &self.cards {
            CardSource::Known(holders) if !holders.is_empty() => {
                let holder = &holders[rng.gen_range(0..holders.len())];
                (holder.credit_card_no.clone(), holder.user_id.clone())
            }
            CardSource::Known(_) => (format_card_number(1), "1".to_string()),
            CardSource::Range(population) => {
                let n = rng.gen_range(1..=(*population).max(1));
                (format_card_number(n), n.to_string())
            }
        }
    }
}

fn random_items<R: Rng + ?Sized>(rng: &mut R) -> HashMap<String, f64> {
    let count = rng.gen_range(1..=MAX_ITEMS);
    (0..count)
        .map(|i| (format!("item{}", i), rng.gen::<f64>() * MAX_ITEM_AMOUNT))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CARD_NUMBER_WIDTH;
    use chrono::{TimeZone, Timelike};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_generated_transactions_are_balanced_and_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        let generator = TransactionGenerator::new(CardSource::Range(1_000_000), 5_000_000, 10_000);
        let mut clock = SyntheticClock::new(start(), ChronoDuration::seconds(100));
        
        for _ in 0..200 {
            let (txn, next) = generator.create_transaction(&mut rng, clock);
            clock = next;
            
            assert!(txn.is_balanced());
            assert!((1..=5).contains(&txn.items.len()));
            assert!(txn.items.values().all(|a| (0.0..1000.0).contains(a)));
            assert_eq!(txn.credit_card_no.len(), CARD_NUMBER_WIDTH);
            assert_eq!(txn.credit_card_no.trim_start_matches('0'), txn.user_id);
            assert_eq!(txn.status, TransactionStatus::Approved);
            assert!(Uuid::parse_str(&txn.transaction_id).is_ok());
        }
    }

    #[test]
    fn test_clock_is_threaded_and_monotonic() {
        let mut rng = StdRng::seed_from_u64(11);
        let generator = TransactionGenerator::new(CardSource::Range(10), 25, 13);
        let mut clock = SyntheticClock::new(start(), ChronoDuration::seconds(100));
        let mut previous = clock.now;
        
        for _ in 0..100 {
            let (txn, next) = generator.create_transaction(&mut rng, clock);
            assert!(txn.transaction_time >= previous);
            assert!(txn.transaction_time - previous < ChronoDuration::seconds(100));
            assert_eq!(txn.transaction_time.nanosecond(), 0);
            assert_eq!(txn.transaction_time, next.now);
            previous = next.now;
            clock = next;
        }
    }

    #[test]
    fn test_days_before_starts_at_midnight() {
        let reference = Utc.with_ymd_and_hms(2024, 3, 31, 15, 42, 7).unwrap();
        let clock = SyntheticClock::days_before(reference, 30);
        assert_eq!(clock.now, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_rate_hint_bounds_step() {
        let mut rng = StdRng::seed_from_u64(3);
        let clock = SyntheticClock::new(start(), ChronoDuration::seconds(100))
            .with_rate_hint(&mut rng, 500_000);
        // 86_400_000 / (500_000 * [0.5, 1.5)) lands in (115, 345] ms
        let step = clock.max_step.num_milliseconds();
        assert!((115..=345).contains(&step), "step was {}", step);
    }

    #[test]
    fn test_millisecond_clock_advances_on_whole_second_bound() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut clock = SyntheticClock {
            now: start(),
            max_step: ChronoDuration::milliseconds(1000),
            unit: StepUnit::Millis,
        };
        
        for _ in 0..20 {
            clock = clock.tick(&mut rng);
        }
        
        assert!(clock.now > start());
        assert!(clock.now - start() < ChronoDuration::seconds(20));
    }

    #[test]
    fn test_rate_hint_switches_to_milliseconds() {
        let mut rng = StdRng::seed_from_u64(3);
        let clock = SyntheticClock::days_before(start(), 1);
        assert_eq!(clock.unit, StepUnit::Seconds);
        
        let hinted = clock.with_rate_hint(&mut rng, 86_400);
        assert_eq!(hinted.unit, StepUnit::Millis);
    }

    #[test]
    fn test_small_populations_use_named_issuers_and_locations() {
        let mut rng = StdRng::seed_from_u64(5);
        let generator = TransactionGenerator::new(CardSource::Range(5), ISSUERS.len() as u64, LOCATIONS.len() as u64);
        let clock = SyntheticClock::new(start(), ChronoDuration::seconds(1));
        
        for _ in 0..50 {
            let (txn, _) = generator.create_transaction(&mut rng, clock);
            assert!(ISSUERS.contains(&txn.merchant.as_str()));
            assert!(LOCATIONS.contains(&txn.location.as_str()));
        }
    }

    #[test]
    fn test_large_populations_synthesize_names() {
        let mut rng = StdRng::seed_from_u64(9);
        let generator = TransactionGenerator::new(CardSource::Range(5), 5_000_000, 10_000);
        let clock = SyntheticClock::new(start(), ChronoDuration::seconds(1));
        
        let synthesized = (0..50)
            .map(|_| generator.create_transaction(&mut rng, clock).0)
            .filter(|t| t.merchant.starts_with("Issuer") && t.location.starts_with("City-"))
            .count();
        assert!(synthesized > 40);
    }

    #[test]
    fn test_known_cards_keep_their_user_ids() {
        let mut rng = StdRng::seed_from_u64(1);
        let known = vec![
            CardHolder {
                credit_card_no: format_card_number(77),
                user_id: "u-77".to_string(),
            },
            CardHolder {
                credit_card_no: format_card_number(0),
                user_id: "u-zero".to_string(),
            },
        ];
        let generator = TransactionGenerator::new(CardSource::Known(known.clone()), 10, 10);
        let clock = SyntheticClock::new(start(), ChronoDuration::seconds(1));
        
        for _ in 0..20 {
            let (txn, _) = generator.create_transaction(&mut rng, clock);
            let holder = CardHolder {
                credit_card_no: txn.credit_card_no.clone(),
                user_id: txn.user_id.clone(),
            };
            assert!(known.contains(&holder), "unexpected pairing {:?}", holder);
        }
    }
}
