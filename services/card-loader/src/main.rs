mod config;
mod dao;
mod generator;
mod model;
mod orchestrator;
mod prober;
mod store;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::dao::CreditCardDao;
use crate::generator::{SyntheticClock, TransactionGenerator};
use crate::orchestrator::{Orchestrator, RunSettings};
use crate::prober::{Convergence, ConvergenceProber};
use crate::store::StoreFactory;
use svckit::errors::StoreError;

const CLOCK_START_DAYS_AGO: i64 = 30;

#[derive(Parser, Debug)]
#[command(name = "card-loader")]
#[command(about = "Write synthetic card transactions and measure how long search indexing takes")]
struct Args {
    #[arg(short, long, default_value = "config/card-loader.yaml")]
    config: String,
    
    /// Comma-separated contact points, overriding database.hosts
    #[arg(long, value_delimiter = ',')]
    contact_points: Vec<String>,
    
    /// Number of transactions to write
    #[arg(short = 'n', long)]
    transactions: Option<usize>,
    
    /// Store driver: scylla or memory
    #[arg(short, long)]
    driver: Option<String>,
    
    /// Scan the users table, print how many cards it holds and exit
    #[arg(long)]
    count_cards: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    
    let mut config = config::load_config(&args.config)?;
    if !args.contact_points.is_empty() {
        config.database.hosts = args.contact_points.clone();
    }
    if let Some(n) = args.transactions {
        config.loader.transactions = n;
    }
    if let Some(driver) = &args.driver {
        config.database.driver = driver.clone();
    }
    
    let level = &config.observability.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("card_loader={},svckit={}", level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    
    info!("Starting card-loader");
    
    let store = StoreFactory::create_from_config(
        &config.database,
        config.loader.scan_fetch_size,
        config.memory.indexing_lag(),
    )
    .await?;
    
    let dao = Arc::new(CreditCardDao::new(
        store,
        config.loader.bulk_read_concurrency,
        config.loader.scan_fetch_size,
    ));
    
    if args.count_cards {
        let cards = dao.credit_card_numbers().await?;
        println!("{} cards in users table", cards.len());
        return Ok(());
    }
    
    let cards = orchestrator::resolve_card_source(
        &dao,
        config.loader.use_known_cards,
        config.loader.credit_cards,
    )
    .await?;
    let generator = TransactionGenerator::new(cards, config.loader.issuers, config.loader.locations);
    
    let mut rng = match config.loader.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut clock = SyntheticClock::days_before(Utc::now(), CLOCK_START_DAYS_AGO);
    if let Some(per_day) = config.loader.transactions_per_day {
        clock = clock.with_rate_hint(&mut rng, per_day);
    }
    
    let prober = ConvergenceProber::new(dao.clone(), config.probe.to_policy());
    info!("Search probe policy: {:?}", prober.policy());
    let settings = RunSettings {
        transactions: config.loader.transactions,
        verify_sample: config.loader.verify_sample,
        show_progress: config.loader.show_progress,
    };
    let mut run = Orchestrator::new(dao, prober, generator, settings, rng, clock);
    
    let outcome = tokio::select! {
        report = run.run() => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(report) = outcome else {
        warn!("Interrupted during {} phase", run.phase());
        bail!("interrupted");
    };
    let report = report?;
    
    if config.observability.dump_metrics {
        info!("Metrics:\n{}", svckit::metrics::gather_text());
    }
    
    match report.convergence {
        Some(Convergence::Indexed { transaction, elapsed, attempts }) => {
            println!("Indexed in {}ms", elapsed.as_millis());
            info!(
                "Wrote {} transactions in {:?}; {} indexed after {} probes; verified {}",
                report.written, report.write_duration, transaction.transaction_id, attempts, report.verified
            );
        }
        Some(Convergence::TimedOut { elapsed, attempts }) => {
            return Err(anyhow::Error::new(StoreError::Timeout(elapsed)).context(format!(
                "card {} not indexed after {} probes",
                report.last_card.unwrap_or_default(),
                attempts
            )));
        }
        None => info!("Nothing written"),
    }
    
    Ok(())
}
