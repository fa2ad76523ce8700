use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

/// Bounded polling with backoff. Replaces open-ended spin loops: every poll
/// either observes the value, or gives up once `timeout` has elapsed.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(500),
            exponential_base: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready {
        value: T,
        attempts: u32,
        elapsed: Duration,
    },
    TimedOut {
        attempts: u32,
        elapsed: Duration,
    },
}

impl<T> PollOutcome<T> {
    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Ready { elapsed, .. } | PollOutcome::TimedOut { elapsed, .. } => *elapsed,
        }
    }
    
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Ready { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => *attempts,
        }
    }
}

impl PollPolicy {
    /// Constant delay between polls
    pub fn fixed(timeout: Duration, delay: Duration) -> Self {
        Self {
            timeout,
            initial_delay: delay,
            max_delay: delay,
            exponential_base: 1.0,
        }
    }
    
    fn next_delay(&self, delay: Duration) -> Duration {
        let base = self.exponential_base.max(1.0);
        std::cmp::min(
            self.max_delay,
            Duration::from_secs_f64(delay.as_secs_f64() * base),
        )
    }

    /// Run `probe` until it yields `Some`, an error, or the deadline passes.
    ///
    /// An in-flight probe that outlives the deadline is dropped. Errors from
    /// the probe are returned as-is; they are not retried.
    pub async fn poll_until<F, Fut, T, E>(&self, mut probe: F) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut delay = self.initial_delay;
        let mut attempts = 0u32;
        
        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            
            match timeout(remaining, probe()).await {
                Ok(Ok(Some(value))) => {
                    return Ok(PollOutcome::Ready {
                        value,
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    return Ok(PollOutcome::TimedOut {
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
            }
            
            let now = Instant::now();
            if now >= deadline {
                return Ok(PollOutcome::TimedOut {
                    attempts,
                    elapsed: start.elapsed(),
                });
            }
            
            debug!("Poll attempt {} not ready, sleeping {:?}", attempts, delay);
            sleep(std::cmp::min(delay, deadline - now)).await;
            delay = self.next_delay(delay);
        }
    }
}
