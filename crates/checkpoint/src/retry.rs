//! Bounded, randomized retry of rename attempts
//!
//! Failures here are usually another process briefly holding the file
//! (backup agents, virus scanners). Attempts continue until a wall-clock
//! budget is spent, sleeping a uniformly random interval in between so that
//! many clients checkpointing on the same schedule do not retry in lockstep.

use rand::Rng;
use runtime_core::{RenameError, RetryConfig};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Retry budget and backoff bound for checkpoint commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    budget: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config.budget, config.max_backoff)
    }
}

impl RetryPolicy {
    pub fn new(budget: Duration, max_backoff: Duration) -> Self {
        Self {
            budget,
            max_backoff,
        }
    }

    /// Wall-clock budget measured from the first failure
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Upper bound of a single sleep between attempts
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Longest time [`RetryPolicy::run`] sleeps before giving up
    pub fn worst_case_wait(&self) -> Duration {
        self.budget + self.max_backoff
    }

    /// Draw a sleep uniformly from `[0, max_backoff]`
    pub fn backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        self.max_backoff.mul_f64(rng.gen::<f64>())
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the budget is spent. Blocks the calling thread.
    pub fn run<F>(&self, mut attempt: F) -> Result<(), RenameError>
    where
        F: FnMut() -> Result<(), RenameError>,
    {
        let mut last = match attempt() {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        let start = Instant::now();
        let mut rng = rand::thread_rng();
        let mut attempts: u32 = 1;

        loop {
            let pause = self.backoff(&mut rng);
            debug!(
                attempts,
                pause_ms = pause.as_millis() as u64,
                error = %last,
                "Rename failed, retrying"
            );
            thread::sleep(pause);

            attempts += 1;
            match attempt() {
                Ok(()) => {
                    info!(
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Rename succeeded after retry"
                    );
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => last = e,
            }

            if start.elapsed() >= self.budget {
                break;
            }
        }

        let elapsed = start.elapsed();
        warn!(
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %last,
            "Rename retry budget exhausted"
        );
        Err(RenameError::RetryBudgetExhausted {
            attempts,
            elapsed,
            last: Box::new(last),
        })
    }
}
