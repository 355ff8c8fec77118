//! Classification-based retry with exponential backoff
//!
//! [`RetryExecutor`] does not know which errors are worth retrying. Callers
//! pass a classifier that maps an error to [`Classification`]; the two
//! classifiers used by the pipeline live here so the error-string matching
//! stays in one place.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use phonebatch_rdbc::error::ErrorCategory;
use tracing::{debug, warn};

/// Retry decision for a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Expected to clear up on its own; retry after a backoff
    Transient,
    /// Surface immediately
    Fatal,
}

/// Statement-level classifier.
///
/// Deadlock victims, lock-wait timeouts and server-reported query timeouts
/// are retried on the same session. A lost connection is fatal here, and so
/// is a statement the client abandoned on timeout: the session is dead and
/// the chunk loop reconnects first.
pub fn classify_statement_error(err: &phonebatch_rdbc::Error) -> Classification {
    match err.category() {
        ErrorCategory::Deadlock | ErrorCategory::LockTimeout | ErrorCategory::Timeout => {
            Classification::Transient
        }
        _ => Classification::Fatal,
    }
}

/// Chunk-level classifier: only a lost connection earns a reconnect and replay.
pub fn classify_connection_loss(err: &phonebatch_rdbc::Error) -> Classification {
    if err.is_connection_loss() {
        Classification::Transient
    } else {
        Classification::Fatal
    }
}

/// Retry limits shared by statement and chunk retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry
    pub backoff_initial: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_initial: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: u32, backoff_initial: Duration) -> Self {
        Self {
            max_retries,
            backoff_initial,
        }
    }

    /// Delay before the `retry`-th retry (1-based): `initial * 2^(retry-1)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        // cap the exponent; 2^31 of anything is already absurd
        let factor = 1u32 << (retry - 1).min(31);
        self.backoff_initial.saturating_mul(factor)
    }
}

/// Attempt bookkeeping for one logical operation
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    retries: u32,
}

impl RetryState {
    /// Fresh state for an operation
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// Retries performed so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Record a failure. Returns the backoff to sleep before retrying, or
    /// `None` when the error is fatal or the budget is spent.
    pub fn next_delay(&mut self, classification: Classification) -> Option<Duration> {
        if classification == Classification::Fatal || self.retries >= self.policy.max_retries {
            return None;
        }
        self.retries += 1;
        Some(self.policy.delay_for_retry(self.retries))
    }
}

/// Runs fallible async operations under a [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    retries: AtomicU64,
}

impl RetryExecutor {
    /// Create an executor
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retries: AtomicU64::new(0),
        }
    }

    /// The configured policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// A fresh [`RetryState`] for a caller-driven retry loop
    pub fn state(&self) -> RetryState {
        RetryState::new(self.policy.clone())
    }

    /// Total retries performed through this executor
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Decide whether to retry `err`; when yes, log and sleep the backoff.
    ///
    /// Returns `false` when the caller should give up and surface the error.
    pub async fn backoff<E: Display>(
        &self,
        op_name: &str,
        state: &mut RetryState,
        err: &E,
        classification: Classification,
    ) -> bool {
        let Some(delay) = state.next_delay(classification) else {
            if classification == Classification::Transient {
                warn!(
                    "{} failed after {} retries, giving up: {}",
                    op_name,
                    state.retries(),
                    err
                );
            } else {
                debug!("{} failed with non-retriable error: {}", op_name, err);
            }
            return false;
        };

        warn!(
            "{} failed (attempt {}/{}), retrying in {:?}: {}",
            op_name,
            state.retries(),
            self.policy.max_retries,
            delay,
            err
        );
        self.retries.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(delay).await;
        true
    }

    /// Run `op` until it succeeds, `classify` calls an error fatal, or the
    /// retry budget runs out.
    pub async fn execute<T, E, F, Fut, C>(&self, op_name: &str, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Classification,
        E: Display,
    {
        let mut state = self.state();
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let classification = classify(&err);
                    if !self.backoff(op_name, &mut state, &err, classification).await {
                        return Err(err);
                    }
                }
            }
        }
    }
}
