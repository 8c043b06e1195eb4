//! Timeout, retry, and circuit breaking around external dependencies.
//!
//! Each dependency gets its own [`CallGuard`] with its own budgets, so a
//! slow embedding provider cannot eat the tighter deadline the query path
//! runs under.

pub mod breaker;
pub mod retry;

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use crate::models::{BreakerConfig, GuardConfig};

use breaker::{CircuitBreaker, CircuitState};
use retry::{RetryConfig, RetryResult, Retryable, with_retry};

/// Errors a guard can produce on behalf of the wrapped operation.
pub trait GuardedError: Retryable + std::fmt::Debug {
    fn timed_out(after: Duration) -> Self;
    fn circuit_open(retry_after: Duration) -> Self;
}

/// Wraps calls to one dependency with a per-call timeout, bounded retries
/// with backoff, and a circuit breaker.
pub struct CallGuard {
    name: &'static str,
    timeout: Duration,
    retry: RetryConfig,
    breaker: Mutex<CircuitBreaker>,
}

impl CallGuard {
    pub fn new(name: &'static str, guard: &GuardConfig, breaker: &BreakerConfig) -> Self {
        Self {
            name,
            timeout: Duration::from_millis(guard.timeout_ms),
            retry: RetryConfig::new(guard.max_retries.max(1))
                .with_initial_delay(Duration::from_millis(guard.initial_backoff_ms))
                .with_max_delay(Duration::from_millis(guard.max_backoff_ms)),
            breaker: Mutex::new(CircuitBreaker::new(breaker)),
        }
    }

    /// Current breaker state, for status output and tests.
    pub fn breaker_state(&self) -> CircuitState {
        self.lock_breaker().state()
    }

    /// Run `operation` under this guard's budgets.
    ///
    /// Every attempt checks the breaker first and carries its own timeout.
    /// An open circuit surfaces immediately as a typed error without
    /// touching the dependency.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: GuardedError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let result = with_retry(&self.retry, || {
            let attempt = operation();
            async move {
                if let Err(wait) = self.lock_breaker().try_acquire() {
                    return Err(E::circuit_open(wait));
                }
                match tokio::time::timeout(self.timeout, attempt).await {
                    Ok(Ok(value)) => {
                        self.lock_breaker().record_success();
                        Ok(value)
                    }
                    Ok(Err(err)) => {
                        // only availability failures trip the breaker; a
                        // definitive answer means the dependency is up
                        if err.is_retryable() {
                            self.lock_breaker().record_failure();
                        } else {
                            self.lock_breaker().record_success();
                        }
                        Err(err)
                    }
                    Err(_) => {
                        self.lock_breaker().record_failure();
                        Err(E::timed_out(self.timeout))
                    }
                }
            }
        })
        .await;

        match result {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed {
                last_error,
                attempts,
            } => {
                warn!(
                    dependency = self.name,
                    attempts,
                    error = ?last_error,
                    "dependency call failed"
                );
                Err(last_error)
            }
        }
    }

    fn lock_breaker(&self) -> std::sync::MutexGuard<'_, CircuitBreaker> {
        match self.breaker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for CallGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGuard")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("breaker", &self.breaker_state())
            .finish()
    }
}
