//! Retry coordinator: re-runs a strategy on a shrinking worklist.
//!
//! Round N+1 only ever contains requests that failed in round N, and the
//! failures returned at the end are those of the last round only. A request
//! that failed once and later succeeded leaves no trace in the final report.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::BackoffConfig;
use crate::error::{BalanceError, RequestFailure};
use crate::policy::BackoffPolicy;
use crate::strategy::{Execution, ExecutionStrategy};
use crate::types::BalanceRequest;

pub struct RetryCoordinator {
    strategy: Arc<dyn ExecutionStrategy>,
    backoff: BackoffPolicy,
}

impl RetryCoordinator {
    /// `max_retries` rounds may follow the first one (0 = single attempt).
    pub fn new(strategy: Arc<dyn ExecutionStrategy>, max_retries: u32, backoff: BackoffConfig) -> Self {
        Self {
            strategy,
            backoff: BackoffPolicy::new(backoff, max_retries),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.backoff.max_retries
    }

    /// Run rounds until nothing fails or retries are exhausted.
    ///
    /// The returned `failures` are exactly the last round's failures.
    pub async fn run(
        &self,
        requests: &[BalanceRequest],
        cancel: &CancellationToken,
    ) -> Result<Execution, BalanceError> {
        if requests.is_empty() {
            return Ok(Execution::default());
        }

        let mut successes = Vec::with_capacity(requests.len());
        let mut pending: Vec<BalanceRequest> = requests.to_vec();
        let mut attempt = 0u32;
        loop {
            tracing::debug!(
                attempt,
                pending = pending.len(),
                strategy = self.strategy.name(),
                "starting round"
            );

            // A failed round-trip still classifies: every pending request
            // failed with the same backend error.
            let (round, wholesale) = match self.strategy.execute(&pending, cancel).await {
                Ok(round) => (round, None),
                Err(BalanceError::Backend(e)) => {
                    let failures = pending
                        .iter()
                        .map(|request| RequestFailure::new(request.clone(), e.clone()))
                        .collect();
                    (
                        Execution {
                            successes: Vec::new(),
                            failures,
                        },
                        Some(e),
                    )
                }
                Err(e) => return Err(e),
            };

            successes.extend(round.successes);
            let failed = round.failures;

            if failed.is_empty() {
                tracing::info!(
                    attempt,
                    succeeded = successes.len(),
                    "all balances collected"
                );
                return Ok(Execution {
                    successes,
                    failures: Vec::new(),
                });
            }

            if attempt >= self.backoff.max_retries {
                // Nothing was ever classified by the backend itself.
                if let Some(e) = wholesale {
                    if successes.is_empty() {
                        return Err(BalanceError::Backend(e));
                    }
                }
                if self.backoff.max_retries > 0 {
                    tracing::error!(
                        attempt,
                        failed = failed.len(),
                        succeeded = successes.len(),
                        "retry attempts exhausted"
                    );
                }
                return Ok(Execution {
                    successes,
                    failures: failed,
                });
            }

            attempt += 1;
            pending = failed.into_iter().map(|f| f.request).collect();

            let delay = self.backoff.next_delay(attempt).unwrap_or_default();
            tracing::warn!(
                attempt,
                failed = pending.len(),
                delay_ms = delay.as_millis(),
                "retrying failed requests"
            );
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(BalanceError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
