//! Direct strategy: one backend call per request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{in_flight_limit, with_timeout, Execution, ExecutionStrategy};
use crate::backend::BalanceBackend;
use crate::error::{BackendError, BalanceError, RequestFailure};
use crate::types::{BalanceRequest, Currency, RawBalance};

/// Issues a native- or token-balance query per request, all concurrently,
/// and reports once every query has answered.
pub struct DirectStrategy {
    backend: Arc<dyn BalanceBackend>,
    concurrency: usize,
    call_timeout: Option<Duration>,
}

impl DirectStrategy {
    pub fn new(backend: Arc<dyn BalanceBackend>) -> Self {
        Self {
            backend,
            concurrency: 0,
            call_timeout: None,
        }
    }

    /// Cap concurrent queries (0 = unbounded).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    async fn fetch(&self, request: &BalanceRequest) -> Result<String, BackendError> {
        let call = async {
            match &request.currency {
                Currency::Native => {
                    self.backend
                        .native_balance_at(&request.address, &request.block)
                        .await
                }
                Currency::Token(token) => {
                    self.backend
                        .token_balance_at(&request.address, token, &request.block)
                        .await
                }
            }
        };
        with_timeout(self.call_timeout, call).await
    }
}

#[async_trait]
impl ExecutionStrategy for DirectStrategy {
    async fn execute(
        &self,
        requests: &[BalanceRequest],
        cancel: &CancellationToken,
    ) -> Result<Execution, BalanceError> {
        if requests.is_empty() {
            return Ok(Execution::default());
        }

        let limit = in_flight_limit(self.concurrency, requests.len());
        tracing::debug!(requests = requests.len(), limit, "dispatching direct queries");

        let queries: Vec<_> = requests
            .iter()
            .map(|request| async move { (request, self.fetch(request).await) })
            .collect();
        let round = stream::iter(queries)
            .buffer_unordered(limit)
            .collect::<Vec<_>>();

        // Every query must report before the round is classified.
        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BalanceError::Cancelled),
            outcomes = round => outcomes,
        };

        let mut execution = Execution::default();
        for (request, outcome) in outcomes {
            match outcome {
                Ok(balance) => execution.successes.push(RawBalance {
                    request: request.clone(),
                    balance,
                }),
                Err(e) => {
                    tracing::debug!(request = %request, error = %e, "balance query failed");
                    execution
                        .failures
                        .push(RequestFailure::new(request.clone(), e));
                }
            }
        }
        Ok(execution)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}
