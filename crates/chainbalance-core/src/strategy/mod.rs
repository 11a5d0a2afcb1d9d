//! Execution strategies: how one round of requests reaches the backend.
//!
//! ```text
//! RetryCoordinator ─▶ ExecutionStrategy ─▶ BalanceBackend
//!                      ├─ DirectStrategy   (one call per request)
//!                      └─ BatchedStrategy  (one aggregated call per block)
//! ```
//!
//! A strategy classifies every input request as exactly one success or one
//! failure. When no classification is possible at all it returns a wholesale
//! [`BalanceError`] instead.

pub mod batched;
pub mod direct;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::BalanceBackend;
use crate::config::{BookkeeperConfig, StrategyConfig};
use crate::error::{BackendError, BalanceError, RequestFailure};
use crate::types::{BalanceRequest, RawBalance};

pub use batched::BatchedStrategy;
pub use direct::DirectStrategy;

/// Outcome of one strategy round: each request lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub successes: Vec<RawBalance>,
    pub failures: Vec<RequestFailure>,
}

impl Execution {
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successes.is_empty() && self.failures.is_empty()
    }
}

/// Turns a set of requests into classified successes and failures.
///
/// Strategies never retry failed requests themselves; that is the
/// [`RetryCoordinator`](crate::retry::RetryCoordinator)'s job.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Run one round. Must return promptly with [`BalanceError::Cancelled`]
    /// once `cancel` fires.
    async fn execute(
        &self,
        requests: &[BalanceRequest],
        cancel: &CancellationToken,
    ) -> Result<Execution, BalanceError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Build the strategy selected by `config`.
pub fn from_config(
    backend: Arc<dyn BalanceBackend>,
    config: &BookkeeperConfig,
) -> Arc<dyn ExecutionStrategy> {
    match &config.strategy {
        StrategyConfig::Direct => Arc::new(
            DirectStrategy::new(backend)
                .with_concurrency(config.concurrency)
                .with_call_timeout(config.call_timeout),
        ),
        StrategyConfig::Batched(mc) => Arc::new(
            BatchedStrategy::new(backend, mc.clone())
                .with_concurrency(config.concurrency)
                .with_call_timeout(config.call_timeout),
        ),
    }
}

/// Run a backend call, mapping an elapsed `timeout` to [`BackendError::Timeout`].
pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| BackendError::Timeout {
                ms: limit.as_millis() as u64,
            })?,
        None => call.await,
    }
}

/// In-flight bound for a round of `pending` tasks (0 = unbounded).
pub(crate) fn in_flight_limit(concurrency: usize, pending: usize) -> usize {
    match concurrency {
        0 => pending.max(1),
        n => n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_maps_to_backend_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BackendError>("0x1".to_string())
        };
        let err = with_timeout(Some(Duration::from_millis(10)), slow)
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Timeout { ms: 10 });
    }

    #[tokio::test]
    async fn no_timeout_passes_result_through() {
        let fast = async { Ok::<_, BackendError>(7u8) };
        assert_eq!(with_timeout(None, fast).await.unwrap(), 7);
    }

    #[test]
    fn in_flight_limit_zero_means_everything() {
        assert_eq!(in_flight_limit(0, 12), 12);
        assert_eq!(in_flight_limit(0, 0), 1);
        assert_eq!(in_flight_limit(4, 12), 4);
    }
}
