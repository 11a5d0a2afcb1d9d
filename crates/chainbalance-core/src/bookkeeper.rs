//! `Bookkeeper`: the public facade.
//!
//! ```text
//! caller ─▶ Bookkeeper ─▶ RetryCoordinator ─▶ ExecutionStrategy ─▶ BalanceBackend
//!              │
//!              └─ parse hex ─▶ BalanceSheet
//! ```
//!
//! Every operation returns the balances it managed to collect together with
//! an [`AggregateError`] describing the requests that never succeeded. Only a
//! wholesale failure (backend unreachable on every attempt, or cancellation)
//! is returned as `Err`.

use std::sync::Arc;

use num_bigint::BigUint;
use tokio_util::sync::CancellationToken;

use crate::backend::BalanceBackend;
use crate::config::BookkeeperConfig;
use crate::error::{AggregateError, BalanceError};
use crate::parse::parse_raw_balances;
use crate::retry::RetryCoordinator;
use crate::sheet::{build_int_sheet, build_raw_sheet, BalanceSheet};
use crate::strategy::{self, ExecutionStrategy};
use crate::types::{BalanceRequest, IntBalance, RawBalance};

/// Balances collected by one operation plus whatever failed for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport<T> {
    pub balances: T,
    pub failures: Option<AggregateError>,
}

impl<T> BalanceReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_none()
    }

    /// Drop partial results if anything failed.
    pub fn into_result(self) -> Result<T, AggregateError> {
        match self.failures {
            Some(failures) => Err(failures),
            None => Ok(self.balances),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> BalanceReport<U> {
        BalanceReport {
            balances: f(self.balances),
            failures: self.failures,
        }
    }
}

/// Collects balances for batches of requests.
pub struct Bookkeeper {
    coordinator: RetryCoordinator,
    config: BookkeeperConfig,
    cancel: CancellationToken,
}

impl Bookkeeper {
    /// Build a bookkeeper using the strategy selected in `config`.
    pub fn new(
        backend: Arc<dyn BalanceBackend>,
        config: BookkeeperConfig,
    ) -> Result<Self, BalanceError> {
        Self::with_cancellation_token(backend, config, CancellationToken::new())
    }

    /// Like [`Bookkeeper::new`], tied to an external cancellation token.
    pub fn with_cancellation_token(
        backend: Arc<dyn BalanceBackend>,
        config: BookkeeperConfig,
        cancel: CancellationToken,
    ) -> Result<Self, BalanceError> {
        let strategy = strategy::from_config(backend, &config);
        Self::with_strategy(strategy, config, cancel)
    }

    /// Use a caller-supplied strategy; `config.strategy` is ignored.
    pub fn with_strategy(
        strategy: Arc<dyn ExecutionStrategy>,
        config: BookkeeperConfig,
        cancel: CancellationToken,
    ) -> Result<Self, BalanceError> {
        config.validate()?;
        let coordinator = RetryCoordinator::new(
            strategy,
            config.effective_retries(),
            config.retry.backoff.clone(),
        );
        Ok(Self {
            coordinator,
            config,
            cancel,
        })
    }

    pub fn config(&self) -> &BookkeeperConfig {
        &self.config
    }

    /// Cancelling this token aborts every in-flight and future operation.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch hex balances.
    pub async fn raw_results(
        &self,
        requests: &[BalanceRequest],
    ) -> Result<BalanceReport<Vec<RawBalance>>, BalanceError> {
        tracing::debug!(requests = requests.len(), "collecting raw balances");
        let execution = self.coordinator.run(requests, &self.cancel).await?;
        Ok(BalanceReport {
            balances: execution.successes,
            failures: AggregateError::combine(None, execution.failures),
        })
    }

    /// Fetch balances and parse them into integers. Parse failures join the
    /// fetch failures in one aggregate.
    pub async fn int_results(
        &self,
        requests: &[BalanceRequest],
    ) -> Result<BalanceReport<Vec<IntBalance>>, BalanceError> {
        let raw = self.raw_results(requests).await?;
        let (parsed, parse_failures) = parse_raw_balances(raw.balances);
        Ok(BalanceReport {
            balances: parsed,
            failures: AggregateError::combine(raw.failures, parse_failures),
        })
    }

    /// Fetch hex balances into a sheet.
    pub async fn raw_sheet(
        &self,
        requests: &[BalanceRequest],
    ) -> Result<BalanceReport<BalanceSheet<String>>, BalanceError> {
        Ok(self.raw_results(requests).await?.map(build_raw_sheet))
    }

    /// Fetch balances into an integer sheet.
    pub async fn int_sheet(
        &self,
        requests: &[BalanceRequest],
    ) -> Result<BalanceReport<BalanceSheet<BigUint>>, BalanceError> {
        let raw = self.raw_results(requests).await?;
        let (balances, failures) = build_int_sheet(raw.balances, raw.failures);
        Ok(BalanceReport { balances, failures })
    }
}
