//! chainbalance-core: concurrent batch balance collection.
//!
//! Fetches native and token balances for many (block, address, currency)
//! triples at once and returns them as flat result lists or as nested
//! [`BalanceSheet`]s. The core crate defines:
//!
//! - [`BalanceBackend`]: the async trait a ledger node client implements
//! - [`ExecutionStrategy`]: direct (one call per request) or batched
//!   (one aggregated call per block)
//! - [`RetryCoordinator`]: retries only the still-failing requests
//! - [`AggregateError`]: deduplicated report of requests that never succeeded
//! - [`Bookkeeper`]: the facade tying it all together
//!
//! # Quick start
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainbalance_core::{BalanceBackend, BalanceRequest, Bookkeeper, BookkeeperConfig};
//!
//! # async fn run(backend: Arc<dyn BalanceBackend>) -> Result<(), Box<dyn std::error::Error>> {
//! let bookkeeper = Bookkeeper::new(backend, BookkeeperConfig::default().with_retry(3))?;
//! let report = bookkeeper
//!     .int_sheet(&[BalanceRequest::native("latest", "0xa838e871a02c6d883bf004352fc7dac8f781fed6")])
//!     .await?;
//! let sheet = report.into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bookkeeper;
pub mod config;
pub mod error;
pub mod parse;
pub mod policy;
pub mod retry;
pub mod sheet;
pub mod strategy;
pub mod types;

pub use backend::{BalanceBackend, BatchCall, BatchCallResult};
pub use bookkeeper::{BalanceReport, Bookkeeper};
pub use config::{
    BackoffConfig, BookkeeperConfig, MulticallConfig, RetryConfig, StrategyConfig,
    MULTICALL3_ADDRESS,
};
pub use error::{
    aggregate, AggregateError, BackendError, BalanceError, FailureCause, FailureGroup,
    RequestFailure,
};
pub use parse::{parse_hex_balance, quantity_from_bytes};
pub use policy::BackoffPolicy;
pub use retry::RetryCoordinator;
pub use sheet::BalanceSheet;
pub use strategy::{BatchedStrategy, DirectStrategy, Execution, ExecutionStrategy};
pub use types::{BalanceRequest, Currency, IntBalance, RawBalance};

pub use num_bigint::BigUint;
pub use tokio_util::sync::CancellationToken;
