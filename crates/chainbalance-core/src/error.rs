//! Error types and the failure aggregator.
//!
//! Per-request failures ([`RequestFailure`]) are recovered locally and retried;
//! whatever is still failing when attempts run out is folded into one
//! [`AggregateError`]. Failures that prevent any per-request classification
//! surface as a wholesale [`BalanceError`].

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::types::BalanceRequest;

/// Error reported by a backend for a single call or a whole batch round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response arrived but could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The backend does not implement the requested capability.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl BackendError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// Why a single request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A batched call-entry reported failure although the round-trip succeeded.
    #[error("VM execution error")]
    VmExecution,

    /// The batched round-trip succeeded but carried no result for this entry.
    #[error("missing result for call entry")]
    MissingResult,

    /// A fetched raw balance is not valid hex.
    #[error("invalid hex balance {0:?}")]
    Parse(String),
}

/// A request paired with the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub request: BalanceRequest,
    pub cause: FailureCause,
}

impl RequestFailure {
    pub fn new(request: BalanceRequest, cause: impl Into<FailureCause>) -> Self {
        Self {
            request,
            cause: cause.into(),
        }
    }
}

/// All requests that failed with the same cause text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureGroup {
    /// Position of the cause in first-seen order.
    pub index: usize,
    pub cause: String,
    pub requests: Vec<BalanceRequest>,
}

/// Deduplicated report of every request that never produced a balance.
///
/// Groups are keyed by the rendered cause and kept in the order their cause
/// was first observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateError {
    groups: IndexMap<String, FailureGroup>,
}

impl AggregateError {
    /// Group `failures` by cause. Equivalent to [`aggregate`].
    pub fn from_failures<I>(failures: I) -> Self
    where
        I: IntoIterator<Item = RequestFailure>,
    {
        let mut agg = Self::default();
        agg.extend(failures);
        agg
    }

    /// Add more failures, keeping the existing cause order.
    pub fn extend<I>(&mut self, failures: I)
    where
        I: IntoIterator<Item = RequestFailure>,
    {
        for failure in failures {
            let cause = failure.cause.to_string();
            let next_index = self.groups.len();
            self.groups
                .entry(cause.clone())
                .or_insert_with(|| FailureGroup {
                    index: next_index,
                    cause,
                    requests: Vec::new(),
                })
                .requests
                .push(failure.request);
        }
    }

    /// Fold `failures` into `carried`. `None` when there is nothing to report.
    pub fn combine<I>(carried: Option<Self>, failures: I) -> Option<Self>
    where
        I: IntoIterator<Item = RequestFailure>,
    {
        let mut agg = carried.unwrap_or_default();
        agg.extend(failures);
        (!agg.is_empty()).then_some(agg)
    }

    /// Fold another aggregate into this one.
    pub fn merge(&mut self, other: AggregateError) {
        for (_, group) in other.groups {
            let cause = group.cause;
            let next_index = self.groups.len();
            self.groups
                .entry(cause.clone())
                .or_insert_with(|| FailureGroup {
                    index: next_index,
                    cause,
                    requests: Vec::new(),
                })
                .requests
                .extend(group.requests);
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &FailureGroup> {
        self.groups.values()
    }

    pub fn group(&self, cause: &str) -> Option<&FailureGroup> {
        self.groups.get(cause)
    }

    /// Number of distinct causes.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every affected request, group by group.
    pub fn failed_requests(&self) -> impl Iterator<Item = &BalanceRequest> {
        self.groups.values().flat_map(|g| g.requests.iter())
    }

    pub fn failed_count(&self) -> usize {
        self.groups.values().map(|g| g.requests.len()).sum()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unable to collect balances because of these errors:")?;
        for group in self.groups.values() {
            writeln!(f, "[{}] {}", group.index, group.cause)?;
            writeln!(f, "  Requests:")?;
            for request in &group.requests {
                writeln!(f, "    {request}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Group failures by the text of their cause, preserving first-seen order.
pub fn aggregate<I>(failures: I) -> AggregateError
where
    I: IntoIterator<Item = RequestFailure>,
{
    AggregateError::from_failures(failures)
}

/// Wholesale failure: nothing could be classified per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("backend unavailable: {0}")]
    Backend(#[from] BackendError),

    #[error("balance collection cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
