//! Batched strategy: requests sharing a block go out as one aggregated call.
//!
//! Each block-group is one round-trip through [`BalanceBackend::call_batch`].
//! Groups run concurrently. A round-trip that fails as a whole is retried up
//! to `round_trip_attempts` times; entries the aggregator reports as failed
//! are not retried here, they are handed back to the coordinator so only the
//! failing entries are resubmitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use super::{in_flight_limit, with_timeout, Execution, ExecutionStrategy};
use crate::backend::{BalanceBackend, BatchCall, BatchCallResult, BALANCE_OF, GET_ETH_BALANCE};
use crate::config::MulticallConfig;
use crate::error::{BackendError, BalanceError, FailureCause, RequestFailure};
use crate::parse::quantity_from_bytes;
use crate::policy::BackoffPolicy;
use crate::types::{BalanceRequest, Currency, RawBalance};

/// Requests of one block, keyed by their call-entry key.
struct BlockGroup<'a> {
    block: &'a str,
    entries: Vec<(String, &'a BalanceRequest)>,
}

pub struct BatchedStrategy {
    backend: Arc<dyn BalanceBackend>,
    config: MulticallConfig,
    concurrency: usize,
    call_timeout: Option<Duration>,
}

impl BatchedStrategy {
    pub fn new(backend: Arc<dyn BalanceBackend>, config: MulticallConfig) -> Self {
        Self {
            backend,
            config,
            concurrency: 0,
            call_timeout: None,
        }
    }

    /// Cap concurrent block-group round-trips (0 = unbounded).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The aggregated-call entry for one request.
    pub fn call_entry(&self, key: String, request: &BalanceRequest) -> BatchCall {
        let (target, signature) = match &request.currency {
            Currency::Native => (self.config.contract.clone(), GET_ETH_BALANCE),
            Currency::Token(token) => (token.clone(), BALANCE_OF),
        };
        BatchCall {
            key,
            target,
            signature: signature.to_string(),
            args: vec![request.address.clone()],
        }
    }

    async fn round_trip(
        &self,
        group: &BlockGroup<'_>,
    ) -> Result<HashMap<String, Result<BatchCallResult, BackendError>>, BackendError> {
        let calls: Vec<BatchCall> = group
            .entries
            .iter()
            .map(|(key, request)| self.call_entry(key.clone(), request))
            .collect();

        let attempts = self.config.round_trip_attempts.max(1);
        let backoff = BackoffPolicy::new(self.config.backoff.clone(), attempts - 1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let call = self
                .backend
                .call_batch(&self.config.contract, &calls, group.block);
            match with_timeout(self.call_timeout, call).await {
                Ok(results) => return Ok(results),
                Err(e) if e.is_retryable() => match backoff.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            error = %e,
                            block = group.block,
                            "retrying aggregated call"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            block = group.block,
                            "aggregated call attempts exhausted"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Group requests by block, keeping first-seen block order. Keys are
/// `<block>-<position>` so duplicate triples stay distinct entries.
fn group_by_block(requests: &[BalanceRequest]) -> Vec<BlockGroup<'_>> {
    let mut groups: IndexMap<&str, BlockGroup<'_>> = IndexMap::new();
    for (index, request) in requests.iter().enumerate() {
        let block = request.block.as_str();
        groups
            .entry(block)
            .or_insert_with(|| BlockGroup {
                block,
                entries: Vec::new(),
            })
            .entries
            .push((format!("{block}-{index}"), request));
    }
    groups.into_values().collect()
}

fn classify(
    group: BlockGroup<'_>,
    mut results: HashMap<String, Result<BatchCallResult, BackendError>>,
    execution: &mut Execution,
) {
    for (key, request) in group.entries {
        match results.remove(&key) {
            Some(Ok(result)) if result.success => execution.successes.push(RawBalance {
                request: request.clone(),
                balance: quantity_from_bytes(&result.value),
            }),
            Some(Ok(_)) => execution
                .failures
                .push(RequestFailure::new(request.clone(), FailureCause::VmExecution)),
            Some(Err(e)) => execution
                .failures
                .push(RequestFailure::new(request.clone(), e)),
            None => execution
                .failures
                .push(RequestFailure::new(request.clone(), FailureCause::MissingResult)),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for BatchedStrategy {
    async fn execute(
        &self,
        requests: &[BalanceRequest],
        cancel: &CancellationToken,
    ) -> Result<Execution, BalanceError> {
        if requests.is_empty() {
            return Ok(Execution::default());
        }

        let groups = group_by_block(requests);
        let limit = in_flight_limit(self.concurrency, groups.len());
        tracing::debug!(
            requests = requests.len(),
            groups = groups.len(),
            limit,
            "dispatching aggregated calls"
        );

        let trips: Vec<_> = groups
            .into_iter()
            .map(|group| async move {
                let outcome = self.round_trip(&group).await;
                (group, outcome)
            })
            .collect();
        let round = stream::iter(trips)
            .buffer_unordered(limit)
            .collect::<Vec<_>>();

        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BalanceError::Cancelled),
            outcomes = round => outcomes,
        };

        // Nothing classified: the backend is unreachable for every block.
        if let Some(first) = outcomes.iter().find_map(|(_, o)| o.as_ref().err()) {
            if outcomes.iter().all(|(_, o)| o.is_err()) {
                return Err(BalanceError::Backend(first.clone()));
            }
        }

        let mut execution = Execution::default();
        for (group, outcome) in outcomes {
            match outcome {
                Ok(results) => classify(group, results, &mut execution),
                Err(e) => {
                    tracing::warn!(block = group.block, error = %e, "aggregated call failed");
                    for (_, request) in group.entries {
                        execution
                            .failures
                            .push(RequestFailure::new(request.clone(), e.clone()));
                    }
                }
            }
        }
        Ok(execution)
    }

    fn name(&self) -> &'static str {
        "batched"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::config::BackoffConfig;

    /// Succeeds every entry except tokens listed in `reverting`; the first
    /// `flaky` round-trips fail with a transport error.
    struct MockMulticall {
        reverting: Vec<String>,
        flaky: AtomicUsize,
        trips: Mutex<Vec<(String, Vec<BatchCall>)>>,
    }

    impl MockMulticall {
        fn new(reverting: &[&str], flaky: usize) -> Self {
            Self {
                reverting: reverting.iter().map(|s| s.to_string()).collect(),
                flaky: AtomicUsize::new(flaky),
                trips: Mutex::new(Vec::new()),
            }
        }

        fn trip_count(&self) -> usize {
            self.trips.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BalanceBackend for MockMulticall {
        async fn native_balance_at(&self, _: &str, _: &str) -> Result<String, BackendError> {
            unreachable!("batched strategy never issues single calls")
        }

        async fn token_balance_at(&self, _: &str, _: &str, _: &str) -> Result<String, BackendError> {
            unreachable!("batched strategy never issues single calls")
        }

        async fn call_batch(
            &self,
            _contract: &str,
            calls: &[BatchCall],
            block: &str,
        ) -> Result<HashMap<String, Result<BatchCallResult, BackendError>>, BackendError> {
            self.trips
                .lock()
                .unwrap()
                .push((block.to_string(), calls.to_vec()));
            if self
                .flaky
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BackendError::Transport("connection reset".into()));
            }
            Ok(calls
                .iter()
                .map(|c| {
                    if c.args.iter().any(|a| a == "0xbadaddr") {
                        let e = BackendError::Decode(format!("invalid address {:?}", c.args[0]));
                        return (c.key.clone(), Err(e));
                    }
                    let success = !self.reverting.contains(&c.target);
                    let mut value = vec![0u8; 32];
                    value[31] = 0x64;
                    (c.key.clone(), Ok(BatchCallResult { success, value }))
                })
                .collect())
        }
    }

    fn strategy(backend: Arc<MockMulticall>, round_trip_attempts: u32) -> BatchedStrategy {
        BatchedStrategy::new(
            backend,
            MulticallConfig {
                contract: "0xmulticall".into(),
                round_trip_attempts,
                backoff: BackoffConfig::none(),
            },
        )
    }

    #[test]
    fn entries_target_aggregator_or_token() {
        let s = strategy(Arc::new(MockMulticall::new(&[], 0)), 1);
        let native = s.call_entry("k0".into(), &BalanceRequest::native("0x1", "0xA"));
        assert_eq!(native.target, "0xmulticall");
        assert_eq!(native.signature, GET_ETH_BALANCE);
        assert_eq!(native.args, vec!["0xA".to_string()]);

        let token = s.call_entry("k1".into(), &BalanceRequest::token("0x1", "0xA", "0xT"));
        assert_eq!(token.target, "0xT");
        assert_eq!(token.signature, BALANCE_OF);
    }

    #[test]
    fn grouping_keeps_duplicates_distinct() {
        let requests = vec![
            BalanceRequest::native("0x1", "0xA"),
            BalanceRequest::native("0x2", "0xA"),
            BalanceRequest::native("0x1", "0xA"),
        ];
        let groups = group_by_block(&requests);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].block, "0x1");
        let keys: Vec<_> = groups[0].entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["0x1-0", "0x1-2"]);
    }

    #[tokio::test]
    async fn one_round_trip_per_block() {
        let backend = Arc::new(MockMulticall::new(&[], 0));
        let requests = vec![
            BalanceRequest::native("0x1", "0xA"),
            BalanceRequest::token("0x1", "0xA", "0xT"),
            BalanceRequest::native("0x2", "0xA"),
        ];

        let exec = strategy(backend.clone(), 1)
            .execute(&requests, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exec.successes.len(), 3);
        assert!(exec.failures.is_empty());
        assert!(exec.successes.iter().all(|s| s.balance == "0x64"));

        let trips = backend.trips.lock().unwrap();
        assert_eq!(trips.len(), 2);
        for (block, calls) in trips.iter() {
            assert!(calls.iter().all(|c| c.key.starts_with(&format!("{block}-"))));
        }
    }

    #[tokio::test]
    async fn reverted_entries_become_vm_failures() {
        let backend = Arc::new(MockMulticall::new(&["0xbad"], 0));
        let requests = vec![
            BalanceRequest::token("0x1", "0xA", "0xbad"),
            BalanceRequest::token("0x1", "0xA", "0xgood"),
        ];

        let exec = strategy(backend, 1)
            .execute(&requests, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exec.successes.len(), 1);
        assert_eq!(exec.failures.len(), 1);
        assert_eq!(exec.failures[0].request, requests[0]);
        assert_eq!(exec.failures[0].cause, FailureCause::VmExecution);
        assert_eq!(exec.failures[0].cause.to_string(), "VM execution error");
    }

    #[tokio::test]
    async fn failed_round_trip_is_retried_whole() {
        let backend = Arc::new(MockMulticall::new(&[], 2));
        let requests = vec![BalanceRequest::native("0x1", "0xA")];

        let exec = strategy(backend.clone(), 3)
            .execute(&requests, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exec.successes.len(), 1);
        assert_eq!(backend.trip_count(), 3);
    }

    #[tokio::test]
    async fn every_group_down_is_wholesale() {
        let backend = Arc::new(MockMulticall::new(&[], 10));
        let requests = vec![
            BalanceRequest::native("0x1", "0xA"),
            BalanceRequest::native("0x2", "0xA"),
        ];

        let err = strategy(backend, 2)
            .execute(&requests, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BalanceError::Backend(BackendError::Transport("connection reset".into()))
        );
    }

    #[tokio::test]
    async fn missing_entry_is_reported() {
        struct Forgetful;

        #[async_trait]
        impl BalanceBackend for Forgetful {
            async fn native_balance_at(&self, _: &str, _: &str) -> Result<String, BackendError> {
                unreachable!()
            }
            async fn token_balance_at(&self, _: &str, _: &str, _: &str) -> Result<String, BackendError> {
                unreachable!()
            }
            async fn call_batch(
                &self,
                _: &str,
                _: &[BatchCall],
                _: &str,
            ) -> Result<HashMap<String, Result<BatchCallResult, BackendError>>, BackendError> {
                Ok(HashMap::new())
            }
        }

        let s = BatchedStrategy::new(Arc::new(Forgetful), MulticallConfig::default());
        let exec = s
            .execute(&[BalanceRequest::native("0x1", "0xA")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(exec.failures[0].cause, FailureCause::MissingResult);
    }

    #[tokio::test]
    async fn entry_errors_fail_only_their_request() {
        let backend = Arc::new(MockMulticall::new(&[], 0));
        let requests = vec![
            BalanceRequest::native("0x1", "0xbadaddr"),
            BalanceRequest::native("0x1", "0xA"),
        ];

        let exec = strategy(backend.clone(), 1)
            .execute(&requests, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exec.successes.len(), 1);
        assert_eq!(exec.successes[0].request, requests[1]);
        assert_eq!(exec.failures.len(), 1);
        assert_eq!(exec.failures[0].request, requests[0]);
        assert!(matches!(
            exec.failures[0].cause,
            FailureCause::Backend(BackendError::Decode(_))
        ));
        assert_eq!(backend.trip_count(), 1);
    }
}
