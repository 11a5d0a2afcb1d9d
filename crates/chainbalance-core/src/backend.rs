//! The `BalanceBackend` trait: what the engine needs from a ledger node.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::BackendError;

/// Signature of the aggregator's native-balance getter.
pub const GET_ETH_BALANCE: &str = "getEthBalance(address)";

/// Signature of the ERC20 balance getter.
pub const BALANCE_OF: &str = "balanceOf(address)";

/// One entry of an aggregated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    /// Caller-chosen key, unique within one round-trip.
    pub key: String,
    /// Contract the entry is executed against.
    pub target: String,
    /// Solidity function signature, e.g. `balanceOf(address)`.
    pub signature: String,
    /// Address arguments, in order.
    pub args: Vec<String>,
}

/// Per-entry outcome of an aggregated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCallResult {
    pub success: bool,
    /// Raw return data of the entry.
    pub value: Vec<u8>,
}

/// A ledger node that can report balances.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one backend is shared by every
/// concurrent task of a round.
#[async_trait]
pub trait BalanceBackend: Send + Sync {
    /// Native balance of `address` at `block`, as a hex string.
    async fn native_balance_at(&self, address: &str, block: &str) -> Result<String, BackendError>;

    /// Token balance of `address` in `token` at `block`, as a hex string.
    async fn token_balance_at(
        &self,
        address: &str,
        token: &str,
        block: &str,
    ) -> Result<String, BackendError>;

    /// Execute every call in one round-trip against the aggregator `contract`
    /// at `block`, returning each entry's outcome by key.
    ///
    /// An entry that could not be issued (e.g. a malformed address) carries
    /// its own error and does not fail the rest of the round-trip.
    ///
    /// Default implementation reports the capability as unsupported.
    async fn call_batch(
        &self,
        contract: &str,
        calls: &[BatchCall],
        block: &str,
    ) -> Result<HashMap<String, Result<BatchCallResult, BackendError>>, BackendError> {
        let _ = (contract, calls, block);
        Err(BackendError::Unsupported("aggregated calls".into()))
    }
}
