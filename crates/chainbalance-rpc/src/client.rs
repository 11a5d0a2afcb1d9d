//! `EthBalanceClient`: the JSON-RPC implementation of `BalanceBackend`.
//!
//! ```text
//! native  ─▶ eth_getBalance(address, block)
//! token   ─▶ eth_call({to: token, data: balanceOf(address)}, block)
//! batch   ─▶ eth_call({to: multicall, data: aggregate3(calls)}, block)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chainbalance_core::backend::BALANCE_OF;
use chainbalance_core::{
    quantity_from_bytes, BackendError, BalanceBackend, BatchCall, BatchCallResult,
};
use serde_json::json;

use crate::error::TransportError;
use crate::multicall::{decode_aggregate3, encode_aggregate3, encode_call, parse_address};
use crate::transport::RpcTransport;

pub struct EthBalanceClient<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: RpcTransport> EthBalanceClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// `eth_getBalance`, returned as the node's hex quantity.
    pub async fn get_balance(&self, address: &str, block: &str) -> Result<String, TransportError> {
        self.transport
            .call(self.id(), "eth_getBalance", vec![json!(address), json!(block)])
            .await
    }

    /// `eth_call` against `to`, returned as the node's hex data string.
    pub async fn eth_call(&self, to: &str, data: &[u8], block: &str) -> Result<String, TransportError> {
        let tx = json!({ "to": to, "data": format!("0x{}", hex::encode(data)) });
        self.transport
            .call(self.id(), "eth_call", vec![tx, json!(block)])
            .await
    }
}

fn decode_hex_data(raw: &str) -> Result<Vec<u8>, TransportError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| TransportError::Abi(format!("invalid call result {raw:?}: {e}")))
}

#[async_trait]
impl<T: RpcTransport> BalanceBackend for EthBalanceClient<T> {
    async fn native_balance_at(&self, address: &str, block: &str) -> Result<String, BackendError> {
        Ok(self.get_balance(address, block).await?)
    }

    async fn token_balance_at(
        &self,
        address: &str,
        token: &str,
        block: &str,
    ) -> Result<String, BackendError> {
        let data = encode_call(BALANCE_OF, &[address.to_string()])?;
        let raw = self.eth_call(token, &data, block).await?;
        Ok(quantity_from_bytes(&decode_hex_data(&raw)?))
    }

    async fn call_batch(
        &self,
        contract: &str,
        calls: &[BatchCall],
        block: &str,
    ) -> Result<HashMap<String, Result<BatchCallResult, BackendError>>, BackendError> {
        let mut out = HashMap::with_capacity(calls.len());
        let mut keys = Vec::with_capacity(calls.len());
        let mut encoded = Vec::with_capacity(calls.len());
        for call in calls {
            let entry = parse_address(&call.target)
                .and_then(|target| Ok((target, encode_call(&call.signature, &call.args)?)));
            match entry {
                Ok(entry) => {
                    keys.push(call.key.clone());
                    encoded.push(entry);
                }
                Err(e) => {
                    tracing::warn!(
                        key = %call.key,
                        target = %call.target,
                        error = %e,
                        "dropping malformed call entry"
                    );
                    out.insert(call.key.clone(), Err(BackendError::from(e)));
                }
            }
        }
        if encoded.is_empty() {
            return Ok(out);
        }

        tracing::debug!(contract, block, calls = encoded.len(), "sending aggregate3");
        let raw = self
            .eth_call(contract, &encode_aggregate3(&encoded), block)
            .await?;
        let results = decode_aggregate3(&decode_hex_data(&raw)?, encoded.len())?;

        out.extend(
            keys.into_iter()
                .zip(results)
                .map(|(key, (success, value))| (key, Ok(BatchCallResult { success, value }))),
        );
        Ok(out)
    }
}
