//! chainbalance-rpc: JSON-RPC and Multicall3 backend for `chainbalance-core`.
//!
//! [`EthBalanceClient`] implements [`BalanceBackend`](chainbalance_core::BalanceBackend)
//! over any [`RpcTransport`]; [`HttpRpcClient`] is the `reqwest` transport.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainbalance_core::{Bookkeeper, BookkeeperConfig};
//!
//! # fn build() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = chainbalance_rpc::connect("http://localhost:8545")?;
//! let bookkeeper = Bookkeeper::new(Arc::new(backend), BookkeeperConfig::default())?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod multicall;
pub mod request;
pub mod transport;

pub use client::EthBalanceClient;
pub use error::TransportError;
pub use http::{HttpClientConfig, HttpRpcClient};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;

/// Balance client over HTTP with default transport settings.
pub fn connect(url: impl Into<String>) -> Result<EthBalanceClient<HttpRpcClient>, TransportError> {
    Ok(EthBalanceClient::new(HttpRpcClient::default_for(url)?))
}
