//! Transport-level error types.

use chainbalance_core::BackendError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to a JSON-RPC node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Call data could not be encoded, or return data could not be decoded.
    #[error("ABI error: {0}")]
    Abi(String),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

impl From<TransportError> for BackendError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http(msg) | TransportError::Other(msg) => BackendError::Transport(msg),
            TransportError::Timeout { ms } => BackendError::Timeout { ms },
            TransportError::Rpc(e) => BackendError::Rpc {
                code: e.code,
                message: e.message,
            },
            TransportError::Deserialization(e) => BackendError::Decode(e.to_string()),
            TransportError::Abi(msg) => BackendError::Decode(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_stay_retryable_in_core() {
        let http: BackendError = TransportError::Http("connection refused".into()).into();
        assert_eq!(http, BackendError::Transport("connection refused".into()));
        assert!(http.is_retryable());

        let timeout: BackendError = TransportError::Timeout { ms: 300 }.into();
        assert!(timeout.is_retryable());
    }

    #[test]
    fn rpc_errors_keep_code_and_message() {
        let err = TransportError::Rpc(JsonRpcError {
            code: -32000,
            message: "execution reverted".into(),
            data: None,
        });
        assert!(!err.is_retryable());
        assert_eq!(
            BackendError::from(err),
            BackendError::Rpc {
                code: -32000,
                message: "execution reverted".into()
            }
        );
    }
}
