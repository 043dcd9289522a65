//! Error types surfaced by the verifying provider.
//!
//! Every failure mode in the core collapses into one of two JSON-RPC-visible
//! kinds: [`ProxyError::InvalidParams`] or [`ProxyError::Internal`]. See
//! `spec.md` §7 for the propagation policy these variants encode.

use alloy_primitives::{Address, BlockNumber, B256};
use thiserror::Error;

/// Top-level error type for the verification core.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The caller supplied malformed or out-of-policy data. Maps to JSON-RPC
    /// code `-32602`.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The upstream failed, lied, or the local EVM raised. Never retried and
    /// never silently downgraded. Maps to JSON-RPC code `-32603`.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// JSON-RPC 2.0 error code for this error kind.
    pub fn rpc_code(&self) -> i64 {
        match self {
            ProxyError::InvalidParams(_) => -32602,
            ProxyError::Internal(_) => -32603,
        }
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        ProxyError::InvalidParams(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ProxyError::Internal(msg.into())
    }

    /// A block tag referred to a block number outside `[latest -
    /// MAX_BLOCK_HISTORY, latest + MAX_BLOCK_FUTURE]`.
    pub fn block_out_of_range(requested: u64, latest: u64) -> Self {
        ProxyError::InvalidParams(format!(
            "block {requested} is out of the servable range around latest {latest}"
        ))
    }

    /// One of `pending`/`earliest`/`finalized`/`safe` was requested.
    pub fn unsupported_tag(tag: &str) -> Self {
        ProxyError::InvalidParams(format!("block tag '{tag}' is not supported"))
    }

    pub fn header_hash_mismatch(expected: B256, got: B256) -> Self {
        ProxyError::Internal(format!(
            "header hash mismatch: expected {expected}, computed {got}"
        ))
    }

    pub fn transactions_root_mismatch() -> Self {
        ProxyError::Internal("transactions trie root does not match header".into())
    }

    pub fn non_empty_uncles() -> Self {
        ProxyError::Internal("block has non-empty uncle list; uncle verification is not implemented".into())
    }

    pub fn account_proof_invalid(address: Address) -> Self {
        ProxyError::Internal(format!("account proof for {address} failed verification"))
    }

    pub fn storage_proof_invalid(address: Address, key: B256) -> Self {
        ProxyError::Internal(format!(
            "storage proof for {address}/{key} failed verification"
        ))
    }

    pub fn code_hash_mismatch(address: Address) -> Self {
        ProxyError::Internal(format!("returned code for {address} does not hash to codeHash"))
    }

    pub fn log_not_verifiable(reason: &str) -> Self {
        ProxyError::Internal(format!("log could not be verified: {reason}"))
    }

    pub fn receipt_root_mismatch(block: BlockNumber) -> Self {
        ProxyError::Internal(format!(
            "reconstructed receipt trie root does not match header at block {block}"
        ))
    }

    pub fn upstream_exhausted(method: &str, attempts: usize) -> Self {
        ProxyError::Internal(format!(
            "upstream call to '{method}' failed after {attempts} attempts"
        ))
    }

    pub fn method_not_supported(method: &str) -> Self {
        ProxyError::Internal(format!("method '{method}' is not supported by the upstream provider"))
    }

    pub fn escaped_materialized_state(address: Address) -> Self {
        ProxyError::Internal(format!(
            "execution touched {address}, which was not present in the materialized access list state"
        ))
    }
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<alloy_transport::TransportError> for ProxyError {
    fn from(err: alloy_transport::TransportError) -> Self {
        ProxyError::Internal(format!("transport error: {err}"))
    }
}

impl From<alloy_rlp::Error> for ProxyError {
    fn from(err: alloy_rlp::Error) -> Self {
        ProxyError::Internal(format!("rlp decode error: {err}"))
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Internal(format!("json decode error: {err}"))
    }
}
