//! `verirpc`: a verifying Ethereum JSON-RPC proxy.
//!
//! Forwards data-fetching to an untrusted upstream RPC endpoint and returns
//! only responses checked against a small set of trusted block hashes
//! supplied out-of-band. See the module docs on [`provider::VerifyingProvider`]
//! for the top-level orchestration, and [`verify`] for the cryptographic
//! core.

pub mod client;
pub mod config;
pub mod error;
pub mod execution;
pub mod head;
pub mod primitives;
pub mod provider;
pub mod rpc;
pub mod verify;

#[cfg(test)]
pub mod test_util;
