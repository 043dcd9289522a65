//! Typed wrapper over the untrusted upstream JSON-RPC endpoint (`spec.md`
//! §4.1). Everything downstream of this module treats the upstream as
//! hostile: it may lie, time out, or simply not implement a method.

mod rpc;

pub use rpc::UpstreamClient;
