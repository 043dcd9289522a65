//! Process configuration: CLI flags, environment variables (via `.env`), and
//! defaults, in that order of precedence.

use std::path::PathBuf;

use alloy_primitives::B256;
use clap::Parser;
use reqwest::Url;

/// Mainnet chain id, the default when `--chain-id` is not given.
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Maximum number of blocks behind `latest` a block tag may reference.
pub const DEFAULT_MAX_BLOCK_HISTORY: u64 = 256;

/// Maximum number of blocks ahead of `latest` a block tag may reference
/// (callers may wait for these to materialize).
pub const DEFAULT_MAX_BLOCK_FUTURE: u64 = 3;

/// Default size of the shared upstream HTTP connection pool.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Default hardfork name used to configure the EVM spec id.
pub const DEFAULT_HARDFORK: &str = "cancun";

#[derive(Debug, Clone, Parser)]
#[command(name = "verirpc", about = "Verifying Ethereum JSON-RPC proxy")]
pub struct Config {
    /// URL of the untrusted upstream JSON-RPC endpoint.
    #[arg(long, env = "VERIRPC_UPSTREAM_URL")]
    pub upstream_url: Url,

    /// Address to bind the inbound JSON-RPC HTTP server to.
    #[arg(long, env = "VERIRPC_LISTEN_ADDR", default_value = "0.0.0.0:8545")]
    pub listen_addr: String,

    /// Block number of the initial trusted head, seeded before any requests
    /// are served.
    #[arg(long, env = "VERIRPC_TRUSTED_BLOCK_NUMBER")]
    pub trusted_block_number: u64,

    /// Block hash of the initial trusted head.
    #[arg(long, env = "VERIRPC_TRUSTED_BLOCK_HASH")]
    pub trusted_block_hash: B256,

    /// Chain id to report via `eth_chainId` / `net_version`.
    #[arg(long, env = "VERIRPC_CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    /// Hardfork name, used to pick the EVM spec id for `eth_call` /
    /// `eth_estimateGas`.
    #[arg(long, env = "VERIRPC_HARDFORK", default_value = DEFAULT_HARDFORK)]
    pub hardfork: String,

    /// Maximum distance behind `latest` a numeric block tag may reference.
    #[arg(long, env = "VERIRPC_MAX_BLOCK_HISTORY", default_value_t = DEFAULT_MAX_BLOCK_HISTORY)]
    pub max_block_history: u64,

    /// Maximum distance ahead of `latest` a numeric block tag may reference.
    #[arg(long, env = "VERIRPC_MAX_BLOCK_FUTURE", default_value_t = DEFAULT_MAX_BLOCK_FUTURE)]
    pub max_block_future: u64,

    /// Whether the upstream supports batched JSON-RPC requests.
    #[arg(long, env = "VERIRPC_UPSTREAM_SUPPORTS_BATCH", default_value_t = true)]
    pub upstream_supports_batch: bool,

    /// Optional path to a KZG trusted-setup file, required for blob-carrying
    /// transaction support.
    #[arg(long, env = "VERIRPC_KZG_TRUSTED_SETUP")]
    pub kzg_trusted_setup: Option<PathBuf>,

    /// Maximum idle connections kept open per upstream host.
    #[arg(long, env = "VERIRPC_POOL_MAX_IDLE_PER_HOST", default_value_t = DEFAULT_POOL_MAX_IDLE_PER_HOST)]
    pub pool_max_idle_per_host: usize,
}

impl Config {
    /// Parses configuration from CLI args and `.env`, in that order of
    /// precedence (CLI > env > default, per `clap`'s `env` attribute
    /// resolution).
    pub fn load() -> eyre::Result<Self> {
        // Silently ignore a missing .env; CLI/env vars still work standalone.
        let _ = dotenvy::dotenv();
        Ok(Config::parse())
    }

    /// The set of upstream method names this proxy will never forward,
    /// failing fast without any network I/O.
    pub fn unsupported_upstream_methods(&self) -> &'static [&'static str] {
        &["eth_subscribe", "eth_unsubscribe", "eth_newFilter", "eth_getFilterChanges"]
    }
}
