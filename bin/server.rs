//! `verirpc` binary entrypoint: loads configuration, seeds the trusted head,
//! and serves the JSON-RPC HTTP surface.

use tracing_subscriber::EnvFilter;
use verirpc::{
    client::UpstreamClient, config::Config, head::TrustedHeadStore, provider::VerifyingProvider, rpc,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    tracing::info!(
        upstream = %config.upstream_url,
        trusted_block = config.trusted_block_number,
        chain_id = config.chain_id,
        "starting verirpc"
    );

    let upstream = UpstreamClient::new(
        config.upstream_url.clone(),
        config.unsupported_upstream_methods(),
        config.upstream_supports_batch,
        config.pool_max_idle_per_host,
    );

    let head_store = TrustedHeadStore::new(config.trusted_block_number, config.trusted_block_hash);

    let provider = VerifyingProvider::new(&config, upstream, head_store);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "listening for JSON-RPC requests");

    axum::serve(listener, rpc::router(provider)).await?;

    Ok(())
}
