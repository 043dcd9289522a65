//! Verifying Provider (`spec.md` §4.7): the top-level façade exposing
//! Ethereum RPC methods. Orchestrates every other component, enforces the
//! block-tag policy, and is the only place that turns internal state into
//! the values a JSON-RPC client sees.

mod block_tag;

use alloy_consensus::{Transaction, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types::{Filter, Log, TransactionRequest};
use serde_json::{json, Value};

use crate::{
    client::UpstreamClient,
    config::Config,
    error::{ProxyError, Result},
    execution::ExecutionAdapter,
    head::TrustedHeadStore,
    primitives::{AccountProof, VerifiedHeader},
    verify::{header::HeaderVerifier, log::LogVerifier, state::StateProofVerifier},
};

pub use block_tag::resolve_spec_id;

/// Top-level façade: owns the [`TrustedHeadStore`] (via [`HeaderVerifier`]),
/// and wires the Upstream RPC Client into every verification component.
#[derive(Clone)]
pub struct VerifyingProvider {
    upstream: UpstreamClient,
    head_store: TrustedHeadStore,
    header_verifier: HeaderVerifier,
    state_verifier: StateProofVerifier,
    log_verifier: LogVerifier,
    execution: ExecutionAdapter,
    chain_id: u64,
    max_block_history: u64,
    max_block_future: u64,
}

impl VerifyingProvider {
    pub fn new(config: &Config, upstream: UpstreamClient, head_store: TrustedHeadStore) -> Self {
        let header_verifier = HeaderVerifier::new(upstream.clone(), head_store.clone());
        let log_verifier = LogVerifier::new(
            upstream.clone(),
            head_store.clone(),
            header_verifier.clone(),
            true,
        );
        let spec_id = resolve_spec_id(&config.hardfork);
        let execution = ExecutionAdapter::new(
            upstream.clone(),
            head_store.clone(),
            header_verifier.clone(),
            config.chain_id,
            spec_id,
        );

        Self {
            upstream,
            head_store,
            header_verifier,
            state_verifier: StateProofVerifier::new(),
            log_verifier,
            execution,
            chain_id: config.chain_id,
            max_block_history: config.max_block_history,
            max_block_future: config.max_block_future,
        }
    }

    /// `eth_blockNumber`.
    pub fn block_number(&self) -> U256 {
        U256::from(self.head_store.latest_number())
    }

    /// `eth_chainId`.
    pub fn chain_id(&self) -> U256 {
        U256::from(self.chain_id)
    }

    /// `net_version`.
    pub fn net_version(&self) -> String {
        self.chain_id.to_string()
    }

    /// `eth_getBalance`.
    pub async fn get_balance(&self, address: Address, tag: Value) -> Result<U256> {
        let (header, proof) = self.account_proof(address, &[], tag).await?;
        self.state_verifier
            .verify_account_and_storage(header.state_root, address, &[], &proof)?;
        Ok(proof.balance)
    }

    /// `eth_getTransactionCount`.
    pub async fn get_transaction_count(&self, address: Address, tag: Value) -> Result<u64> {
        let (header, proof) = self.account_proof(address, &[], tag).await?;
        self.state_verifier
            .verify_account_and_storage(header.state_root, address, &[], &proof)?;
        Ok(proof.nonce)
    }

    /// `eth_getCode`.
    pub async fn get_code(&self, address: Address, tag: Value) -> Result<Bytes> {
        let header = self.resolve_header(tag).await?;
        let block_tag = format!("0x{:x}", header.number());

        let mut results = self
            .upstream
            .request_batch(vec![
                ("eth_getProof", json!([address, Vec::<B256>::new(), block_tag.clone()])),
                ("eth_getCode", json!([address, block_tag])),
            ])
            .await?
            .into_iter();

        let proof: AccountProof = serde_json::from_value(results.next().expect("one reply")?)?;
        let code: Bytes = serde_json::from_value(results.next().expect("one reply")?)?;

        self.state_verifier
            .verify_account_and_storage(header.state_root, address, &[], &proof)?;

        if !self.state_verifier.verify_code(&code, proof.code_hash) {
            return Err(ProxyError::code_hash_mismatch(address));
        }

        Ok(code)
    }

    /// `eth_getBlockByNumber` / `eth_getBlockByHash`, depending on which tag
    /// is supplied. Returns `None` only when the caller asked for a hash
    /// that the upstream does not recognize at all (never for a hash that
    /// fails verification; that is a hard error).
    pub async fn get_block_by_number(&self, tag: Value, full: bool) -> Result<Option<Value>> {
        let header = self.resolve_header(tag).await?;
        self.render_block(header, full).await
    }

    pub async fn get_block_by_hash(&self, hash: B256, full: bool) -> Result<Option<Value>> {
        let header = self.header_verifier.header_by_hash(hash).await?;
        self.render_block(header, full).await
    }

    async fn render_block(&self, header: VerifiedHeader, full: bool) -> Result<Option<Value>> {
        let block = self.header_verifier.block(&header).await?;

        let transactions: Value = if full {
            json!(block
                .transactions
                .iter()
                .enumerate()
                .map(|(index, tx)| transaction_view(tx, &header, index as u64))
                .collect::<Vec<_>>())
        } else {
            json!(block.transactions.iter().map(|tx| *tx.hash()).collect::<Vec<_>>())
        };

        Ok(Some(json!({
            "number": format!("0x{:x}", header.number),
            "hash": header.hash,
            "parentHash": header.parent_hash,
            "stateRoot": header.state_root,
            "transactionsRoot": header.transactions_root,
            "receiptsRoot": header.receipts_root,
            "logsBloom": header.logs_bloom,
            "miner": header.beneficiary,
            "difficulty": format!("0x{:x}", header.difficulty),
            "gasLimit": format!("0x{:x}", header.gas_limit),
            "gasUsed": format!("0x{:x}", header.gas_used),
            "timestamp": format!("0x{:x}", header.timestamp),
            "extraData": header.extra_data,
            "baseFeePerGas": header.base_fee_per_gas.map(|f| format!("0x{f:x}")),
            "transactions": transactions,
            "uncles": Vec::<B256>::new(),
        })))
    }

    /// `eth_getLogs`.
    pub async fn get_logs(&self, filter: Filter) -> Result<Vec<Log>> {
        let logs: Vec<Log> = self.upstream.request("eth_getLogs", (filter,)).await?;
        self.log_verifier.verify_logs(logs).await
    }

    /// `eth_call`.
    pub async fn call(&self, tx: TransactionRequest, tag: Value) -> Result<Bytes> {
        let header = self.resolve_header(tag).await?;
        self.execution.call(tx, &header).await
    }

    /// `eth_estimateGas`.
    pub async fn estimate_gas(&self, tx: TransactionRequest, tag: Value) -> Result<u64> {
        let header = self.resolve_header(tag).await?;
        self.execution.estimate_gas(tx, &header).await
    }

    /// `eth_sendRawTransaction`. Forwards the raw bytes opaquely but ignores
    /// whatever hash the upstream reports, always returning the hash
    /// recomputed locally from the decoded transaction (`spec.md` §4.7).
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let tx = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|err| ProxyError::invalid_params(format!("malformed raw transaction: {err}")))?;
        let hash = *tx.hash();

        let _: Value = self.upstream.request("eth_sendRawTransaction", (raw,)).await?;

        Ok(hash)
    }

    /// `eth_getTransactionReceipt`. Block and transaction membership are
    /// verified; numeric and log fields are currently returned unverified,
    /// zeroed out, per the open question in `spec.md` §9(a).
    pub async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<Value>> {
        let receipt: Option<Value> = self.upstream.request("eth_getTransactionReceipt", (tx_hash,)).await?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };

        let block_hash: B256 = receipt
            .get("blockHash")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProxyError::internal("receipt is missing blockHash"))?;
        let block_number: u64 = receipt
            .get("blockNumber")
            .and_then(Value::as_str)
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| ProxyError::internal("receipt is missing blockNumber"))?;
        let tx_index: u64 = receipt
            .get("transactionIndex")
            .and_then(Value::as_str)
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| ProxyError::internal("receipt is missing transactionIndex"))?;

        let hash = self
            .head_store
            .block_hash(block_number, |h| {
                let header_verifier = self.header_verifier.clone();
                async move { header_verifier.header_by_hash(h).await }
            })
            .await?;
        if hash != block_hash {
            return Err(ProxyError::log_not_verifiable("receipt blockHash does not match trusted chain"));
        }

        let header = self.header_verifier.header_by_hash(hash).await?;
        let block = self.header_verifier.block(&header).await?;

        let position = block
            .transactions
            .iter()
            .position(|tx| *tx.hash() == tx_hash)
            .ok_or_else(|| ProxyError::log_not_verifiable("receipt transactionHash not found in verified block"))?;
        if position as u64 != tx_index {
            return Err(ProxyError::log_not_verifiable("receipt transactionIndex does not match verified block"));
        }

        Ok(Some(json!({
            "transactionHash": tx_hash,
            "transactionIndex": format!("0x{tx_index:x}"),
            "blockHash": block_hash,
            "blockNumber": format!("0x{block_number:x}"),
            // The remaining fields require full receipt-trie verification
            // (spec.md §9, Open Question (a)) and are not yet checked; they
            // are reported as zeroed placeholders rather than trusted
            // upstream values.
            "status": "0x0",
            "cumulativeGasUsed": "0x0",
            "gasUsed": "0x0",
            "logs": Vec::<Value>::new(),
            "logsBloom": B256::ZERO,
            "contractAddress": Value::Null,
        })))
    }

    /// Resolves `tag` to a verified header, enforcing the block-tag policy
    /// of `spec.md` §4.7 and suspending on [`TrustedHeadStore::wait_for`]
    /// when the caller asked for a not-yet-trusted future block.
    async fn resolve_header(&self, tag: Value) -> Result<VerifiedHeader> {
        let number = block_tag::resolve_number(
            &tag,
            self.head_store.latest_number(),
            self.max_block_history,
            self.max_block_future,
        )?;

        self.head_store.wait_for(number).await;

        let hash = self
            .head_store
            .block_hash(number, |h| {
                let header_verifier = self.header_verifier.clone();
                async move { header_verifier.header_by_hash(h).await }
            })
            .await?;

        self.header_verifier.header_by_hash(hash).await
    }

    async fn account_proof(&self, address: Address, keys: &[B256], tag: Value) -> Result<(VerifiedHeader, AccountProof)> {
        let header = self.resolve_header(tag).await?;
        let block_tag = format!("0x{:x}", header.number());
        let proof: AccountProof = self
            .upstream
            .request("eth_getProof", (address, keys.to_vec(), block_tag))
            .await?;
        Ok((header, proof))
    }
}

fn transaction_view(tx: &TxEnvelope, header: &VerifiedHeader, index: u64) -> Value {
    json!({
        "hash": tx.hash(),
        "blockHash": header.hash,
        "blockNumber": format!("0x{:x}", header.number),
        "transactionIndex": format!("0x{index:x}"),
        "type": format!("0x{:x}", tx.tx_type() as u8),
        "nonce": format!("0x{:x}", tx.nonce()),
        "to": tx.to(),
        "value": format!("0x{:x}", tx.value()),
        "gas": format!("0x{:x}", tx.gas_limit()),
        "input": tx.input(),
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use reqwest::Url;

    use crate::config::{
        DEFAULT_CHAIN_ID, DEFAULT_HARDFORK, DEFAULT_MAX_BLOCK_FUTURE, DEFAULT_MAX_BLOCK_HISTORY,
        DEFAULT_POOL_MAX_IDLE_PER_HOST,
    };

    use super::*;

    fn config_for(upstream_url: Url, trusted_block_number: u64, trusted_block_hash: B256) -> Config {
        Config {
            upstream_url,
            listen_addr: "127.0.0.1:0".to_string(),
            trusted_block_number,
            trusted_block_hash,
            chain_id: DEFAULT_CHAIN_ID,
            hardfork: DEFAULT_HARDFORK.to_string(),
            max_block_history: DEFAULT_MAX_BLOCK_HISTORY,
            max_block_future: DEFAULT_MAX_BLOCK_FUTURE,
            upstream_supports_batch: true,
            kzg_trusted_setup: None,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }

    /// spec.md §8 scenario S1: `eth_chainId` reports mainnet's chain id,
    /// `0x1`, purely from configuration, with no upstream call involved.
    #[test]
    fn eth_chain_id_reports_configured_mainnet_id() {
        let url = Url::from_str("http://127.0.0.1:1").unwrap();
        let upstream = UpstreamClient::new(url.clone(), &[], true, 1);
        let head_store = TrustedHeadStore::new(0, B256::ZERO);
        let config = config_for(url, 0, B256::ZERO);

        let provider = VerifyingProvider::new(&config, upstream, head_store);

        assert_eq!(provider.chain_id(), U256::from(1));
        assert_eq!(provider.net_version(), "1");
    }

    /// spec.md §8 scenarios S2/S3: `eth_getBalance` and `eth_getCode` for a
    /// known externally-owned mainnet account at a known historical block,
    /// verified end to end against a real upstream and a real state proof.
    #[tokio::test]
    async fn eth_get_balance_and_code_match_known_mainnet_block() {
        let url = Url::from_str("https://cloudflare-eth.com").unwrap();
        let upstream = UpstreamClient::new(url.clone(), &[], true, 10);

        let trusted_block_number = 15_898_565u64;
        let block: Value = upstream
            .request("eth_getBlockByNumber", (format!("0x{trusted_block_number:x}"), false))
            .await
            .unwrap();
        let trusted_block_hash: B256 = block.get("hash").unwrap().as_str().unwrap().parse().unwrap();

        let head_store = TrustedHeadStore::new(trusted_block_number, trusted_block_hash);
        let config = config_for(url, trusted_block_number, trusted_block_hash);
        let provider = VerifyingProvider::new(&config, upstream, head_store);

        let address: Address = "0x1A0DfD0252700c79Fc54269577bBEed16773F17a".parse().unwrap();
        let tag = json!(format!("0x{trusted_block_number:x}"));

        let balance = provider.get_balance(address, tag.clone()).await.unwrap();
        assert_eq!(balance, U256::from_str_radix("60e74857f86c4", 16).unwrap());

        let code = provider.get_code(address, tag).await.unwrap();
        assert!(code.is_empty(), "this address must be a plain externally-owned account");
    }
}
