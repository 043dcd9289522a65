//! Execution Engine Adapter (`spec.md` §4.6): trustless `eth_call` /
//! `eth_estimateGas` against state materialized exclusively from verified
//! proofs.
//!
//! The upstream's `eth_createAccessList` is trusted only to the extent that
//! its output is a *superset* of the state the transaction touches. Every
//! entry it names is independently fetched and proof-verified before the
//! call runs. [`VerifiedStateDb`] then refuses any address the EVM touches
//! that was not in that materialized set, so a short access list can only
//! make execution fail, never lie silently.

mod db;
mod tx;

use alloy_primitives::{Address, Bytes, U256};
use alloy_rpc_types::{AccessListWithGasUsed, TransactionRequest};
use revm::{
    primitives::{ExecutionResult, Output, SpecId, TxKind},
    Evm,
};
use serde_json::json;

use crate::{
    client::UpstreamClient,
    error::{ProxyError, Result},
    head::TrustedHeadStore,
    primitives::{AccessList, VerifiedHeader},
    verify::{header::HeaderVerifier, state::StateProofVerifier},
};

pub use db::VerifiedStateDb;
use tx::{validate_fee_fields, TxEnvelopeKind};

/// Runs `eth_call`/`eth_estimateGas` against a verified header, materializing
/// only the accounts, storage slots, and code the upstream's access list
/// names.
#[derive(Clone)]
pub struct ExecutionAdapter {
    upstream: UpstreamClient,
    head_store: TrustedHeadStore,
    header_verifier: HeaderVerifier,
    state_verifier: StateProofVerifier,
    chain_id: u64,
    spec_id: SpecId,
}

impl ExecutionAdapter {
    pub fn new(
        upstream: UpstreamClient,
        head_store: TrustedHeadStore,
        header_verifier: HeaderVerifier,
        chain_id: u64,
        spec_id: SpecId,
    ) -> Self {
        Self {
            upstream,
            head_store,
            header_verifier,
            state_verifier: StateProofVerifier::new(),
            chain_id,
            spec_id,
        }
    }

    /// Executes a read-only call against `header`, returning the raw return
    /// bytes. Any EVM-level error (revert, halt, execution failure) surfaces
    /// as [`ProxyError::Internal`].
    pub async fn call(&self, tx: TransactionRequest, header: &VerifiedHeader) -> Result<Bytes> {
        validate_fee_fields(&tx)?;

        let from = tx.from.unwrap_or_default();
        let gas_price = effective_gas_price(&tx);

        let db = self.materialize(&tx, header).await?;

        let mut evm = Evm::builder()
            .with_db(db)
            .with_spec_id(self.spec_id)
            .modify_cfg_env(|cfg| {
                cfg.chain_id = self.chain_id;
                cfg.disable_block_gas_limit = false;
            })
            .modify_block_env(|block| apply_block_env(block, header))
            .modify_tx_env(|tx_env| {
                apply_tx_env(tx_env, &tx, from, gas_price);
                tx_env.gas_limit = tx.gas.unwrap_or(header.gas_limit);
            })
            .build();

        let result = evm
            .transact()
            .map_err(|err| ProxyError::internal(format!("EVM execution failed: {err:?}")))?
            .result;

        output_bytes(result)
    }

    /// Executes `tx` with nonce/balance/block-gas-limit checks disabled and
    /// returns the total gas spent.
    pub async fn estimate_gas(&self, tx: TransactionRequest, header: &VerifiedHeader) -> Result<u64> {
        validate_fee_fields(&tx)?;

        let from = tx.from.unwrap_or_default();
        let gas_price = effective_gas_price(&tx);

        let db = self.materialize(&tx, header).await?;

        let mut evm = Evm::builder()
            .with_db(db)
            .with_spec_id(self.spec_id)
            .modify_cfg_env(|cfg| {
                cfg.chain_id = self.chain_id;
                cfg.disable_nonce_check = true;
                cfg.disable_balance_check = true;
                cfg.disable_block_gas_limit = true;
            })
            .modify_block_env(|block| apply_block_env(block, header))
            .modify_tx_env(|tx_env| {
                apply_tx_env(tx_env, &tx, from, gas_price);
                tx_env.gas_limit = tx.gas.unwrap_or(header.gas_limit);
            })
            .build();

        let result = evm
            .transact()
            .map_err(|err| ProxyError::internal(format!("EVM execution failed: {err:?}")))?
            .result;

        match result {
            ExecutionResult::Success { gas_used, .. } => Ok(gas_used),
            ExecutionResult::Revert { gas_used, output } => Err(ProxyError::internal(format!(
                "execution reverted while estimating gas: 0x{}; gas_used={gas_used}",
                hex::encode(output)
            ))),
            ExecutionResult::Halt { reason, gas_used } => Err(ProxyError::internal(format!(
                "execution halted while estimating gas: {reason:?}; gas_used={gas_used}"
            ))),
        }
    }

    /// Obtains an access list from upstream, augments it with `from`/`to`,
    /// fetches and verifies every touched account/storage/code blob, and
    /// materializes the result into a fresh [`VerifiedStateDb`].
    async fn materialize(&self, tx: &TransactionRequest, header: &VerifiedHeader) -> Result<VerifiedStateDb> {
        let block_tag = format!("0x{:x}", header.number());

        let access_list_result: AccessListWithGasUsed = self
            .upstream
            .request("eth_createAccessList", (tx.clone(), block_tag.clone()))
            .await?;

        let to = match tx.to {
            Some(TxKind::Call(addr)) => Some(addr),
            _ => None,
        };
        let access_list = AccessList::augmented(access_list_result.access_list, tx.from.unwrap_or_default(), to);

        let mut calls = Vec::with_capacity(access_list.0.len() * 2);
        for entry in &access_list.0 {
            calls.push((
                "eth_getProof",
                json!([entry.address, entry.storage_keys, block_tag]),
            ));
            calls.push(("eth_getCode", json!([entry.address, block_tag])));
        }

        let mut results = self.upstream.request_batch(calls).await?.into_iter();

        let mut db = VerifiedStateDb::new(self.head_store.clone(), self.header_verifier.clone());

        for entry in &access_list.0 {
            let proof_value = results.next().expect("one eth_getProof reply per access-list entry")?;
            let code_value = results.next().expect("one eth_getCode reply per access-list entry")?;

            let proof: crate::primitives::AccountProof = serde_json::from_value(proof_value)?;
            let code: Bytes = serde_json::from_value(code_value)?;

            self.state_verifier
                .verify_account_and_storage(header.state_root, entry.address, &entry.storage_keys, &proof)?;

            if !self.state_verifier.verify_code(&code, proof.code_hash) {
                return Err(ProxyError::code_hash_mismatch(entry.address));
            }

            db.insert_verified_account(entry.address, &proof, code);
        }

        Ok(db)
    }
}

fn effective_gas_price(tx: &TransactionRequest) -> U256 {
    tx.gas_price
        .map(U256::from)
        .or_else(|| tx.max_priority_fee_per_gas.map(U256::from))
        .unwrap_or_default()
}

fn apply_block_env(block: &mut revm::primitives::BlockEnv, header: &VerifiedHeader) {
    block.number = U256::from(header.number());
    block.coinbase = header.beneficiary;
    block.timestamp = U256::from(header.timestamp);
    block.gas_limit = U256::from(header.gas_limit);
    block.basefee = U256::from(header.base_fee_per_gas.unwrap_or_default());
    block.difficulty = header.difficulty;
    block.prevrandao = Some(header.mix_hash);
}

fn apply_tx_env(tx_env: &mut revm::primitives::TxEnv, tx: &TransactionRequest, from: Address, gas_price: U256) {
    tx_env.caller = from;
    tx_env.transact_to = tx.to.unwrap_or(TxKind::Create);
    tx_env.value = tx.value.unwrap_or_default();
    tx_env.data = tx.input.input.clone().unwrap_or_default();
    tx_env.gas_price = gas_price;
    tx_env.nonce = None;
    tx_env.chain_id = tx.chain_id;
    tx_env.access_list = tx
        .access_list
        .clone()
        .map(|list| list.0.into_iter().map(|item| (item.address, item.storage_keys)).collect())
        .unwrap_or_default();

    match TxEnvelopeKind::of(tx) {
        TxEnvelopeKind::Eip1559 => {
            tx_env.gas_priority_fee = tx.max_priority_fee_per_gas.map(U256::from);
        }
        TxEnvelopeKind::Eip2930 | TxEnvelopeKind::Legacy => {
            tx_env.gas_priority_fee = None;
        }
    }
}

fn output_bytes(result: ExecutionResult) -> Result<Bytes> {
    match result {
        ExecutionResult::Success { output, .. } => match output {
            Output::Call(bytes) => Ok(bytes),
            Output::Create(bytes, _) => Ok(bytes),
        },
        ExecutionResult::Revert { output, .. } => Err(ProxyError::internal(format!(
            "execution reverted: 0x{}",
            hex::encode(output)
        ))),
        ExecutionResult::Halt { reason, .. } => {
            Err(ProxyError::internal(format!("execution halted: {reason:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use alloy_primitives::B256;
    use reqwest::Url;

    use crate::{head::TrustedHeadStore, test_util::launch_anvil, verify::header::HeaderVerifier};

    use super::*;

    /// `eth_call`/`eth_estimateGas` against a plain value transfer between
    /// two funded anvil accounts, exercised through the full materialize →
    /// verify → execute pipeline. Anvil stands in for the exact mainnet
    /// fixture of `spec.md` §8 scenarios S4/S5, whose calldata is truncated
    /// there and unavailable anywhere else in the corpus.
    #[tokio::test]
    async fn call_and_estimate_gas_transfer_between_funded_accounts() {
        let anvil = launch_anvil();
        let url = Url::from_str(&anvil.endpoint()).unwrap();
        let upstream = UpstreamClient::new(url, &[], true, 10);

        let genesis_hash: B256 = upstream
            .request::<_, serde_json::Value>("eth_getBlockByNumber", ("0x0", false))
            .await
            .unwrap()
            .get("hash")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap();

        let head_store = TrustedHeadStore::new(0, genesis_hash);
        let header_verifier = HeaderVerifier::new(upstream.clone(), head_store.clone());
        let header = header_verifier.header_by_hash(genesis_hash).await.unwrap();

        let adapter = ExecutionAdapter::new(upstream, head_store, header_verifier, 31337, SpecId::CANCUN);

        let mut tx = TransactionRequest::default();
        tx.from = Some(anvil.addresses()[0]);
        tx.to = Some(TxKind::Call(anvil.addresses()[1]));
        tx.value = Some(U256::from(1_000_000_000_000_000u64));

        let output = adapter.call(tx.clone(), &header).await.unwrap();
        assert!(output.is_empty(), "a plain value transfer returns no call data");

        let gas_used = adapter.estimate_gas(tx, &header).await.unwrap();
        assert_eq!(gas_used, 21_000, "a plain value transfer costs exactly the base fee");
    }
}
