//! Log Verifier (`spec.md` §4.5): ties a returned log back to a verified
//! block, a verified transaction, a bloom-positive header, and a
//! reconstructed receipt trie.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use alloy_consensus::{ReceiptEnvelope, TxReceipt};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Bloom, BloomInput, BlockNumber, B256};
use alloy_rpc_types::Log;
use alloy_trie::root::ordered_trie_root;

use crate::{
    client::UpstreamClient,
    error::{ProxyError, Result},
    head::TrustedHeadStore,
    primitives::VerifiedBlock,
    verify::header::HeaderVerifier,
};

/// Verifies returned logs against block membership, transaction membership,
/// bloom-filter membership, and a reconstructed receipt trie.
#[derive(Clone)]
pub struct LogVerifier {
    upstream: UpstreamClient,
    head_store: TrustedHeadStore,
    header_verifier: HeaderVerifier,
    /// Whether the upstream is known to support `eth_getBlockReceipts`.
    /// Starts optimistic; latched to `false` the first time the upstream
    /// reports the method unsupported, after which every subsequent block
    /// falls back straight to per-transaction receipts without retrying the
    /// batch call (`spec.md` §4.5). Shared across clones so the fallback
    /// decision made by one request is remembered by the next.
    block_receipts_supported: Arc<AtomicBool>,
}

impl LogVerifier {
    pub fn new(
        upstream: UpstreamClient,
        head_store: TrustedHeadStore,
        header_verifier: HeaderVerifier,
        block_receipts_supported: bool,
    ) -> Self {
        Self {
            upstream,
            head_store,
            header_verifier,
            block_receipts_supported: Arc::new(AtomicBool::new(block_receipts_supported)),
        }
    }

    /// Verifies every log in `logs`, returning them unchanged if all checks
    /// pass, or the first verification failure encountered.
    pub async fn verify_logs(&self, logs: Vec<Log>) -> Result<Vec<Log>> {
        let mut receipts_by_block: HashMap<B256, Vec<ReceiptEnvelope>> = HashMap::new();
        let mut blocks_by_number: HashMap<BlockNumber, VerifiedBlock> = HashMap::new();

        for log in &logs {
            self.verify_one(log, &mut blocks_by_number, &mut receipts_by_block).await?;
        }

        Ok(logs)
    }

    async fn verify_one(
        &self,
        log: &Log,
        blocks_by_number: &mut HashMap<BlockNumber, VerifiedBlock>,
        receipts_by_block: &mut HashMap<B256, Vec<ReceiptEnvelope>>,
    ) -> Result<()> {
        let block_number = log
            .block_number
            .ok_or_else(|| ProxyError::log_not_verifiable("missing blockNumber (pending log)"))?;
        let block_hash = log
            .block_hash
            .ok_or_else(|| ProxyError::log_not_verifiable("missing blockHash (pending log)"))?;
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| ProxyError::log_not_verifiable("missing transactionHash (pending log)"))?;
        let tx_index = log
            .transaction_index
            .ok_or_else(|| ProxyError::log_not_verifiable("missing transactionIndex (pending log)"))?;
        if log.log_index.is_none() {
            return Err(ProxyError::log_not_verifiable("missing logIndex (pending log)"));
        }

        let verified_block = self.verified_block_at(block_number, blocks_by_number).await?;
        if verified_block.hash() != block_hash {
            return Err(ProxyError::log_not_verifiable("blockHash does not match verified block"));
        }

        let tx_pos = verified_block
            .transactions
            .iter()
            .position(|tx| *tx.hash() == tx_hash)
            .ok_or_else(|| ProxyError::log_not_verifiable("transactionHash not found in verified block"))?;
        if tx_pos as u64 != tx_index {
            return Err(ProxyError::log_not_verifiable("transactionIndex does not match verified block"));
        }

        let bloom = verified_block.header.logs_bloom;
        if !bloom.contains_input(BloomInput::Raw(log.address().as_slice())) {
            return Err(ProxyError::log_not_verifiable("address is not bloom-positive"));
        }
        for topic in log.topics() {
            if !bloom.contains_input(BloomInput::Raw(topic.as_slice())) {
                return Err(ProxyError::log_not_verifiable("topic is not bloom-positive"));
            }
        }

        let receipts = self.receipts_for_block(&verified_block, receipts_by_block).await?;

        let computed_root = ordered_trie_root(receipts.iter().map(|r| {
            let mut buf = Vec::new();
            r.encode_2718(&mut buf);
            buf
        }));
        if computed_root != verified_block.header.receipts_root {
            return Err(ProxyError::receipt_root_mismatch(block_number));
        }

        let receipt = receipts
            .get(tx_pos)
            .ok_or_else(|| ProxyError::log_not_verifiable("no receipt at transaction index"))?;

        let matches = receipt.logs().iter().any(|candidate| {
            candidate.address == log.address()
                && candidate.data == log.data().clone()
                && candidate.topics() == log.topics()
        });
        if !matches {
            return Err(ProxyError::log_not_verifiable(
                "no matching log entry in reconstructed receipt",
            ));
        }

        Ok(())
    }

    async fn verified_block_at(
        &self,
        number: BlockNumber,
        cache: &mut HashMap<BlockNumber, VerifiedBlock>,
    ) -> Result<VerifiedBlock> {
        if let Some(block) = cache.get(&number) {
            return Ok(block.clone());
        }

        let head_store = self.head_store.clone();
        let header_verifier = self.header_verifier.clone();
        let hash = head_store
            .block_hash(number, |h| {
                let header_verifier = header_verifier.clone();
                async move { header_verifier.header_by_hash(h).await }
            })
            .await?;

        let header = self.header_verifier.header_by_hash(hash).await?;
        let block = self.header_verifier.block(&header).await?;
        cache.insert(number, block.clone());
        Ok(block)
    }

    async fn receipts_for_block(
        &self,
        block: &VerifiedBlock,
        cache: &mut HashMap<B256, Vec<ReceiptEnvelope>>,
    ) -> Result<Vec<ReceiptEnvelope>> {
        if let Some(receipts) = cache.get(&block.hash()) {
            return Ok(receipts.clone());
        }

        let receipts = if self.block_receipts_supported.load(Ordering::Relaxed) {
            match self
                .upstream
                .request("eth_getBlockReceipts", (block.number(),))
                .await
            {
                Ok(receipts) => receipts,
                Err(ProxyError::Internal(msg)) if is_method_unsupported_error(&msg) => {
                    tracing::warn!("upstream does not support eth_getBlockReceipts, falling back to per-transaction receipts");
                    self.block_receipts_supported.store(false, Ordering::Relaxed);
                    self.fetch_receipts_individually(block).await?
                }
                Err(err) => return Err(err),
            }
        } else {
            self.fetch_receipts_individually(block).await?
        };

        cache.insert(block.hash(), receipts.clone());
        Ok(receipts)
    }

    /// Fetches every transaction's receipt individually via a single
    /// batched `eth_getTransactionReceipt` call, the fallback path when
    /// `eth_getBlockReceipts` is unsupported (`spec.md` §4.5).
    async fn fetch_receipts_individually(&self, block: &VerifiedBlock) -> Result<Vec<ReceiptEnvelope>> {
        let calls = block
            .transactions
            .iter()
            .map(|tx| ("eth_getTransactionReceipt", serde_json::json!([tx.hash()])))
            .collect();

        let results = self.upstream.request_batch(calls).await?;
        let mut receipts = Vec::with_capacity(results.len());
        for result in results {
            let value = result?;
            let receipt: ReceiptEnvelope = serde_json::from_value(value)?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }
}

/// Heuristic match for the various ways an upstream signals "I don't
/// implement this JSON-RPC method". Varies across clients (geth, erigon,
/// reth) and isn't a dedicated JSON-RPC error code.
fn is_method_unsupported_error(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("not supported") || lower.contains("method not found") || lower.contains("unsupported method")
}
