//! Header & Block Verifier (`spec.md` §4.3).

use alloy_consensus::{Header, TxEnvelope};
use alloy_eips::{eip2718::Encodable2718, BlockNumberOrTag};
use alloy_primitives::B256;
use alloy_rpc_types::Block as RpcBlock;
use alloy_trie::root::ordered_trie_root;

use crate::{
    client::UpstreamClient,
    error::{ProxyError, Result},
    head::TrustedHeadStore,
    primitives::{VerifiedBlock, VerifiedHeader},
};

/// Fetches block headers and full blocks from the upstream and verifies
/// them against the [`TrustedHeadStore`], never trusting a hash the
/// upstream claims without recomputing it locally.
#[derive(Clone)]
pub struct HeaderVerifier {
    upstream: UpstreamClient,
    head_store: TrustedHeadStore,
}

impl HeaderVerifier {
    pub fn new(upstream: UpstreamClient, head_store: TrustedHeadStore) -> Self {
        Self { upstream, head_store }
    }

    /// Returns the verified header for `hash`, fetching and checking it
    /// against the upstream if not already cached.
    ///
    /// Rejects the header unless `header.hash_slow() == hash`.
    pub async fn header_by_hash(&self, hash: B256) -> Result<VerifiedHeader> {
        if let Some(cached) = self.head_store.cached_header(hash) {
            return Ok(cached);
        }

        let rpc_block: RpcBlock = self
            .upstream
            .request("eth_getBlockByHash", (hash, true))
            .await?;

        let header: Header = rpc_block.header.inner;
        let computed = header.hash_slow();

        if computed != hash {
            return Err(ProxyError::header_hash_mismatch(hash, computed));
        }

        let verified = VerifiedHeader { header, hash: computed };
        self.head_store.cache_header(verified.clone());
        Ok(verified)
    }

    /// Fetches the full block for `header.number`, verifies its hash matches
    /// `header.hash`, and verifies the transactions trie reconstructs
    /// `header.transactions_root`.
    ///
    /// A non-empty uncles list is a hard verification failure: uncle
    /// handling is not implemented (`spec.md` §9, Open Question (b)).
    pub async fn block(&self, header: &VerifiedHeader) -> Result<VerifiedBlock> {
        let rpc_block: RpcBlock = self
            .upstream
            .request(
                "eth_getBlockByNumber",
                (BlockNumberOrTag::Number(header.number()), true),
            )
            .await?;

        if rpc_block.header.hash != header.hash {
            return Err(ProxyError::header_hash_mismatch(header.hash, rpc_block.header.hash));
        }

        if !rpc_block.uncles.is_empty() {
            return Err(ProxyError::non_empty_uncles());
        }

        let transactions: Vec<TxEnvelope> = rpc_block
            .transactions
            .into_transactions()
            .map(|tx| tx.inner.into_inner())
            .collect();

        let encoded: Vec<Vec<u8>> = transactions
            .iter()
            .map(|tx| {
                let mut buf = Vec::new();
                tx.encode_2718(&mut buf);
                buf
            })
            .collect();

        let computed_root = ordered_trie_root(encoded.iter().map(|v| v.as_slice()));
        if computed_root != header.transactions_root {
            return Err(ProxyError::transactions_root_mismatch());
        }

        Ok(VerifiedBlock {
            header: header.clone(),
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use reqwest::Url;

    use crate::{head::TrustedHeadStore, test_util::launch_anvil};

    use super::*;

    #[tokio::test]
    async fn header_by_hash_rejects_tampered_hash() {
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

        let store = TrustedHeadStore::new(0, genesis_hash);
        let verifier = HeaderVerifier::new(upstream, store);

        let verified = verifier.header_by_hash(genesis_hash).await.unwrap();
        assert_eq!(verified.hash, genesis_hash);

        let wrong_hash = B256::repeat_byte(0xAB);
        let err = verifier.header_by_hash(wrong_hash).await;
        assert!(err.is_err(), "a mismatched hash must never verify");
    }

    #[tokio::test]
    async fn genesis_block_has_empty_transactions_root() {
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

        let store = TrustedHeadStore::new(0, genesis_hash);
        let verifier = HeaderVerifier::new(upstream, store);

        let header = verifier.header_by_hash(genesis_hash).await.unwrap();
        let block = verifier.block(&header).await.unwrap();
        assert!(block.transactions.is_empty());
    }
}
