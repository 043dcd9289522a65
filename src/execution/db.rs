//! The `revm::Database` the Execution Engine Adapter materializes verified
//! proofs into (`spec.md` §4.6 step 5, §9 "EVM blockchain patch").

use std::collections::HashSet;

use alloy_primitives::{Address, Bytes, B256, U256};
use revm::{
    db::{CacheDB, EmptyDB},
    primitives::{AccountInfo, Bytecode},
    Database,
};
use tokio::runtime::Handle;

use crate::{
    error::ProxyError,
    head::TrustedHeadStore,
    primitives::AccountProof,
    verify::{header::HeaderVerifier, KECCAK256_NULL},
};

/// A `revm::Database` backed exclusively by proof-verified accounts.
///
/// Two properties make this safe to hand to the EVM: [`Database::block_hash`]
/// is patched to consult the [`TrustedHeadStore`] instead of a local chain
/// (so `BLOCKHASH` cannot be spoofed by the upstream), and any address not
/// explicitly inserted via [`VerifiedStateDb::insert_verified_account`] is
/// refused rather than silently treated as empty. The access-list
/// augmentation note in `spec.md` §9 requires execution to fail loudly if it
/// escapes the materialized state, not zero-fill it.
pub struct VerifiedStateDb {
    cache: CacheDB<EmptyDB>,
    known: HashSet<Address>,
    head_store: TrustedHeadStore,
    header_verifier: HeaderVerifier,
}

impl VerifiedStateDb {
    pub fn new(head_store: TrustedHeadStore, header_verifier: HeaderVerifier) -> Self {
        Self {
            cache: CacheDB::new(EmptyDB::default()),
            known: HashSet::new(),
            head_store,
            header_verifier,
        }
    }

    /// Installs a proof-verified account's fields, storage, and code.
    /// `code` must already have been checked against `proof.code_hash` by
    /// the caller.
    pub fn insert_verified_account(&mut self, address: Address, proof: &AccountProof, code: Bytes) {
        let code_hash = if proof.code_hash.is_zero() {
            KECCAK256_NULL
        } else {
            proof.code_hash
        };

        let bytecode = if code.is_empty() {
            Bytecode::new()
        } else {
            Bytecode::new_raw(code)
        };

        self.cache.insert_account_info(
            address,
            AccountInfo {
                balance: proof.balance,
                nonce: proof.nonce,
                code_hash,
                code: Some(bytecode),
            },
        );

        for entry in &proof.storage_proof {
            let _ = self
                .cache
                .insert_account_storage(address, B256::from(entry.key).into(), entry.value);
        }

        self.known.insert(address);
    }
}

impl Database for VerifiedStateDb {
    type Error = ProxyError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        if !self.known.contains(&address) {
            return Err(ProxyError::escaped_materialized_state(address));
        }
        Ok(self.cache.basic(address).expect("CacheDB<EmptyDB> is infallible"))
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        Ok(self
            .cache
            .code_by_hash(code_hash)
            .expect("CacheDB<EmptyDB> is infallible"))
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        if !self.known.contains(&address) {
            return Err(ProxyError::escaped_materialized_state(address));
        }
        Ok(self
            .cache
            .storage(address, index)
            .expect("CacheDB<EmptyDB> is infallible"))
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        let head_store = self.head_store.clone();
        let header_verifier = self.header_verifier.clone();

        tokio::task::block_in_place(move || {
            Handle::current().block_on(async move {
                head_store
                    .block_hash(number, |hash| {
                        let header_verifier = header_verifier.clone();
                        async move { header_verifier.header_by_hash(hash).await }
                    })
                    .await
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_address_is_refused_not_zero_filled() {
        let head_store = TrustedHeadStore::new(0, B256::ZERO);
        let upstream = crate::client::UpstreamClient::new(
            reqwest::Url::parse("http://localhost:1").unwrap(),
            &[],
            true,
            1,
        );
        let header_verifier = HeaderVerifier::new(upstream, head_store.clone());
        let mut db = VerifiedStateDb::new(head_store, header_verifier);

        let err = db.basic(Address::repeat_byte(0x42)).unwrap_err();
        assert!(matches!(err, ProxyError::Internal(_)));
    }
}
