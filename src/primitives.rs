//! Core data model shared across the verification pipeline (`spec.md` §3).

use std::ops::Deref;

use alloy_consensus::{Header, TxEnvelope};
use alloy_primitives::{Address, BlockNumber, Bytes, B256, U256};
use alloy_rpc_types::{AccessList as RpcAccessList, EIP1186AccountProofResponse};

/// A block number/hash pair supplied out-of-band by the chain-head follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedHead {
    pub number: BlockNumber,
    pub hash: B256,
}

/// An Ethereum header that has been checked against its own hash, i.e.
/// `keccak(rlp(header)) == hash`.
///
/// Cheap to clone: the inner header is only ever read after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedHeader {
    pub header: Header,
    pub hash: B256,
}

impl Deref for VerifiedHeader {
    type Target = Header;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl VerifiedHeader {
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }
}

/// A full block whose header and transactions-trie have been verified.
/// Uncles are always empty (see `spec.md` §9, Open Question (b)).
#[derive(Debug, Clone)]
pub struct VerifiedBlock {
    pub header: VerifiedHeader,
    pub transactions: Vec<TxEnvelope>,
}

impl VerifiedBlock {
    pub fn hash(&self) -> B256 {
        self.header.hash
    }

    pub fn number(&self) -> BlockNumber {
        self.header.number()
    }
}

/// A raw `eth_getProof` response, renamed locally for clarity at call sites.
pub type AccountProof = EIP1186AccountProofResponse;

/// One entry of an account's storage proof.
pub type StorageProofEntry = alloy_rpc_types::EIP1186StorageProof;

/// An access-list entry augmented with the transaction's sender and target,
/// per `spec.md` §4.6 step 3.
#[derive(Debug, Clone, Default)]
pub struct AccessList(pub Vec<AccessListItem>);

#[derive(Debug, Clone)]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<B256>,
}

impl AccessList {
    /// Builds an access list from the upstream's `eth_createAccessList`
    /// response, ensuring `from` and (if present) `to` are covered even if
    /// the upstream omitted them.
    pub fn augmented(rpc_list: RpcAccessList, from: Address, to: Option<Address>) -> Self {
        let mut items: Vec<AccessListItem> = rpc_list
            .0
            .into_iter()
            .map(|item| AccessListItem {
                address: item.address,
                storage_keys: item.storage_keys,
            })
            .collect();

        if !items.iter().any(|item| item.address == from) {
            items.push(AccessListItem {
                address: from,
                storage_keys: Vec::new(),
            });
        }

        if let Some(to) = to {
            if !items.iter().any(|item| item.address == to) {
                items.push(AccessListItem {
                    address: to,
                    storage_keys: Vec::new(),
                });
            }
        }

        AccessList(items)
    }
}

/// Minimal account snapshot used by the RPC client's batched
/// balance/nonce lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountState {
    pub balance: U256,
    pub transaction_count: u64,
}

/// A contract bytecode blob paired with the address it was fetched for.
#[derive(Debug, Clone)]
pub struct FetchedCode {
    pub address: Address,
    pub code: Bytes,
}
