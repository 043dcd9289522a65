//! Verification engine: the part of the system that turns untrusted
//! upstream responses into data the caller can rely on.

pub mod header;
pub mod log;
pub mod state;

pub use header::HeaderVerifier;
pub use log::LogVerifier;
pub use state::StateProofVerifier;

/// `KECCAK256_RLP`: the root hash of the empty Merkle-Patricia trie,
/// `keccak256(rlp(""))`. Substituted for `storageHash == 0x0…0` per
/// `spec.md` §4.4 step 3.
pub const KECCAK256_RLP: alloy_primitives::B256 = alloy_primitives::b256!(
    "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
);

/// `KECCAK256_NULL`: `keccak256("")`, the canonical codeHash of an account
/// with no code. Substituted for `codeHash == 0x0…0` per `spec.md` §4.4 step
/// 3, and used by [`is_empty_code_sentinel`].
pub const KECCAK256_NULL: alloy_primitives::B256 = alloy_primitives::b256!(
    "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
);

/// True if `hash` is an accepted stand-in for "this account/code is empty":
/// either the real empty-code hash, or the all-zero sentinel some upstreams
/// return instead (`spec.md` §9, Open Question (d)).
pub fn is_empty_code_sentinel(hash: alloy_primitives::B256) -> bool {
    hash == KECCAK256_NULL || hash.is_zero()
}
