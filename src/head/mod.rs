//! The Trusted-Head Store (`spec.md` §4.2): the single piece of mutable,
//! shared state in the whole core. One logical writer (`update`) and many
//! readers; see `spec.md` §5 for the concurrency contract.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{BlockNumber, B256};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    error::{ProxyError, Result},
    primitives::VerifiedHeader,
};

struct Inner {
    latest_number: BlockNumber,
    hashes: HashMap<BlockNumber, B256>,
    headers: HashMap<B256, VerifiedHeader>,
    waiters: HashMap<BlockNumber, Arc<Notify>>,
}

/// Holds the latest trusted block number, a number→hash mapping fed by the
/// external head-follower, a cache of verified headers, and wake-up signals
/// for callers awaiting a future block number.
///
/// Cloning is cheap: the inner state is `Arc`-shared.
#[derive(Clone)]
pub struct TrustedHeadStore {
    inner: Arc<Mutex<Inner>>,
}

impl TrustedHeadStore {
    /// Seeds the store with the operator-supplied initial trusted head.
    pub fn new(initial_number: BlockNumber, initial_hash: B256) -> Self {
        let mut hashes = HashMap::new();
        hashes.insert(initial_number, initial_hash);

        Self {
            inner: Arc::new(Mutex::new(Inner {
                latest_number: initial_number,
                hashes,
                headers: HashMap::new(),
                waiters: HashMap::new(),
            })),
        }
    }

    /// Records a newly trusted block. If `number` was already known with a
    /// different hash, this is a reorg: we log a warning but still
    /// overwrite, since the newer trusted hash always takes precedence.
    ///
    /// If `number` advances `latest_number`, every waiter at or below the
    /// new latest is signalled and dropped.
    pub fn update(&self, hash: B256, number: BlockNumber) {
        let mut inner = self.inner.lock();

        if let Some(&existing) = inner.hashes.get(&number) {
            if existing != hash {
                tracing::warn!(
                    number,
                    old_hash = %existing,
                    new_hash = %hash,
                    "reorg detected at trusted block height"
                );
            }
        }
        inner.hashes.insert(number, hash);

        if number > inner.latest_number {
            inner.latest_number = number;

            let to_notify: Vec<BlockNumber> = inner
                .waiters
                .keys()
                .filter(|&&waiting_number| waiting_number <= number)
                .copied()
                .collect();

            for waiting_number in to_notify {
                if let Some(notify) = inner.waiters.remove(&waiting_number) {
                    notify.notify_waiters();
                }
            }
        }
    }

    /// The current latest trusted block number.
    pub fn latest_number(&self) -> BlockNumber {
        self.inner.lock().latest_number
    }

    /// Returns immediately if `number` is already trusted; otherwise
    /// suspends until an `update()` call crosses it. Multiple callers
    /// waiting on the same number share one registration and are all
    /// released by a single crossing `update()`, in unspecified order.
    pub async fn wait_for(&self, number: BlockNumber) {
        let notify = {
            let mut inner = self.inner.lock();
            if number <= inner.latest_number {
                return;
            }
            inner
                .waiters
                .entry(number)
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        };

        notify.notified().await;
    }

    /// Returns the trusted hash at `number`, if already known.
    pub fn known_hash(&self, number: BlockNumber) -> Option<B256> {
        self.inner.lock().hashes.get(&number).copied()
    }

    /// Records the trusted hash for a block number derived by walking
    /// parent pointers (see [`TrustedHeadStore::block_hash`]).
    fn record_hash(&self, number: BlockNumber, hash: B256) {
        self.inner.lock().hashes.entry(number).or_insert(hash);
    }

    /// Returns a cached verified header by hash, if present.
    pub fn cached_header(&self, hash: B256) -> Option<VerifiedHeader> {
        self.inner.lock().headers.get(&hash).cloned()
    }

    /// Caches a verified header, keyed by its own hash.
    pub fn cache_header(&self, header: VerifiedHeader) {
        self.inner.lock().headers.insert(header.hash, header);
    }

    /// Resolves the trusted hash for `number`, walking backward from
    /// `latest_number` and verifying headers as needed. `fetch_parent` is
    /// called with a block hash and must return a verified header for it
    /// (typically backed by the Header & Block Verifier).
    ///
    /// Fails if `number` is greater than `latest_number`.
    pub async fn block_hash<F, Fut>(&self, number: BlockNumber, fetch_header: F) -> Result<B256>
    where
        F: Fn(B256) -> Fut,
        Fut: std::future::Future<Output = Result<VerifiedHeader>>,
    {
        if let Some(hash) = self.known_hash(number) {
            return Ok(hash);
        }

        let latest = self.latest_number();
        if number > latest {
            return Err(ProxyError::invalid_params(format!(
                "cannot resolve block {number}: beyond latest trusted block {latest}"
            )));
        }

        let mut cursor = latest;
        let mut cursor_hash = self
            .known_hash(latest)
            .ok_or_else(|| ProxyError::internal("latest trusted block has no known hash"))?;

        while cursor > number {
            let header = fetch_header(cursor_hash).await?;
            let parent_hash = header.header.parent_hash;
            cursor -= 1;
            self.record_hash(cursor, parent_hash);
            cursor_hash = parent_hash;
        }

        Ok(cursor_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> B256 {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        B256::from(bytes)
    }

    #[test]
    fn latest_number_is_monotonic() {
        let store = TrustedHeadStore::new(10, hash(1));
        assert_eq!(store.latest_number(), 10);

        store.update(hash(2), 12);
        assert_eq!(store.latest_number(), 12);

        // An older update must never move latest_number backward.
        store.update(hash(3), 11);
        assert_eq!(store.latest_number(), 12);
    }

    #[test]
    fn reorg_overwrites_known_hash() {
        let store = TrustedHeadStore::new(10, hash(1));
        store.update(hash(2), 11);
        assert_eq!(store.known_hash(11), Some(hash(2)));

        store.update(hash(3), 11);
        assert_eq!(store.known_hash(11), Some(hash(3)));
    }

    #[tokio::test]
    async fn wait_for_future_block_completes_on_update() {
        let store = TrustedHeadStore::new(10, hash(1));
        let waiter_store = store.clone();

        let waiter = tokio::spawn(async move {
            waiter_store.wait_for(11).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.update(hash(2), 11);

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait_for did not complete in time")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_past_block_returns_immediately() {
        let store = TrustedHeadStore::new(10, hash(1));
        tokio::time::timeout(std::time::Duration::from_millis(50), store.wait_for(5))
            .await
            .expect("wait_for should not block for a past block");
    }
}
