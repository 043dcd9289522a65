//! This module contains the [`UpstreamClient`], a retrying, batching wrapper
//! around `alloy_rpc_client`'s HTTP transport. It is the only place in the
//! crate that speaks to the untrusted upstream.

use std::collections::HashSet;

use alloy::ClientBuilder;
use alloy_rpc_client::{self as alloy};
use alloy_transport_http::Http;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{ProxyError, Result};

/// Number of attempts (including the first) made before giving up on a
/// request or a batch sub-request. See `spec.md` §4.1.
const MAX_ATTEMPTS: usize = 5;

/// An HTTP-based JSON-RPC client that supports selective-retry batching and
/// a configurable set of methods that are never forwarded upstream.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    inner: alloy::RpcClient<Http<Client>>,
    unsupported: HashSet<&'static str>,
    supports_batch: bool,
}

impl UpstreamClient {
    /// Creates a new client against `url`, refusing to forward any method in
    /// `unsupported`, and falling back to sequential requests if
    /// `supports_batch` is false.
    pub fn new<U: Into<Url>>(
        url: U,
        unsupported: &[&'static str],
        supports_batch: bool,
        pool_max_idle_per_host: usize,
    ) -> Self {
        let http = Client::builder()
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .build()
            .expect("building the upstream reqwest client");

        let client = ClientBuilder::default().transport(Http::with_client(http, url.into()), true);

        Self {
            inner: client,
            unsupported: unsupported.iter().copied().collect(),
            supports_batch,
        }
    }

    fn check_supported(&self, method: &str) -> Result<()> {
        if self.unsupported.contains(method) {
            return Err(ProxyError::method_not_supported(method));
        }
        Ok(())
    }

    /// Performs a single JSON-RPC call, retrying transport failures up to
    /// [`MAX_ATTEMPTS`] times. A configured unsupported method fails
    /// synchronously without any network I/O.
    pub async fn request<P, R>(&self, method: &'static str, params: P) -> Result<R>
    where
        P: Serialize + Clone + Send + Sync,
        R: DeserializeOwned,
    {
        self.check_supported(method)?;

        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.inner.request::<P, R>(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(method, attempt, err = %err, "upstream request failed");
                    last_err = Some(err);
                }
            }
        }

        Err(ProxyError::internal(format!(
            "{method} failed after {MAX_ATTEMPTS} attempts: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Performs a batch of heterogeneous JSON-RPC calls. Unlike
    /// [`UpstreamClient::request`], a failing sub-request does not fail the
    /// whole batch: the returned vector always has one entry per input call,
    /// `Err` only for the sub-requests that never succeeded after
    /// [`MAX_ATTEMPTS`] selective-retry rounds.
    ///
    /// A batch containing any unsupported method fails as a whole, before
    /// any I/O is attempted.
    pub async fn request_batch(&self, calls: Vec<(&'static str, Value)>) -> Result<Vec<Result<Value>>> {
        for (method, _) in &calls {
            self.check_supported(method)?;
        }

        if !self.supports_batch {
            let mut results = Vec::with_capacity(calls.len());
            for (method, params) in calls {
                results.push(self.request(method, params).await);
            }
            return Ok(results);
        }

        let mut results: Vec<Option<Result<Value>>> = vec![None; calls.len()];
        let mut pending: Vec<usize> = (0..calls.len()).collect();

        for attempt in 1..=MAX_ATTEMPTS {
            if pending.is_empty() {
                break;
            }

            let mut batch = self.inner.new_batch();
            let mut waiters = Vec::with_capacity(pending.len());

            for &idx in &pending {
                let (method, params) = &calls[idx];
                let waiter = batch
                    .add_call::<Value, Value>(method, params)
                    .expect("serializable params");
                waiters.push((idx, waiter));
            }

            if let Err(err) = batch.send().await {
                tracing::warn!(attempt, err = %err, "upstream batch transport failure");
                for &idx in &pending {
                    results[idx] = Some(Err(ProxyError::internal(format!(
                        "batch transport failure: {err}"
                    ))));
                }
                continue;
            }

            let mut still_pending = Vec::new();
            for (idx, waiter) in waiters {
                match waiter.await {
                    Ok(value) => results[idx] = Some(Ok(value)),
                    Err(err) => {
                        tracing::warn!(
                            attempt,
                            method = calls[idx].0,
                            err = %err,
                            "upstream batch sub-request failed"
                        );
                        results[idx] = Some(Err(ProxyError::internal(err.to_string())));
                        still_pending.push(idx);
                    }
                }
            }

            pending = still_pending;
        }

        Ok(results
            .into_iter()
            .enumerate()
            .map(|(idx, res)| {
                res.unwrap_or_else(|| Err(ProxyError::upstream_exhausted(calls[idx].0, MAX_ATTEMPTS)))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use crate::test_util::launch_anvil;

    use super::*;

    #[tokio::test]
    async fn test_single_request() {
        let anvil = launch_anvil();
        let url = Url::from_str(&anvil.endpoint()).unwrap();
        let client = UpstreamClient::new(url, &[], true, 10);

        let block_number: String = client.request("eth_blockNumber", ()).await.unwrap();
        assert!(block_number.starts_with("0x"));
    }

    #[tokio::test]
    async fn test_unsupported_method_fails_fast() {
        let anvil = launch_anvil();
        let url = Url::from_str(&anvil.endpoint()).unwrap();
        let client = UpstreamClient::new(url, &["eth_subscribe"], true, 10);

        let err = client
            .request::<_, Value>("eth_subscribe", json!(["newHeads"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Internal(_)));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let anvil = launch_anvil();
        let url = Url::from_str(&anvil.endpoint()).unwrap();
        let client = UpstreamClient::new(url, &[], true, 10);

        let results = client
            .request_batch(vec![
                ("eth_blockNumber", json!([])),
                ("eth_chainId", json!([])),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
    }
}
