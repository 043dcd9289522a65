//! Request dispatch: decodes the envelope, calls into
//! [`VerifyingProvider`], and re-encodes the result or error.

use std::sync::Arc;

use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Address, Bytes, B256};
use alloy_rpc_types::{Filter, TransactionRequest};
use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::ProxyError,
    provider::VerifyingProvider,
    rpc::envelope::{JsonRpcError, JsonRpcRequest, JsonRpcRequestBatch, JsonRpcResponse},
};

#[derive(Serialize)]
#[serde(untagged)]
enum JsonRpcResponseBatch {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// Parses the request body by hand rather than relying on `axum::Json`'s
/// own extractor rejection, so a malformed body surfaces as a JSON-RPC
/// `-32700` parse error instead of a bare HTTP 400.
pub async fn handle(State(provider): State<Arc<VerifyingProvider>>, body: String) -> Json<Value> {
    let batch: JsonRpcRequestBatch = match serde_json::from_str(&body) {
        Ok(batch) => batch,
        Err(err) => {
            let response = JsonRpcResponse::failure(Value::Null, JsonRpcError::parse_error(err));
            return Json(serde_json::to_value(response).expect("JsonRpcResponse always serializes"));
        }
    };

    let response = match batch {
        JsonRpcRequestBatch::Single(req) => {
            JsonRpcResponseBatch::Single(dispatch_one(&provider, req).await)
        }
        JsonRpcRequestBatch::Batch(requests) => {
            let mut responses = Vec::with_capacity(requests.len());
            for req in requests {
                responses.push(dispatch_one(&provider, req).await);
            }
            JsonRpcResponseBatch::Batch(responses)
        }
    };

    Json(serde_json::to_value(response).expect("JsonRpcResponse always serializes"))
}

async fn dispatch_one(provider: &VerifyingProvider, req: JsonRpcRequest) -> JsonRpcResponse {
    let id = req.id.clone();
    match call_method(provider, &req).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(DispatchError::Proxy(err)) => JsonRpcResponse::failure(id, err.into()),
        Err(DispatchError::NotFound) => JsonRpcResponse::failure(id, JsonRpcError::method_not_found(&req.method)),
    }
}

enum DispatchError {
    Proxy(ProxyError),
    NotFound,
}

impl From<ProxyError> for DispatchError {
    fn from(err: ProxyError) -> Self {
        DispatchError::Proxy(err)
    }
}

/// Supported method surface from `spec.md` §6, one arm per method, each
/// decoding `params` and calling the matching [`VerifyingProvider`] method.
async fn call_method(provider: &VerifyingProvider, req: &JsonRpcRequest) -> Result<Value, DispatchError> {
    let params = &req.params;

    match req.method.as_str() {
        "eth_blockNumber" => Ok(json!(provider.block_number())),
        "eth_chainId" => Ok(json!(provider.chain_id())),
        "net_version" => Ok(json!(provider.net_version())),

        "eth_getBalance" => {
            let address: Address = param(params, 0)?;
            Ok(json!(provider.get_balance(address, block_tag(params)).await?))
        }
        "eth_getTransactionCount" => {
            let address: Address = param(params, 0)?;
            let count = provider.get_transaction_count(address, block_tag(params)).await?;
            Ok(json!(format!("0x{count:x}")))
        }
        "eth_getCode" => {
            let address: Address = param(params, 0)?;
            Ok(json!(provider.get_code(address, block_tag(params)).await?))
        }
        "eth_getBlockByNumber" => {
            let tag = params.get(0).cloned().unwrap_or(json!("latest"));
            let full = params.get(1).and_then(Value::as_bool).unwrap_or(false);
            Ok(json!(provider.get_block_by_number(tag, full).await?))
        }
        "eth_getBlockByHash" => {
            let hash: B256 = param(params, 0)?;
            let full = params.get(1).and_then(Value::as_bool).unwrap_or(false);
            Ok(json!(provider.get_block_by_hash(hash, full).await?))
        }
        "eth_getLogs" => {
            let filter_value = params.get(0).cloned().ok_or_else(|| {
                ProxyError::invalid_params("eth_getLogs requires a filter object")
            })?;
            let filter: Filter = serde_json::from_value(filter_value)
                .map_err(|err| ProxyError::invalid_params(format!("malformed filter: {err}")))?;
            Ok(json!(provider.get_logs(filter).await?))
        }
        "eth_call" => {
            let tx: TransactionRequest = param(params, 0)?;
            Ok(json!(provider.call(tx, block_tag(params)).await?))
        }
        "eth_estimateGas" => {
            let tx: TransactionRequest = param(params, 0)?;
            let gas = provider.estimate_gas(tx, block_tag(params)).await?;
            Ok(json!(format!("0x{gas:x}")))
        }
        "eth_getTransactionReceipt" => {
            let hash: B256 = param(params, 0)?;
            Ok(json!(provider.get_transaction_receipt(hash).await?))
        }
        "eth_sendRawTransaction" => {
            let raw: Bytes = param(params, 0)?;
            validate_raw_tx(&raw)?;
            Ok(json!(provider.send_raw_transaction(raw).await?))
        }

        _ => Err(DispatchError::NotFound),
    }
}

/// Cheap sanity check ahead of the round-trip through the upstream: a raw
/// transaction that doesn't even decode locally is rejected immediately.
fn validate_raw_tx(raw: &Bytes) -> Result<(), ProxyError> {
    alloy_consensus::TxEnvelope::decode_2718(&mut raw.as_ref())
        .map(|_| ())
        .map_err(|err| ProxyError::invalid_params(format!("malformed raw transaction: {err}")))
}

fn param<T: serde::de::DeserializeOwned>(params: &Value, index: usize) -> Result<T, ProxyError> {
    let value = params
        .get(index)
        .ok_or_else(|| ProxyError::invalid_params(format!("missing parameter at index {index}")))?;
    serde_json::from_value(value.clone())
        .map_err(|err| ProxyError::invalid_params(format!("malformed parameter at index {index}: {err}")))
}

/// The optional block-tag argument most read methods accept as their last
/// parameter, defaulting to `"latest"` per `spec.md` §6.
fn block_tag(params: &Value) -> Value {
    params.get(1).cloned().unwrap_or(json!("latest"))
}
