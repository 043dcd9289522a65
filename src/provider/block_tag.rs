//! Block-tag resolution policy (`spec.md` §4.7) and hardfork → EVM spec id
//! mapping.

use alloy_eips::BlockNumberOrTag;
use revm::primitives::SpecId;
use serde_json::Value;

use crate::error::{ProxyError, Result};

/// Resolves a JSON-RPC block-tag value to a concrete block number, applying
/// the servable-range policy. `pending`/`earliest`/`finalized`/`safe` are
/// rejected outright; a numeric tag beyond `latest` is accepted but the
/// caller is expected to await it via [`crate::head::TrustedHeadStore::wait_for`]
/// before use.
pub fn resolve_number(tag: &Value, latest: u64, max_history: u64, max_future: u64) -> Result<u64> {
    let parsed: BlockNumberOrTag = serde_json::from_value(tag.clone())
        .map_err(|_| ProxyError::invalid_params(format!("malformed block tag: {tag}")))?;

    let number = match parsed {
        BlockNumberOrTag::Latest => return Ok(latest),
        BlockNumberOrTag::Number(n) => n,
        BlockNumberOrTag::Pending
        | BlockNumberOrTag::Earliest
        | BlockNumberOrTag::Finalized
        | BlockNumberOrTag::Safe => return Err(ProxyError::unsupported_tag(&parsed.to_string())),
    };

    let floor = latest.saturating_sub(max_history);
    let ceiling = latest.saturating_add(max_future);
    if number < floor || number > ceiling {
        return Err(ProxyError::block_out_of_range(number, latest));
    }

    Ok(number)
}

/// Maps an operator-configured hardfork name to the `revm` spec id used for
/// `eth_call`/`eth_estimateGas`. Defaults to Cancun for anything
/// unrecognized, matching `spec.md` §6's configuration default.
pub fn resolve_spec_id(hardfork: &str) -> SpecId {
    match hardfork.to_ascii_lowercase().as_str() {
        "frontier" => SpecId::FRONTIER,
        "homestead" => SpecId::HOMESTEAD,
        "byzantium" => SpecId::BYZANTIUM,
        "constantinople" => SpecId::CONSTANTINOPLE,
        "petersburg" => SpecId::PETERSBURG,
        "istanbul" => SpecId::ISTANBUL,
        "berlin" => SpecId::BERLIN,
        "london" => SpecId::LONDON,
        "paris" | "merge" => SpecId::MERGE,
        "shanghai" => SpecId::SHANGHAI,
        "cancun" => SpecId::CANCUN,
        other => {
            tracing::warn!(hardfork = other, "unrecognized hardfork name, defaulting to Cancun");
            SpecId::CANCUN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn latest_resolves_to_current_head() {
        assert_eq!(resolve_number(&json!("latest"), 100, 256, 3).unwrap(), 100);
    }

    #[test]
    fn rejects_pending_and_friends() {
        for tag in ["pending", "earliest", "finalized", "safe"] {
            assert!(resolve_number(&json!(tag), 100, 256, 3).is_err());
        }
    }

    #[test]
    fn rejects_numeric_tag_beyond_servable_range() {
        assert!(resolve_number(&json!("0x1"), 1000, 256, 3).is_err());
        assert!(resolve_number(&json!("0x3ec"), 1000, 256, 3).is_ok());
    }

    #[test]
    fn accepts_near_future_tag_for_waiting() {
        assert_eq!(resolve_number(&json!("0x67"), 100, 256, 3).unwrap(), 103);
    }
}
