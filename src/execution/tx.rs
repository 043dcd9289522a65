//! Call-transaction fee-field validation and type inference (`spec.md`
//! §4.6 step 1 and the EIP-1559 typing note in step "estimateGas").

use alloy_rpc_types::TransactionRequest;

use crate::error::{ProxyError, Result};

/// The inferred transaction type, used only to decide which fee fields the
/// EVM environment should read: type 2 iff any max-fee field is present,
/// type 1 iff an `accessList` is present, else legacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEnvelopeKind {
    Legacy,
    Eip2930,
    Eip1559,
}

impl TxEnvelopeKind {
    pub fn of(tx: &TransactionRequest) -> Self {
        if tx.max_fee_per_gas.is_some() || tx.max_priority_fee_per_gas.is_some() {
            TxEnvelopeKind::Eip1559
        } else if tx.access_list.is_some() {
            TxEnvelopeKind::Eip2930
        } else {
            TxEnvelopeKind::Legacy
        }
    }
}

/// Rejects contradictory fee fields per `spec.md` §4.6 step 1:
/// `gasPrice` is mutually exclusive with both EIP-1559 fee fields, and
/// `maxPriorityFeePerGas` must not exceed `maxFeePerGas`.
pub fn validate_fee_fields(tx: &TransactionRequest) -> Result<()> {
    if tx.gas_price.is_some() && tx.max_fee_per_gas.is_some() {
        return Err(ProxyError::invalid_params(
            "gasPrice and maxFeePerGas are mutually exclusive",
        ));
    }
    if tx.gas_price.is_some() && tx.max_priority_fee_per_gas.is_some() {
        return Err(ProxyError::invalid_params(
            "gasPrice and maxPriorityFeePerGas are mutually exclusive",
        ));
    }
    if let (Some(priority), Some(max)) = (tx.max_priority_fee_per_gas, tx.max_fee_per_gas) {
        if priority > max {
            return Err(ProxyError::invalid_params(
                "maxPriorityFeePerGas must not exceed maxFeePerGas",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_tx() -> TransactionRequest {
        TransactionRequest::default()
    }

    #[test]
    fn rejects_gas_price_with_max_fee_per_gas() {
        let mut tx = base_tx();
        tx.gas_price = Some(1);
        tx.max_fee_per_gas = Some(2);
        assert!(validate_fee_fields(&tx).is_err());
    }

    #[test]
    fn rejects_priority_fee_above_max_fee() {
        let mut tx = base_tx();
        tx.max_fee_per_gas = Some(10);
        tx.max_priority_fee_per_gas = Some(20);
        assert!(validate_fee_fields(&tx).is_err());
    }

    #[test]
    fn accepts_well_formed_eip1559_fees() {
        let mut tx = base_tx();
        tx.max_fee_per_gas = Some(20);
        tx.max_priority_fee_per_gas = Some(10);
        assert!(validate_fee_fields(&tx).is_ok());
        assert_eq!(TxEnvelopeKind::of(&tx), TxEnvelopeKind::Eip1559);
    }

    #[test]
    fn infers_legacy_without_any_fee_markers() {
        assert_eq!(TxEnvelopeKind::of(&base_tx()), TxEnvelopeKind::Legacy);
    }
}
