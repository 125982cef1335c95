//! The single pair of transaction primitives everything submits through.
//!
//! The orchestrator and the custody operations only ever need two things
//! from the chain: a fresh account nonce and a confirmed submission. The
//! `ChainClient` trait captures exactly that, which keeps the step sequence
//! testable without any RPC plumbing behind it.

use alloy_primitives::{Address, U256};
use candid::Nat;

use crate::constants::{MAX_INCLUSION_CHECKS, RECEIPT_CYCLES};
use crate::providers::{extract_multi_rpc_result, get_ranked_rpc_providers};
use crate::types::DerivationPath;

use super::common::{extract_call_result, get_nonce};
use super::error::{ManagerError, ManagerResult};
use super::evm_rpc::{SendRawTransactionStatus, Service, TransactionReceipt};
use super::transaction_builder::TransactionBuilder;

#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// Reads the account's pending transaction count from the chain
    async fn fresh_nonce(&self) -> ManagerResult<u64>;

    /// Broadcasts one transaction and waits until it is included in a block.
    /// Returns the transaction hash.
    async fn submit_and_confirm(
        &self,
        contract: Address,
        calldata: Vec<u8>,
        value: U256,
        nonce: u64,
    ) -> ManagerResult<String>;
}

/// Production client backed by the EVM RPC canister and the threshold signer
pub struct EvmRpcClient {
    rpc: Service,
    eoa: Address,
    derivation_path: DerivationPath,
}

impl EvmRpcClient {
    pub fn new(rpc: Service, eoa: Address, derivation_path: DerivationPath) -> Self {
        Self {
            rpc,
            eoa,
            derivation_path,
        }
    }

    /// Polls for the receipt until the transaction lands or the cap is hit.
    /// Each poll is a cross-canister call, so the wait yields between checks.
    async fn wait_for_inclusion(&self, tx_hash: &str) -> ManagerResult<()> {
        let rpc_canister = self.rpc;
        let hash = tx_hash.to_string();
        await_receipt(tx_hash, move || {
            let hash = hash.clone();
            async move {
                let rpc = get_ranked_rpc_providers();
                let call_result = rpc_canister
                    .eth_get_transaction_receipt(rpc, None, hash, RECEIPT_CYCLES)
                    .await;
                let wrapped = extract_call_result(call_result)?;
                extract_multi_rpc_result(wrapped)
            }
        })
        .await
    }
}

/// Drives a receipt fetcher until the transaction lands, reverts, or the
/// polling cap is exhausted
async fn await_receipt<F, Fut>(tx_hash: &str, mut fetch: F) -> ManagerResult<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ManagerResult<Option<TransactionReceipt>>>,
{
    for _ in 0..MAX_INCLUSION_CHECKS {
        if let Some(receipt) = fetch().await? {
            if receipt.status == Some(Nat::from(1_u8)) {
                return Ok(());
            }
            return Err(ManagerError::Custom(format!(
                "transaction {} reverted on-chain",
                tx_hash
            )));
        }
    }

    Err(ManagerError::InclusionTimeout {
        tx_hash: tx_hash.to_string(),
    })
}

impl ChainClient for EvmRpcClient {
    async fn fresh_nonce(&self) -> ManagerResult<u64> {
        let nonce = get_nonce(&self.rpc, self.eoa).await?;
        Ok(nonce.to::<u64>())
    }

    async fn submit_and_confirm(
        &self,
        contract: Address,
        calldata: Vec<u8>,
        value: U256,
        nonce: u64,
    ) -> ManagerResult<String> {
        let status = TransactionBuilder::default()
            .to(contract)
            .data(calldata)
            .value(value)
            .nonce(nonce)
            .derivation_path(self.derivation_path.clone())
            .send(&self.rpc)
            .await?;

        let tx_hash = match status {
            SendRawTransactionStatus::Ok(Some(tx_hash)) => tx_hash,
            SendRawTransactionStatus::Ok(None) => {
                return Err(ManagerError::Custom(
                    "the transaction was broadcast but no hash was returned".to_string(),
                ))
            }
            SendRawTransactionStatus::InsufficientFunds => {
                return Err(ManagerError::Custom(
                    "the wallet cannot cover the gas fee".to_string(),
                ))
            }
            SendRawTransactionStatus::NonceTooLow | SendRawTransactionStatus::NonceTooHigh => {
                return Err(ManagerError::Custom(format!(
                    "stale nonce {} rejected by the chain",
                    nonce
                )))
            }
        };

        self.wait_for_inclusion(&tx_hash).await?;
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::common::block_on;
    use std::cell::Cell;

    fn receipt(status: u8) -> TransactionReceipt {
        TransactionReceipt {
            to: None,
            status: Some(Nat::from(status)),
            transaction_hash: "0xabc".to_string(),
            block_number: Nat::from(1_u8),
            from: "0x0".to_string(),
            logs: Vec::new(),
            block_hash: "0x0".to_string(),
            tx_type: "0x2".to_string(),
            transaction_index: Nat::from(0_u8),
            effective_gas_price: Nat::from(0_u8),
            logs_bloom: "0x0".to_string(),
            contract_address: None,
            gas_used: Nat::from(0_u8),
        }
    }

    #[test]
    fn pending_receipt_times_out_after_the_polling_cap() {
        let polls = Cell::new(0_u8);
        let result = block_on(await_receipt("0xabc", || {
            polls.set(polls.get() + 1);
            async { Ok(None) }
        }));

        assert_eq!(
            result,
            Err(ManagerError::InclusionTimeout {
                tx_hash: "0xabc".to_string(),
            })
        );
        assert_eq!(polls.get(), MAX_INCLUSION_CHECKS);
    }

    #[test]
    fn late_receipt_stops_the_polling() {
        let polls = Cell::new(0_u8);
        let result = block_on(await_receipt("0xabc", || {
            let attempt = polls.get() + 1;
            polls.set(attempt);
            async move {
                if attempt < 3 {
                    Ok(None)
                } else {
                    Ok(Some(receipt(1)))
                }
            }
        }));

        assert_eq!(result, Ok(()));
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn reverted_receipt_is_surfaced_not_retried() {
        let polls = Cell::new(0_u8);
        let result = block_on(await_receipt("0xdef", || {
            polls.set(polls.get() + 1);
            async { Ok(Some(receipt(0))) }
        }));

        assert_eq!(polls.get(), 1);
        match result {
            Err(ManagerError::Custom(message)) => assert!(message.contains("0xdef")),
            other => panic!("expected a revert error, got {:?}", other),
        }
    }

    #[test]
    fn fetch_errors_propagate_immediately() {
        let result: ManagerResult<()> = block_on(await_receipt("0xabc", || async {
            Err(ManagerError::NonExistentValue)
        }));
        assert_eq!(result, Err(ManagerError::NonExistentValue));
    }
}
