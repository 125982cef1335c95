//! Transaction builder (and sender) that interacts with the EVM RPC canister

use alloy::consensus::TxEip1559;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use evm_rpc_types::RpcServices;

use crate::{
    constants::{CHAIN_ID, GAS_LIMIT, SEND_TX_CYCLES},
    providers::{extract_multi_rpc_result, get_ranked_rpc_providers},
    types::DerivationPath,
};

use super::{
    common::extract_call_result,
    error::ManagerResult,
    evm_rpc::{SendRawTransactionStatus, Service},
    gas::{estimate_transaction_fees, FeeEstimates},
    signer::sign_eip1559_transaction,
};

/// Transaction builder struct
#[derive(Default)]
pub struct TransactionBuilder {
    to: Address,
    data: Vec<u8>,
    value: U256,
    nonce: u64,
    derivation_path: DerivationPath,
}

impl TransactionBuilder {
    /// Sets the `to` field
    pub fn to(mut self, to: Address) -> Self {
        self.to = to;
        self
    }

    /// Sets the `data` field
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Sets the `value` field
    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Sets the `nonce` field
    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Sets the `derivation_path` field
    pub fn derivation_path(mut self, derivation_path: DerivationPath) -> Self {
        self.derivation_path = derivation_path;
        self
    }

    /// Builds the TransactionBuilder into a Transaction and sends it.
    /// Fee caps are estimated fresh on every call.
    pub async fn send(self, rpc_canister: &Service) -> ManagerResult<SendRawTransactionStatus> {
        let input = Bytes::from(self.data.clone());
        let rpc: RpcServices = get_ranked_rpc_providers();
        let FeeEstimates {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } = estimate_transaction_fees(9, rpc.clone(), rpc_canister).await?;

        let request = TxEip1559 {
            chain_id: CHAIN_ID,
            to: TxKind::Call(self.to),
            max_fee_per_gas,
            max_priority_fee_per_gas,
            value: self.value,
            nonce: self.nonce,
            gas_limit: GAS_LIMIT,
            access_list: Default::default(),
            input,
        };

        let signed_transaction = sign_eip1559_transaction(request, self.derivation_path).await?;

        let call_result = rpc_canister
            .eth_send_raw_transaction(rpc, None, signed_transaction, SEND_TX_CYCLES)
            .await;
        let response = extract_call_result(call_result)?;
        extract_multi_rpc_result(response)
    }
}
