//! Hand-rolled candid binding to the EVM RPC canister, limited to the
//! methods this canister actually calls.

use candid::{self, CandidType, Deserialize, Nat, Principal};
use evm_rpc_types::{MultiRpcResult, RpcConfig, RpcServices};
use ic_exports::ic_cdk::{self, api::call::CallResult as Result};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, CandidType, Deserialize)]
pub struct GetTransactionCountArgs {
    pub address: String,
    pub block: BlockTag,
}

#[derive(Clone, Debug, PartialEq, Eq, CandidType, Deserialize, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Finalized,
    Safe,
    Earliest,
    Pending,
    Number(Nat),
}

#[derive(Clone, Debug, PartialEq, Eq, CandidType, Deserialize)]
pub struct FeeHistoryArgs {
    /// Number of blocks in the requested range.
    /// Typically, providers request this to be between 1 and 1024.
    #[serde(rename = "blockCount")]
    pub block_count: Nat,

    /// Highest block of the requested range.
    #[serde(rename = "newestBlock")]
    pub newest_block: BlockTag,

    /// A monotonically increasing list of percentile values between 0 and 100.
    /// For each block in the requested range, the transactions will be sorted in ascending order
    /// by effective tip per gas and the corresponding effective tip for the percentile
    /// will be determined, accounting for gas consumed.
    #[serde(rename = "rewardPercentiles")]
    pub reward_percentiles: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, CandidType)]
pub struct FeeHistory {
    /// Lowest number block of the returned range.
    #[serde(rename = "oldestBlock")]
    pub oldest_block: Nat,

    /// An array of block base fees per gas.
    /// This includes the next block after the newest of the returned range,
    /// because this value can be derived from the newest block.
    /// Zeroes are returned for pre-EIP-1559 blocks.
    #[serde(rename = "baseFeePerGas")]
    pub base_fee_per_gas: Vec<Nat>,

    /// An array of block gas used ratios (gasUsed / gasLimit).
    #[serde(rename = "gasUsedRatio")]
    pub gas_used_ratio: Vec<f64>,

    /// A two-dimensional array of effective priority fees per gas at the requested block percentiles.
    #[serde(rename = "reward")]
    pub reward: Vec<Vec<Nat>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, CandidType)]
pub enum SendRawTransactionStatus {
    Ok(Option<String>),
    InsufficientFunds,
    NonceTooLow,
    NonceTooHigh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, CandidType)]
pub struct LogEntry {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Option<String>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<Nat>,
    pub data: String,
    #[serde(rename = "blockHash")]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionIndex")]
    pub transaction_index: Option<Nat>,
    pub topics: Vec<String>,
    pub address: String,
    #[serde(rename = "logIndex")]
    pub log_index: Option<Nat>,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, CandidType)]
pub struct TransactionReceipt {
    pub to: Option<String>,
    /// `1` for success, `0` for revert
    pub status: Option<Nat>,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: Nat,
    pub from: String,
    pub logs: Vec<LogEntry>,
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(rename = "transactionIndex")]
    pub transaction_index: Nat,
    #[serde(rename = "effectiveGasPrice")]
    pub effective_gas_price: Nat,
    #[serde(rename = "logsBloom")]
    pub logs_bloom: String,
    #[serde(rename = "contractAddress")]
    pub contract_address: Option<String>,
    #[serde(rename = "gasUsed")]
    pub gas_used: Nat,
}

#[derive(Copy, Clone, Debug)]
pub struct Service(pub Principal);

impl Default for Service {
    fn default() -> Self {
        Self(Principal::anonymous())
    }
}

impl Service {
    pub async fn eth_fee_history(
        &self,
        arg0: RpcServices,
        arg1: Option<RpcConfig>,
        arg2: FeeHistoryArgs,
        cycles: u128,
    ) -> Result<(MultiRpcResult<FeeHistory>,)> {
        ic_cdk::api::call::call_with_payment128(
            self.0,
            "eth_feeHistory",
            (arg0, arg1, arg2),
            cycles,
        )
        .await
    }

    pub async fn eth_get_transaction_count(
        &self,
        arg0: RpcServices,
        arg1: Option<RpcConfig>,
        arg2: GetTransactionCountArgs,
    ) -> Result<(MultiRpcResult<Nat>,)> {
        ic_cdk::call(self.0, "eth_getTransactionCount", (arg0, arg1, arg2)).await
    }

    pub async fn eth_send_raw_transaction(
        &self,
        arg0: RpcServices,
        arg1: Option<RpcConfig>,
        arg2: String,
        cycles: u128,
    ) -> Result<(MultiRpcResult<SendRawTransactionStatus>,)> {
        ic_cdk::api::call::call_with_payment128(
            self.0,
            "eth_sendRawTransaction",
            (arg0, arg1, arg2),
            cycles,
        )
        .await
    }

    pub async fn eth_get_transaction_receipt(
        &self,
        arg0: RpcServices,
        arg1: Option<RpcConfig>,
        arg2: String,
        cycles: u128,
    ) -> Result<(MultiRpcResult<Option<TransactionReceipt>>,)> {
        ic_cdk::api::call::call_with_payment128(
            self.0,
            "eth_getTransactionReceipt",
            (arg0, arg1, arg2),
            cycles,
        )
        .await
    }
}
