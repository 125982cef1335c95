//! EIP-1559 fee estimation from recent fee history

use candid::Nat;
use evm_rpc_types::RpcServices;

use crate::providers::extract_multi_rpc_result;

use super::common::extract_call_result;
use super::error::{ManagerError, ManagerResult};
use super::evm_rpc::{BlockTag, FeeHistory, FeeHistoryArgs, Service};

/// The minimum suggested maximum priority fee per gas.
const MIN_SUGGEST_MAX_PRIORITY_FEE_PER_GAS: u64 = 1_500_000_000;

pub struct FeeEstimates {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

pub async fn fee_history(
    block_count: Nat,
    reward_percentiles: Option<Vec<u8>>,
    rpc_services: RpcServices,
    evm_rpc: &Service,
) -> ManagerResult<FeeHistory> {
    let fee_history_args = FeeHistoryArgs {
        block_count,
        newest_block: BlockTag::Latest,
        reward_percentiles,
    };

    let cycles = 25_000_000_000;

    let call_result = evm_rpc
        .eth_fee_history(rpc_services, None, fee_history_args, cycles)
        .await;

    let canister_response = extract_call_result(call_result)?;

    extract_multi_rpc_result(canister_response)
}

fn median_index(length: usize) -> usize {
    if length == 0 {
        panic!("Cannot find a median index for an array of length zero.");
    }
    (length - 1) / 2
}

/// Estimates the fee caps for the next transaction. Read fresh before every
/// submission rather than cached across steps.
pub async fn estimate_transaction_fees(
    block_count: u8,
    rpc_services: RpcServices,
    evm_rpc: &Service,
) -> ManagerResult<FeeEstimates> {
    let fee_history = fee_history(
        Nat::from(block_count),
        Some(vec![95]),
        rpc_services,
        evm_rpc,
    )
    .await?;

    let median_index = median_index(block_count.into());

    // Convert baseFeePerGas to u128
    let base_fee_per_gas = fee_history
        .base_fee_per_gas
        .last()
        .ok_or(ManagerError::NonExistentValue)?;
    let base_fee_per_gas_u128 = u128::try_from(base_fee_per_gas.0.clone())
        .map_err(|err| ManagerError::DecodingError(format!("{:#?}", err)))?;

    // obtain the 95th percentile of the tips for the past blocks
    let mut percentiles: Vec<Nat> = fee_history
        .reward
        .into_iter()
        .flat_map(|rewards| rewards.into_iter())
        .collect();

    // sort and retrieve the median reward
    percentiles.sort_unstable();
    let zero_nat = Nat::from(0_u32);
    let median_reward = percentiles.get(median_index).unwrap_or(&zero_nat);
    let median_reward_u128 = u128::try_from(median_reward.0.clone())
        .map_err(|err| ManagerError::DecodingError(format!("{:#?}", err)))?;

    let max_fee_per_gas = median_reward_u128
        .saturating_add(base_fee_per_gas_u128)
        .max(MIN_SUGGEST_MAX_PRIORITY_FEE_PER_GAS as u128);

    Ok(FeeEstimates {
        max_fee_per_gas,
        max_priority_fee_per_gas: median_reward_u128,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_index_is_lower_middle() {
        assert_eq!(median_index(1), 0);
        assert_eq!(median_index(9), 4);
        assert_eq!(median_index(10), 4);
    }
}
