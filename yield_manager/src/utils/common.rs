//! Common utility and helper functions that are used across the project

use std::str::FromStr;

use alloy_primitives::{Address, U256};
use candid::{Nat, Principal};
use evm_rpc_types::{MultiRpcResult, RpcConfig, RpcServices};
use ic_exports::ic_cdk::api::{call::CallResult, is_controller};

use super::error::{ManagerError, ManagerResult};
use super::evm_rpc::{BlockTag, GetTransactionCountArgs, Service};

use crate::constants::PROVIDER_COUNT;
use crate::providers::{extract_multi_rpc_result, get_ranked_rpc_providers};

/// Returns Err if the `caller` is not a controller of the canister
pub fn only_controller(caller: Principal) -> ManagerResult<()> {
    if !is_controller(&caller) {
        // only the controller should be able to call this function
        return Err(ManagerError::Unauthorized);
    }
    Ok(())
}

/// Converts String to Address and returns ManagerError on failure
pub fn string_to_address(input: String) -> ManagerResult<Address> {
    Address::from_str(&input).map_err(|err| ManagerError::DecodingError(format!("{:#?}", err)))
}

/// Converts values of type `Nat` to `U256`
pub fn nat_to_u256(n: &Nat) -> ManagerResult<U256> {
    let be_bytes = n.0.to_bytes_be();
    if be_bytes.len() > 32 {
        return Err(ManagerError::DecodingError("The `Nat` input length exceedes 32 bytes when converted to big-endian bytes representation.".to_string()));
    }
    // Ensure the byte array is exactly 32 bytes long
    let mut padded_bytes = [0u8; 32];
    let start_pos = 32 - be_bytes.len();
    padded_bytes[start_pos..].copy_from_slice(&be_bytes);

    Ok(U256::from_be_bytes(padded_bytes))
}

/// Current IC time in whole seconds. `ic_cdk::api::time` traps outside the
/// canister runtime, so unit tests get a fixed epoch instead.
pub fn time_secs() -> u64 {
    #[cfg(not(test))]
    {
        ic_exports::ic_cdk::api::time() / 1_000_000_000
    }
    #[cfg(test)]
    {
        0
    }
}

/// On success, returns the nonce associated with the given address
pub async fn get_nonce(rpc_canister: &Service, address: Address) -> ManagerResult<U256> {
    let account = address.to_string();
    let rpc: RpcServices = get_ranked_rpc_providers();
    let args = GetTransactionCountArgs {
        address: account,
        block: BlockTag::Latest,
    };

    let config = RpcConfig {
        response_size_estimate: Some(10_000),
        response_consensus: Some(evm_rpc_types::ConsensusStrategy::Threshold {
            total: Some(PROVIDER_COUNT as u8),
            min: 1,
        }),
    };

    let result = rpc_canister
        .eth_get_transaction_count(rpc, Some(config), args)
        .await;

    let wrapped_number = extract_call_result::<MultiRpcResult<Nat>>(result)?;
    let number = extract_multi_rpc_result(wrapped_number)?;
    nat_to_u256(&number)
}

/// Polls a future to completion on the current thread. The futures built
/// over stub clients resolve without yielding to an executor.
#[cfg(test)]
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn noop_raw_waker() -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    static VTABLE: RawWakerVTable =
        RawWakerVTable::new(|_| noop_raw_waker(), |_| {}, |_| {}, |_| {});

    let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
    let mut context = Context::from_waker(&waker);
    let mut future = Box::pin(future);
    loop {
        if let Poll::Ready(value) = future.as_mut().poll(&mut context) {
            return value;
        }
    }
}

/// Extracts the Ok or Err values of a canister call and returns them.
pub fn extract_call_result<T>(result: CallResult<(T,)>) -> ManagerResult<T> {
    result
        .map(|(success_value,)| success_value)
        .map_err(|(rejection_code, error_message)| {
            ManagerError::CallResult(rejection_code, error_message)
        })
}
