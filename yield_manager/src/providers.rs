//! Reputation-based ranking of the RPC providers for the fixed chain.
//!
//! The EVM RPC canister has no named providers for Manta Pacific, so the
//! ranking works over custom `RpcApi` URLs instead of named services.

use evm_rpc_types::{MultiRpcResult, RpcApi, RpcService, RpcServices};

use crate::constants::{CHAIN_ID, PROVIDER_COUNT};
use crate::journal::{JournalCollection, LogType};
use crate::state::RPC_REPUTATIONS;
use crate::utils::error::{ManagerError, ManagerResult};

/// Getter function to retrieve the ranked list of providers from the thread's local storage
fn fetch_provider_list() -> Vec<(i64, RpcApi)> {
    RPC_REPUTATIONS.with(|leaderboard| leaderboard.borrow().clone())
}

/// Sorts the providers and returns the top ones.
pub fn ranked_provider_list() -> Vec<RpcApi> {
    let mut provider_list = fetch_provider_list();

    // Sort the providers by the first element in descending order
    provider_list.sort_by(|a, b| b.0.cmp(&a.0));

    let mut provider_list: Vec<RpcApi> = provider_list.into_iter().map(|(_, api)| api).collect();

    if provider_list.len() > PROVIDER_COUNT {
        provider_list.truncate(PROVIDER_COUNT);
    }

    provider_list
}

/// The ranked provider set in the form every EVM RPC canister method expects
pub fn get_ranked_rpc_providers() -> RpcServices {
    RpcServices::Custom {
        chain_id: CHAIN_ID,
        services: ranked_provider_list(),
    }
}

/// Increments the score of a specific provider by 1
pub fn increment_provider_score(provider: &RpcApi) {
    adjust_provider_score(provider, 1);
}

/// Decrements the score of a specific provider by 1
pub fn decrement_provider_score(provider: &RpcApi) {
    adjust_provider_score(provider, -1);
}

fn adjust_provider_score(provider: &RpcApi, delta: i64) {
    RPC_REPUTATIONS.with(|leaderboard| {
        let mut leaderboard = leaderboard.borrow_mut();

        if let Some(entry) = leaderboard.iter_mut().find(|(_, p)| p.url == provider.url) {
            entry.0 += delta;
        }
    });
}

/// Unwraps a `MultiRpcResult`, adjusting provider reputations when the
/// providers disagreed. The first successful response wins; all-error
/// disagreement surfaces as `NoConsensus`.
pub fn extract_multi_rpc_result<T>(result: MultiRpcResult<T>) -> ManagerResult<T> {
    match result {
        MultiRpcResult::Consistent(response) => response.map_err(ManagerError::RpcResponseError),
        MultiRpcResult::Inconsistent(responses) => {
            let mut journal = JournalCollection::open(None);
            let mut accepted: Option<T> = None;

            for (service, response) in responses {
                let api = match service {
                    RpcService::Custom(api) => api,
                    // named services are never part of our provider set
                    _ => continue,
                };

                match response {
                    Ok(value) => {
                        increment_provider_score(&api);
                        journal.append_note(
                            Ok(()),
                            LogType::ProviderReputationChange,
                            format!("Incremented the score of {}", api.url),
                        );
                        if accepted.is_none() {
                            accepted = Some(value);
                        }
                    }
                    Err(err) => {
                        decrement_provider_score(&api);
                        journal.append_note(
                            Err(ManagerError::RpcResponseError(err)),
                            LogType::ProviderReputationChange,
                            format!("Decremented the score of {}", api.url),
                        );
                    }
                }
            }

            journal.close();

            accepted.ok_or_else(|| {
                ManagerError::NoConsensus(
                    "the providers disagreed and none returned a usable response".to_string(),
                )
            })
        }
    }
}
