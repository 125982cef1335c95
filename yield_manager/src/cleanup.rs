//! Periodic maintenance: journal pruning and provider reputation resets.

use ic_exports::ic_cdk::api::management_canister::main::raw_rand;
use rand::seq::SliceRandom;
use rand_chacha::rand_core::SeedableRng;

use crate::constants::{JOURNAL_RETENTION, MANTA_PROVIDERS};
use crate::journal::{JournalCollection, LogType};
use crate::state::{JOURNAL, RPC_REPUTATIONS};
use crate::utils::common::extract_call_result;
use crate::utils::error::{ManagerError, ManagerResult};

/// Performs daily cleanup tasks including journal pruning and reputation resets.
pub async fn daily_cleanup() {
    let mut journal = JournalCollection::open(None);

    journal_cleanup();

    journal.append_note(
        Ok(()),
        LogType::Info,
        "Cleaned up the journal by removing excess logs and all reputation change entries.",
    );

    let reputations_cleanup_result = reputations_cleanup().await;
    match reputations_cleanup_result {
        Ok(()) => journal.append_note(
            Ok(()),
            LogType::Info,
            "Reset provider reputations back to zero and shuffled the list.",
        ),
        Err(err) => journal.append_note(
            Err(err),
            LogType::Info,
            "Failed to reset the provider reputations list.",
        ),
    };

    journal.append_note(Ok(()), LogType::Info, "Finished the cleanup successfully.");
    journal.close();
}

/// Resets and randomizes the RPC provider reputation rankings.
///
/// A fresh random ordering keeps the ranking from permanently favoring
/// whichever provider got lucky early on.
pub async fn reputations_cleanup() -> ManagerResult<()> {
    let mut providers = MANTA_PROVIDERS.to_vec();

    let call_result = raw_rand().await;
    let seed: Vec<u8> = extract_call_result(call_result)?;

    // Ensure the seed is exactly 32 bytes
    let seed_array: [u8; 32] = seed.try_into().map_err(|_| {
        ManagerError::DecodingError(
            "Couldn't convert the seed bytes into a fixed length slice.".to_string(),
        )
    })?;

    let mut rng = rand_chacha::ChaCha8Rng::from_seed(seed_array);
    providers.shuffle(&mut rng);

    let new_reputations = providers
        .into_iter()
        .map(|url| {
            (
                0,
                evm_rpc_types::RpcApi {
                    url: url.to_string(),
                    headers: None,
                },
            )
        })
        .collect();

    RPC_REPUTATIONS.with(|reputations| {
        *reputations.borrow_mut() = new_reputations;
    });

    Ok(())
}

/// Manages the cleanup of the system journal logs.
///
/// Drops provider reputation change collections, then trims the journal to
/// the most recent `JOURNAL_RETENTION` collections.
pub fn journal_cleanup() {
    JOURNAL.with(|journal| {
        let mut binding = journal.borrow_mut();

        // Initialize a new StableVec safely and return if initialization fails
        let temp = if let Ok(vec) =
            ic_stable_structures::Vec::init(ic_stable_structures::DefaultMemoryImpl::default())
        {
            vec
        } else {
            return;
        };

        for collection in binding.iter() {
            if !collection.is_reputation_change() {
                let _ = temp.push(&collection);
            }
        }

        *binding = temp;
    });

    JOURNAL.with(|journal| {
        let binding = journal.borrow_mut();

        let len = binding.len();
        if len > JOURNAL_RETENTION {
            let excess = len - JOURNAL_RETENTION;

            // Shift all items to remove the oldest ones
            for i in excess..len {
                if let Some(item) = binding.get(i) {
                    binding.set(i - excess, &item);
                }
            }

            // Pop the remaining items to resize the vector
            for _ in 0..excess {
                binding.pop();
            }
        }
    });
}
