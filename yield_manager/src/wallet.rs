//! Per-user wallet custody.
//!
//! The canister never holds private keys. Each user address maps to a
//! deterministic threshold ECDSA derivation path; the wallet's EVM address
//! falls out of the derived public key. The canister's own admin wallet
//! (the empty derivation path) funds new wallets with gas money.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;

use crate::constants::eoa_funding_value;
use crate::journal::{JournalCollection, LogType};
use crate::registry::Asset;
use crate::state::{self, ACCOUNTS, REGISTRY, RPC_CANISTER};
use crate::strategy::account::{AccountSettings, StableAccount};
use crate::strategy::executable::scaled_amount;
use crate::types::{mintCall, transferCall, DerivationPath, RiskTier, UserInput};
use crate::utils::chain::{ChainClient, EvmRpcClient};
use crate::utils::common::string_to_address;
use crate::utils::error::{ManagerError, ManagerResult};
use crate::utils::signer;

/// The derivation path that signs for one user's wallet
pub fn derivation_path_for(user: &Address) -> DerivationPath {
    vec![user.to_vec()]
}

/// Derivation path of the wallet a user's transactions are signed with
pub fn signing_path(user: &Address) -> ManagerResult<DerivationPath> {
    state::account(user).map(|account| account.settings.derivation_path)
}

/// Every user address currently under custody
pub fn list_user_addresses() -> Vec<Address> {
    ACCOUNTS.with(|accounts| accounts.borrow().keys().copied().collect())
}

/// Creates custody records for install-time users. Addresses that do not
/// parse are journaled so the operator can see the rejection; their public
/// keys are assigned later by the zero-delay timer.
pub fn seed_accounts(users: Vec<UserInput>) {
    for user in users {
        match string_to_address(user.user_address.clone()) {
            Ok(user_address) => {
                let mut settings = AccountSettings::default();
                settings
                    .user_address(user_address)
                    .derivation_path(derivation_path_for(&user_address))
                    .risk_tier(user.risk_tier);

                let mut account = StableAccount::default();
                account.settings(settings);
                let _ = account.mint();
            }
            Err(err) => {
                let mut journal = JournalCollection::open(None);
                journal.append_note(
                    Err(err),
                    LogType::Custody,
                    format!(
                        "Rejected the install-time user {:?}. The address does not parse.",
                        user.user_address
                    ),
                );
                journal.close();
            }
        }
    }
}

/// Creates the custody record for a user, deriving the wallet address from
/// the threshold key. Idempotent: an existing record is returned as-is.
pub async fn create_wallet(
    user: Address,
    risk_tier: RiskTier,
    journal: &mut JournalCollection,
) -> ManagerResult<Address> {
    if let Ok(existing) = state::account(&user) {
        journal.append_note(
            Ok(()),
            LogType::Custody,
            "A wallet already exists for this user.",
        );
        return existing.settings.eoa.ok_or(ManagerError::NonExistentValue);
    }

    let derivation_path = derivation_path_for(&user);
    let public_key = signer::public_key_for(derivation_path.clone()).await?;
    let eoa = signer::pubkey_to_address(&public_key)?;

    let mut settings = AccountSettings::default();
    settings
        .user_address(user)
        .derivation_path(derivation_path)
        .eoa(Some(eoa))
        .risk_tier(risk_tier);

    let mut account = StableAccount::default();
    account.settings(settings);
    account.mint()?;

    journal.append_note(
        Ok(()),
        LogType::Custody,
        format!("Created a wallet at {} for this user.", eoa),
    );

    Ok(eoa)
}

/// Sends the fixed gas-money transfer from the admin wallet to a fresh EOA
pub async fn fund_wallet(eoa: Address, journal: &mut JournalCollection) -> ManagerResult<String> {
    let rpc = RPC_CANISTER.with(|service| *service.borrow());

    let admin_path: DerivationPath = vec![];
    let admin_key = signer::public_key_for(admin_path.clone()).await?;
    let admin = signer::pubkey_to_address(&admin_key)?;

    let chain = EvmRpcClient::new(rpc, admin, admin_path);
    let nonce = chain.fresh_nonce().await?;
    let tx_hash = chain
        .submit_and_confirm(eoa, Vec::new(), eoa_funding_value(), nonce)
        .await?;

    journal.append_note(
        Ok(()),
        LogType::Custody,
        format!("Funded the wallet with gas money: {}", tx_hash),
    );

    Ok(tx_hash)
}

/// Mints testnet mock tokens into a user's wallet
pub async fn mint(user: Address, asset: Asset, amount: u64) -> ManagerResult<String> {
    let (chain, eoa) = client_for(&user)?;
    let token = REGISTRY.with(|registry| registry.borrow().resolve_asset(asset))?;

    let calldata = mintCall {
        to: eoa,
        amount: scaled_amount(amount),
    }
    .abi_encode();

    let nonce = chain.fresh_nonce().await?;
    chain
        .submit_and_confirm(token, calldata, U256::ZERO, nonce)
        .await
}

/// Transfers tokens out of a user's wallet
pub async fn transfer(
    user: Address,
    asset: Asset,
    to: Address,
    amount: u64,
) -> ManagerResult<String> {
    let (chain, _) = client_for(&user)?;
    let token = REGISTRY.with(|registry| registry.borrow().resolve_asset(asset))?;

    let calldata = transferCall {
        to,
        amount: scaled_amount(amount),
    }
    .abi_encode();

    let nonce = chain.fresh_nonce().await?;
    chain
        .submit_and_confirm(token, calldata, U256::ZERO, nonce)
        .await
}

/// Walks the custody store and derives public keys for any account that is
/// still missing one. Runs once from a zero-delay timer after install.
pub async fn assign_public_keys() {
    let mut journal = JournalCollection::open(None);

    for account in state::list_accounts() {
        if account.settings.eoa.is_some() {
            continue;
        }
        let user = account.settings.user_address;

        let assigned = match signer::public_key_for(account.settings.derivation_path.clone()).await
        {
            Ok(public_key) => signer::pubkey_to_address(&public_key),
            Err(err) => Err(err),
        };

        match assigned {
            Ok(eoa) => {
                let _ = state::with_account_mut(&user, |account| {
                    account.settings.eoa = Some(eoa);
                });
                journal.append_note(
                    Ok(()),
                    LogType::Custody,
                    format!("Assigned wallet {} to user {}.", eoa, user),
                );
            }
            Err(err) => {
                journal.append_note(
                    Err(err),
                    LogType::Custody,
                    format!("Could not derive a wallet address for user {}.", user),
                );
            }
        }
    }

    journal.close();
}

fn client_for(user: &Address) -> ManagerResult<(EvmRpcClient, Address)> {
    let account = state::account(user)?;
    let eoa = account.settings.eoa.ok_or(ManagerError::NonExistentValue)?;
    let rpc = RPC_CANISTER.with(|service| *service.borrow());
    Ok((
        EvmRpcClient::new(rpc, eoa, account.settings.derivation_path),
        eoa,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn derivation_path_is_deterministic_and_distinct() {
        let a = address!("0123456789abcdef0123456789abcdef01234567");
        let b = address!("89abcdef0123456789abcdef0123456789abcdef");

        assert_eq!(derivation_path_for(&a), derivation_path_for(&a));
        assert_ne!(derivation_path_for(&a), derivation_path_for(&b));
        assert_eq!(derivation_path_for(&a), vec![a.to_vec()]);
    }

    #[test]
    fn signing_path_requires_a_known_user() {
        ACCOUNTS.with(|accounts| accounts.borrow_mut().clear());
        let user = address!("0123456789abcdef0123456789abcdef01234567");
        assert_eq!(signing_path(&user), Err(ManagerError::NonExistentValue));

        let mut settings = AccountSettings::default();
        settings
            .user_address(user)
            .derivation_path(derivation_path_for(&user));
        let mut account = StableAccount::default();
        account.settings(settings);
        account.mint().unwrap();

        assert_eq!(signing_path(&user), Ok(vec![user.to_vec()]));
        assert_eq!(list_user_addresses(), vec![user]);
    }

    #[test]
    fn seeding_journals_the_rejected_addresses() {
        ACCOUNTS.with(|accounts| accounts.borrow_mut().clear());

        seed_accounts(vec![
            UserInput {
                user_address: "0x0123456789abcdef0123456789abcdef01234567".to_string(),
                risk_tier: RiskTier::High,
            },
            UserInput {
                user_address: "not-an-address".to_string(),
                risk_tier: RiskTier::Low,
            },
        ]);

        let seeded = list_user_addresses();
        assert_eq!(
            seeded,
            vec![address!("0123456789abcdef0123456789abcdef01234567")]
        );

        let rejected = crate::state::JOURNAL.with(|journal| {
            let binding = journal.borrow();
            (0..binding.len())
                .filter_map(|index| binding.get(index))
                .any(|collection| {
                    collection.entries.iter().any(|entry| {
                        entry.entry.is_err()
                            && entry
                                .note
                                .as_deref()
                                .is_some_and(|note| note.contains("not-an-address"))
                    })
                })
        });
        assert!(rejected);
    }
}
