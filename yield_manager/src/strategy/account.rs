//! Per-user account records kept in the custody store.
//!
//! An account splits into immutable settings (who the user is, how their
//! transactions are signed) and mutable data (cycle bookkeeping), plus the
//! lock guarding concurrent execution.

use alloy_primitives::Address;
use candid::CandidType;
use serde::Deserialize;

use crate::state::ACCOUNTS;
use crate::types::{DerivationPath, RiskTier};
use crate::utils::error::{ManagerError, ManagerResult};

use super::lock::StableLock;

/// Immutable account settings, set at registration
#[derive(Clone, Default)]
pub struct AccountSettings {
    /// The user's own EVM address, used as the custody key
    pub user_address: Address,
    /// Derivation path of the account's threshold ECDSA key
    pub derivation_path: DerivationPath,
    /// EVM address of the managed wallet, once its public key is known
    pub eoa: Option<Address>,
    /// Risk appetite driving protocol eligibility
    pub risk_tier: RiskTier,
}

impl AccountSettings {
    /// Builder-style setter functions for the struct

    pub fn user_address(&mut self, user_address: Address) -> &mut Self {
        self.user_address = user_address;
        self
    }

    pub fn derivation_path(&mut self, derivation_path: DerivationPath) -> &mut Self {
        self.derivation_path = derivation_path;
        self
    }

    pub fn eoa(&mut self, eoa: Option<Address>) -> &mut Self {
        self.eoa = eoa;
        self
    }

    pub fn risk_tier(&mut self, risk_tier: RiskTier) -> &mut Self {
        self.risk_tier = risk_tier;
        self
    }
}

/// Mutable account bookkeeping
#[derive(Clone, Default)]
pub struct AccountData {
    /// Timestamp of the last cycle that considered this account
    pub last_cycle: u64,
    /// Timestamp of the last cycle that finished without an error
    pub last_ok_cycle: u64,
}

/// Account representation held in the custody store
#[derive(Clone, Default)]
pub struct StableAccount {
    /// Immutable settings and configurations
    pub settings: AccountSettings,
    /// Mutable state
    pub data: AccountData,
    /// Lock for the account. Determines if a sequence is currently running.
    pub lock: StableLock,
}

impl StableAccount {
    /// Builder-style setter functions for the struct

    /// Set the account settings
    pub fn settings(&mut self, settings: AccountSettings) -> &mut Self {
        self.settings = settings;
        self
    }

    /// Set the account data
    pub fn data(&mut self, data: AccountData) -> &mut Self {
        self.data = data;
        self
    }

    /// Mint the account by adding it to the state.
    /// "Minting" here means registering the account in a persistent state.
    pub fn mint(&self) -> ManagerResult<()> {
        ACCOUNTS.with(|accounts| {
            let mut binding = accounts.borrow_mut();
            // Ensure that we do not overwrite an existing account with the same key
            if binding.get(&self.settings.user_address).is_some() {
                return Err(ManagerError::Custom(
                    "This user address is already registered.".to_string(),
                ));
            }
            binding.insert(self.settings.user_address, self.clone());
            Ok(())
        })
    }
}

/// Candid view of an account, returned by the `get_accounts` query
#[derive(CandidType, Deserialize)]
pub struct AccountQuery {
    pub user_address: String,
    pub eoa: Option<String>,
    pub risk_tier: RiskTier,
    pub last_cycle: u64,
    pub last_ok_cycle: u64,
    pub locked: bool,
}

impl From<&StableAccount> for AccountQuery {
    fn from(value: &StableAccount) -> Self {
        Self {
            user_address: value.settings.user_address.to_string(),
            eoa: value.settings.eoa.map(|address| address.to_string()),
            risk_tier: value.settings.risk_tier,
            last_cycle: value.data.last_cycle,
            last_ok_cycle: value.data.last_ok_cycle,
            locked: value.lock.is_locked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn sample_account() -> StableAccount {
        let mut settings = AccountSettings::default();
        settings
            .user_address(address!("0123456789abcdef0123456789abcdef01234567"))
            .derivation_path(vec![vec![1, 2, 3]])
            .risk_tier(RiskTier::Medium);

        let mut account = StableAccount::default();
        account.settings(settings);
        account
    }

    #[test]
    fn mint_rejects_duplicates() {
        ACCOUNTS.with(|accounts| accounts.borrow_mut().clear());

        let account = sample_account();
        assert!(account.mint().is_ok());
        assert!(account.mint().is_err());

        ACCOUNTS.with(|accounts| {
            assert_eq!(accounts.borrow().len(), 1);
        });
    }

    #[test]
    fn query_view_reflects_settings() {
        let mut account = sample_account();
        account.settings.eoa = Some(address!("7E5F4552091A69125d5DfCb7b8C2659029395Bdf"));

        let view = AccountQuery::from(&account);
        assert_eq!(view.risk_tier, RiskTier::Medium);
        assert!(view.eoa.unwrap().starts_with("0x7E5F"));
        assert!(!view.locked);
    }
}
