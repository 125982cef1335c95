//! Canister definition and its candid surface

use std::str::FromStr;

use candid::Nat;
use ic_canister::{generate_idl, init, query, update, Canister, Idl, PreUpdate};
use ic_exports::candid::Principal;
use ic_exports::ic_cdk::api::management_canister::http_request::{HttpResponse, TransformArgs};
use ic_exports::ic_kit::ic::caller;

use crate::journal::JournalCollection;
use crate::oracle;
use crate::registry::{Asset, Protocol};
use crate::state::{self, ACCOUNTS, JOURNAL, ORACLE_ENDPOINT, RPC_CANISTER};
use crate::strategy::account::AccountQuery;
use crate::strategy::run::run_cycle;
use crate::timers::start_timers;
use crate::types::{InitArgs, MigrationRecord, RiskTier, UserPosition};
use crate::utils::common::{only_controller, string_to_address};
use crate::utils::error::{ManagerError, ManagerResult};
use crate::utils::evm_rpc::Service;
use crate::wallet;

#[derive(Canister)]
pub struct YieldManager {
    #[id]
    id: Principal,
}

impl PreUpdate for YieldManager {}

impl YieldManager {
    /// Stores the RPC handle and the initial custody records, then arms the
    /// timers. Public keys for init-time users are assigned by a zero-delay
    /// timer since init cannot await inter-canister calls.
    #[init]
    pub fn init(&mut self, args: InitArgs) {
        RPC_CANISTER.with(|rpc_canister| *rpc_canister.borrow_mut() = Service(args.rpc_principal));

        if let Some(endpoint) = args.oracle_endpoint {
            ORACLE_ENDPOINT.with(|url| *url.borrow_mut() = endpoint);
        }

        wallet::seed_accounts(args.users);

        start_timers();
    }

    /// Creates and funds a managed wallet for a user
    #[update]
    pub async fn register_user(
        &mut self,
        user_address: String,
        risk_tier: RiskTier,
    ) -> ManagerResult<String> {
        only_controller(caller())?;
        let user = string_to_address(user_address)?;

        let mut journal = JournalCollection::open(Some(user.to_string()));
        let created = wallet::create_wallet(user, risk_tier, &mut journal).await;

        let result = match created {
            Ok(eoa) => {
                // funding failures are journaled but do not undo registration
                if let Err(err) = wallet::fund_wallet(eoa, &mut journal).await {
                    journal.append_note(
                        Err(err),
                        crate::journal::LogType::Custody,
                        "Funding the fresh wallet failed. It can be funded manually.",
                    );
                }
                Ok(eoa.to_string())
            }
            Err(err) => Err(err),
        };

        journal.close();
        result
    }

    /// Changes a user's risk tier
    #[update]
    pub fn set_risk_tier(&mut self, user_address: String, risk_tier: RiskTier) -> ManagerResult<()> {
        only_controller(caller())?;
        let user = string_to_address(user_address)?;
        state::with_account_mut(&user, |account| {
            account.settings.risk_tier = risk_tier;
        })
    }

    /// Receives a position snapshot from the external position tracker
    #[update]
    pub fn report_position(
        &mut self,
        user_address: String,
        protocol_id: String,
        amount: Nat,
    ) -> ManagerResult<()> {
        only_controller(caller())?;
        let user = string_to_address(user_address)?;
        let protocol = Protocol::from_str(&protocol_id)?;
        let staked_amount = u64::try_from(amount.0).map_err(|err| {
            ManagerError::DecodingError(format!("the amount does not fit in 64 bits: {:#?}", err))
        })?;

        // the user must be under custody before positions are accepted
        state::account(&user)?;

        state::set_position(UserPosition {
            user_address: user,
            protocol,
            staked_amount,
        });
        Ok(())
    }

    /// Runs one rebalance cycle immediately instead of waiting for the timer
    #[update]
    pub async fn run_cycle_now(&mut self) -> ManagerResult<()> {
        only_controller(caller())?;
        run_cycle().await;
        Ok(())
    }

    /// Mints testnet mock tokens into a user's managed wallet
    #[update]
    pub async fn mint_test_tokens(
        &mut self,
        user_address: String,
        asset_id: String,
        amount: Nat,
    ) -> ManagerResult<String> {
        only_controller(caller())?;
        let user = string_to_address(user_address)?;
        let asset = Asset::from_str(&asset_id)?;
        let amount = u64::try_from(amount.0).map_err(|err| {
            ManagerError::DecodingError(format!("the amount does not fit in 64 bits: {:#?}", err))
        })?;
        wallet::mint(user, asset, amount).await
    }

    /// Transfers tokens out of a user's managed wallet
    #[update]
    pub async fn transfer_tokens(
        &mut self,
        user_address: String,
        asset_id: String,
        to: String,
        amount: Nat,
    ) -> ManagerResult<String> {
        only_controller(caller())?;
        let user = string_to_address(user_address)?;
        let asset = Asset::from_str(&asset_id)?;
        let to = string_to_address(to)?;
        let amount = u64::try_from(amount.0).map_err(|err| {
            ManagerError::DecodingError(format!("the amount does not fit in 64 bits: {:#?}", err))
        })?;
        wallet::transfer(user, asset, to, amount).await
    }

    /// Drops a failed migration record once the operator has re-synced the
    /// position source
    #[update]
    pub fn clear_stalled_migration(&mut self, user_address: String) -> ManagerResult<()> {
        only_controller(caller())?;
        let user = string_to_address(user_address)?;
        state::close_migration(&user)
            .map(|_| ())
            .ok_or(ManagerError::NonExistentValue)
    }

    /// Derivation path that signs for a user's wallet
    #[query]
    pub fn get_signing_path(&self, user_address: String) -> ManagerResult<Vec<Vec<u8>>> {
        only_controller(caller())?;
        let user = string_to_address(user_address)?;
        wallet::signing_path(&user)
    }

    /// All custody records
    #[query]
    pub fn get_accounts(&self) -> Vec<AccountQuery> {
        ACCOUNTS.with(|accounts| accounts.borrow().values().map(AccountQuery::from).collect())
    }

    /// Migration attempts that stopped partway and await the operator
    #[query]
    pub fn get_stalled_migrations(&self) -> Vec<MigrationRecord> {
        state::stalled_migrations()
    }

    /// The most recent journal collections, newest last
    #[query]
    pub fn get_journal(&self, depth: Option<u64>) -> Vec<JournalCollection> {
        JOURNAL.with(|journal| {
            let binding = journal.borrow();
            let len = binding.len();
            let start = match depth {
                Some(depth) if depth < len => len - depth,
                _ => 0,
            };
            (start..len).filter_map(|index| binding.get(index)).collect()
        })
    }

    /// Strips response headers so the oracle outcall reaches consensus
    #[query]
    pub fn transform_oracle(&self, args: TransformArgs) -> HttpResponse {
        oracle::transform_oracle_response(args)
    }

    pub fn idl() -> Idl {
        generate_idl!()
    }
}
