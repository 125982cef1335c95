//! Thread-local canister state

use std::cell::RefCell;
use std::collections::HashMap;

use alloy_primitives::Address;
use evm_rpc_types::RpcApi;
use ic_stable_structures::DefaultMemoryImpl;

use crate::constants::{DEFAULT_ORACLE_ENDPOINT, MANTA_PROVIDERS};
use crate::journal::JournalCollection;
use crate::registry::Registry;
use crate::strategy::account::StableAccount;
use crate::types::{CompletedStep, MigrationOutcome, MigrationRecord, StepKind, UserPosition};
use crate::utils::error::{ManagerError, ManagerResult};
use crate::utils::evm_rpc::Service;

thread_local! {
    /// EVM RPC canister handle
    pub static RPC_CANISTER: RefCell<Service> = RefCell::new(Service::default());
    /// Ranked RPC providers for the fixed chain, paired with their scores
    pub static RPC_REPUTATIONS: RefCell<Vec<(i64, RpcApi)>> = RefCell::new(default_reputations());
    /// Yield backend URL
    pub static ORACLE_ENDPOINT: RefCell<String> = RefCell::new(DEFAULT_ORACLE_ENDPOINT.to_string());
    /// Immutable address table, built at init
    pub static REGISTRY: RefCell<Registry> = RefCell::new(Registry::manta_pacific());
    /// Custody store: one account per managed user address
    pub static ACCOUNTS: RefCell<HashMap<Address, StableAccount>> = RefCell::new(HashMap::new());
    /// Latest reported staked positions, keyed by user address
    pub static POSITIONS: RefCell<HashMap<Address, UserPosition>> = RefCell::new(HashMap::new());
    /// Migration records that have been opened and not yet closed
    pub static ACTIVE_MIGRATIONS: RefCell<HashMap<Address, MigrationRecord>> = RefCell::new(HashMap::new());
    /// Operation journal, persisted across upgrades
    pub static JOURNAL: RefCell<ic_stable_structures::Vec<JournalCollection, DefaultMemoryImpl>> =
        RefCell::new(
            ic_stable_structures::Vec::init(DefaultMemoryImpl::default())
                .expect("stable journal memory init"),
        );
}

fn default_reputations() -> Vec<(i64, RpcApi)> {
    MANTA_PROVIDERS
        .iter()
        .map(|url| {
            (
                0,
                RpcApi {
                    url: url.to_string(),
                    headers: None,
                },
            )
        })
        .collect()
}

/// Pushes a closed collection onto the stable journal vector
pub fn insert_journal_collection(collection: &JournalCollection) {
    JOURNAL.with(|journal| {
        let _ = journal.borrow_mut().push(collection);
    });
}

pub fn account(user: &Address) -> ManagerResult<StableAccount> {
    ACCOUNTS.with(|accounts| {
        accounts
            .borrow()
            .get(user)
            .cloned()
            .ok_or(ManagerError::NonExistentValue)
    })
}

pub fn with_account_mut<F>(user: &Address, f: F) -> ManagerResult<()>
where
    F: FnOnce(&mut StableAccount),
{
    ACCOUNTS.with(|accounts| {
        let mut accounts = accounts.borrow_mut();
        let account = accounts.get_mut(user).ok_or(ManagerError::NonExistentValue)?;
        f(account);
        Ok(())
    })
}

pub fn list_accounts() -> Vec<StableAccount> {
    ACCOUNTS.with(|accounts| accounts.borrow().values().cloned().collect())
}

pub fn position(user: &Address) -> Option<UserPosition> {
    POSITIONS.with(|positions| positions.borrow().get(user).cloned())
}

pub fn set_position(position: UserPosition) {
    POSITIONS.with(|positions| {
        positions
            .borrow_mut()
            .insert(position.user_address, position);
    });
}

pub fn active_migration(user: &Address) -> Option<MigrationRecord> {
    ACTIVE_MIGRATIONS.with(|records| records.borrow().get(user).cloned())
}

pub fn open_migration(user: Address, record: MigrationRecord) {
    ACTIVE_MIGRATIONS.with(|records| {
        records.borrow_mut().insert(user, record);
    });
}

/// Appends a confirmed step to the user's in-flight record
pub fn record_migration_step(user: &Address, kind: StepKind, tx_hash: &str) {
    ACTIVE_MIGRATIONS.with(|records| {
        if let Some(record) = records.borrow_mut().get_mut(user) {
            record.completed.push(CompletedStep {
                kind,
                tx_hash: tx_hash.to_string(),
            });
        }
    });
}

/// Marks the user's in-flight record as failed. The record stays in state
/// until the operator clears it.
pub fn fail_migration(user: &Address, step: StepKind, reason: String) {
    ACTIVE_MIGRATIONS.with(|records| {
        if let Some(record) = records.borrow_mut().get_mut(user) {
            record.outcome = MigrationOutcome::Failed { step, reason };
        }
    });
}

/// Removes the user's migration record, returning it if one existed
pub fn close_migration(user: &Address) -> Option<MigrationRecord> {
    ACTIVE_MIGRATIONS.with(|records| records.borrow_mut().remove(user))
}

pub fn stalled_migrations() -> Vec<MigrationRecord> {
    ACTIVE_MIGRATIONS.with(|records| {
        records
            .borrow()
            .values()
            .filter(|record| matches!(record.outcome, MigrationOutcome::Failed { .. }))
            .cloned()
            .collect()
    })
}
