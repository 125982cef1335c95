//! Executable form of a migration plan.
//!
//! Runs the four-step sequence against the chain, strictly in order, with a
//! fresh nonce and a confirmed inclusion per step. Keeps the durable
//! migration record in state up to date as steps land.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;

use crate::constants::{approval_buffer, scale, SWAP_ROUTER};
use crate::journal::{JournalCollection, LogType};
use crate::registry::Registry;
use crate::state;
use crate::types::{
    approveCall, stakeCall, swapCall, withdrawAllCall, MigrationOutcome, MigrationRecord,
    MigrationReceipts, StepKind,
};
use crate::utils::chain::ChainClient;
use crate::utils::common::time_secs;
use crate::utils::error::{ManagerError, ManagerResult, MigrationError};

use super::account::{AccountSettings, StableAccount};
use super::lock::Lock;
use super::policy::MigrationPlan;

/// Outcome of the router approval step. Failure is an expected value here,
/// not an error path: it aborts the sequence with the funds left unstaked
/// in the wallet.
#[derive(Clone, Debug, PartialEq)]
pub enum ApprovalStatus {
    Approved { tx_hash: String },
    Failed { reason: String },
}

/// Converts a whole-token amount to smallest units
pub fn scaled_amount(amount: u64) -> U256 {
    U256::from(amount) * scale()
}

/// The allowance granted before a spend: the scaled amount plus the buffer
pub fn approval_amount(amount: u64) -> U256 {
    scaled_amount(amount) + approval_buffer()
}

/// A migration plan bound to an account and ready to execute
pub struct ExecutableMigration {
    pub settings: AccountSettings,
    pub plan: MigrationPlan,
    lock: Lock,
    acquired_lock: bool,
    source_staking: Address,
    target_staking: Address,
}

impl ExecutableMigration {
    /// Binds a plan to its account. Both staking contracts are resolved up
    /// front so an unknown identifier fails before any transaction is sent.
    pub fn new(
        account: &StableAccount,
        plan: MigrationPlan,
        registry: &Registry,
    ) -> ManagerResult<Self> {
        let source_staking = registry.resolve_protocol(plan.source_protocol)?;
        let target_staking = registry.resolve_protocol(plan.target_protocol)?;

        Ok(Self {
            settings: account.settings.clone(),
            plan,
            lock: account.lock.clone().into(),
            acquired_lock: false,
            source_staking,
            target_staking,
        })
    }

    /// Acquires the lock and persists the change to the account state
    fn lock(&mut self) -> ManagerResult<()> {
        self.lock.try_lock()?;
        self.acquired_lock = true;
        self.apply_change();
        Ok(())
    }

    /// Releases the lock and persists the change to the account state
    pub fn unlock(&mut self) {
        self.lock.try_unlock(self.acquired_lock);
        self.acquired_lock = false;
        self.apply_change();
    }

    fn apply_change(&self) {
        let _ = state::with_account_mut(&self.settings.user_address, |account| {
            account.lock = self.lock.clone().into();
        });
    }

    /// Runs the whole sequence. On success the four transaction hashes are
    /// returned and the migration record is closed; on failure the record
    /// stays in state marked with the failed step.
    pub async fn execute<C: ChainClient>(
        &mut self,
        chain: &C,
        journal: &mut JournalCollection,
    ) -> ManagerResult<MigrationReceipts> {
        self.lock()?;

        state::open_migration(
            self.settings.user_address,
            MigrationRecord {
                user_address: self.settings.user_address.to_string(),
                source_protocol: self.plan.source_protocol.to_string(),
                target_protocol: self.plan.target_protocol.to_string(),
                amount: self.plan.amount,
                started_at: time_secs(),
                completed: Vec::new(),
                outcome: MigrationOutcome::InFlight,
            },
        );

        let result = self.run_steps(chain, journal).await;

        match &result {
            Ok(receipts) => {
                state::close_migration(&self.settings.user_address);
                journal.append_note(
                    Ok(()),
                    LogType::Migration,
                    format!(
                        "Migrated {} from {} to {}. Hashes: {} / {} / {} / {}",
                        self.plan.amount,
                        self.plan.source_protocol,
                        self.plan.target_protocol,
                        receipts.unstake,
                        receipts.approve,
                        receipts.swap,
                        receipts.stake
                    ),
                );
            }
            Err(ManagerError::Migration(failure)) => {
                if failure.completed.is_empty() {
                    // nothing landed on-chain, the position is untouched and
                    // the next cycle can retry from scratch
                    state::close_migration(&self.settings.user_address);
                } else {
                    state::fail_migration(
                        &self.settings.user_address,
                        failure.step,
                        format!("{:?}", failure.source),
                    );
                }
            }
            Err(_) => {}
        }

        self.unlock();
        result
    }

    async fn run_steps<C: ChainClient>(
        &self,
        chain: &C,
        journal: &mut JournalCollection,
    ) -> ManagerResult<MigrationReceipts> {
        let mut completed = Vec::new();

        let unstake = self
            .submit_step(
                chain,
                journal,
                StepKind::Unstake,
                self.source_staking,
                withdrawAllCall {}.abi_encode(),
                &mut completed,
            )
            .await?;

        let approve = match self.approve_router(chain).await {
            ApprovalStatus::Approved { tx_hash } => {
                self.note_confirmed(journal, StepKind::Approve, &tx_hash, &mut completed);
                tx_hash
            }
            ApprovalStatus::Failed { reason } => {
                journal.append_note(
                    Err(ManagerError::Custom(reason.clone())),
                    LogType::ExecutionResult,
                    "Router approval failed. The funds stay unstaked in the wallet.",
                );
                return Err(ManagerError::Migration(Box::new(MigrationError {
                    step: StepKind::Approve,
                    completed,
                    source: ManagerError::Custom(reason),
                })));
            }
        };

        let swap = self
            .submit_step(
                chain,
                journal,
                StepKind::Swap,
                SWAP_ROUTER,
                swapCall {
                    tokenIn: self.plan.source_asset,
                    tokenOut: self.plan.target_asset,
                    amount: scaled_amount(self.plan.amount),
                }
                .abi_encode(),
                &mut completed,
            )
            .await?;

        let stake = self.stake_step(chain, journal, &mut completed).await?;

        Ok(MigrationReceipts {
            unstake,
            approve,
            swap,
            stake,
        })
    }

    /// One transaction: fresh nonce, submit, wait for inclusion, record
    async fn submit_step<C: ChainClient>(
        &self,
        chain: &C,
        journal: &mut JournalCollection,
        kind: StepKind,
        contract: Address,
        calldata: Vec<u8>,
        completed: &mut Vec<crate::types::CompletedStep>,
    ) -> ManagerResult<String> {
        let submitted = match chain.fresh_nonce().await {
            Ok(nonce) => chain.submit_and_confirm(contract, calldata, U256::ZERO, nonce).await,
            Err(err) => Err(err),
        };

        match submitted {
            Ok(tx_hash) => {
                self.note_confirmed(journal, kind, &tx_hash, completed);
                Ok(tx_hash)
            }
            Err(source) => {
                journal.append_note(
                    Err(source.clone()),
                    LogType::ExecutionResult,
                    format!("The {} step failed. Aborting the sequence.", kind),
                );
                Err(ManagerError::Migration(Box::new(MigrationError {
                    step: kind,
                    completed: completed.clone(),
                    source,
                })))
            }
        }
    }

    /// The pre-swap allowance on the freed token. Chain failures surface as
    /// an `ApprovalStatus` value instead of bubbling up raw.
    async fn approve_router<C: ChainClient>(&self, chain: &C) -> ApprovalStatus {
        let calldata = approveCall {
            spender: SWAP_ROUTER,
            amount: approval_amount(self.plan.amount),
        }
        .abi_encode();

        let submitted = match chain.fresh_nonce().await {
            Ok(nonce) => {
                chain
                    .submit_and_confirm(self.plan.source_asset, calldata, U256::ZERO, nonce)
                    .await
            }
            Err(err) => Err(err),
        };

        match submitted {
            Ok(tx_hash) => ApprovalStatus::Approved { tx_hash },
            Err(err) => ApprovalStatus::Failed {
                reason: format!("{:?}", err),
            },
        }
    }

    /// The stake step wraps two transactions: the allowance for the target
    /// pool, then the deposit itself. Only the deposit hash is part of the
    /// returned receipts.
    async fn stake_step<C: ChainClient>(
        &self,
        chain: &C,
        journal: &mut JournalCollection,
        completed: &mut Vec<crate::types::CompletedStep>,
    ) -> ManagerResult<String> {
        let allowance = approveCall {
            spender: self.target_staking,
            amount: approval_amount(self.plan.amount),
        }
        .abi_encode();

        let submitted = match chain.fresh_nonce().await {
            Ok(nonce) => {
                chain
                    .submit_and_confirm(self.plan.target_asset, allowance, U256::ZERO, nonce)
                    .await
            }
            Err(err) => Err(err),
        };

        match submitted {
            Ok(tx_hash) => {
                journal.append_note(
                    Ok(()),
                    LogType::Migration,
                    format!("Target pool allowance confirmed: {}", tx_hash),
                );
            }
            Err(source) => {
                journal.append_note(
                    Err(source.clone()),
                    LogType::ExecutionResult,
                    "The stake step failed at the target allowance. Aborting the sequence.",
                );
                return Err(ManagerError::Migration(Box::new(MigrationError {
                    step: StepKind::Stake,
                    completed: completed.clone(),
                    source,
                })));
            }
        }

        self.submit_step(
            chain,
            journal,
            StepKind::Stake,
            self.target_staking,
            stakeCall {
                poolId: U256::ZERO,
                amount: scaled_amount(self.plan.amount),
            }
            .abi_encode(),
            completed,
        )
        .await
    }

    fn note_confirmed(
        &self,
        journal: &mut JournalCollection,
        kind: StepKind,
        tx_hash: &str,
        completed: &mut Vec<crate::types::CompletedStep>,
    ) {
        completed.push(crate::types::CompletedStep {
            kind,
            tx_hash: tx_hash.to_string(),
        });
        state::record_migration_step(&self.settings.user_address, kind, tx_hash);
        journal.append_note(
            Ok(()),
            LogType::Migration,
            format!("The {} transaction was confirmed: {}", kind, tx_hash),
        );
    }
}

impl Drop for ExecutableMigration {
    /// Releases the lock if the migration still holds it
    fn drop(&mut self) {
        if self.acquired_lock {
            self.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Protocol;
    use crate::state::ACCOUNTS;
    use crate::types::RiskTier;
    use crate::utils::common::block_on;
    use alloy_primitives::address;
    use std::cell::{Cell, RefCell};

    const USER: Address = address!("0123456789abcdef0123456789abcdef01234567");

    /// Records every accepted submission and can be told to fail the n-th one
    struct StubChain {
        nonce: Cell<u64>,
        submissions: RefCell<Vec<(Address, Vec<u8>, u64)>>,
        fail_on_submission: Option<usize>,
    }

    impl StubChain {
        fn new(fail_on_submission: Option<usize>) -> Self {
            Self {
                nonce: Cell::new(40),
                submissions: RefCell::new(Vec::new()),
                fail_on_submission,
            }
        }
    }

    impl ChainClient for StubChain {
        async fn fresh_nonce(&self) -> ManagerResult<u64> {
            Ok(self.nonce.get())
        }

        async fn submit_and_confirm(
            &self,
            contract: Address,
            calldata: Vec<u8>,
            _value: U256,
            nonce: u64,
        ) -> ManagerResult<String> {
            let index = self.submissions.borrow().len();
            if self.fail_on_submission == Some(index) {
                return Err(ManagerError::Custom("simulated chain failure".to_string()));
            }
            self.submissions.borrow_mut().push((contract, calldata, nonce));
            // a confirmed inclusion advances the account's transaction count
            self.nonce.set(self.nonce.get() + 1);
            Ok(format!("0xhash{}", index))
        }
    }

    fn seeded_migration() -> ExecutableMigration {
        ACCOUNTS.with(|accounts| accounts.borrow_mut().clear());
        crate::state::ACTIVE_MIGRATIONS.with(|records| records.borrow_mut().clear());

        let mut settings = super::super::account::AccountSettings::default();
        settings
            .user_address(USER)
            .derivation_path(vec![USER.to_vec()])
            .eoa(Some(address!("7E5F4552091A69125d5DfCb7b8C2659029395Bdf")))
            .risk_tier(RiskTier::Low);
        let mut account = StableAccount::default();
        account.settings(settings);
        account.mint().unwrap();

        let registry = Registry::manta_pacific();
        let plan = MigrationPlan {
            source_protocol: Protocol::AaveV3,
            target_protocol: Protocol::CompoundV3,
            source_asset: crate::constants::DAI_TOKEN,
            target_asset: crate::constants::USDC_TOKEN,
            amount: 250,
        };

        ExecutableMigration::new(&account, plan, &registry).unwrap()
    }

    #[test]
    fn full_sequence_orders_steps_and_nonces() {
        let mut migration = seeded_migration();
        let chain = StubChain::new(None);
        let mut journal = JournalCollection::open(None);

        let receipts = block_on(migration.execute(&chain, &mut journal)).unwrap();
        assert_eq!(receipts.unstake, "0xhash0");
        assert_eq!(receipts.approve, "0xhash1");
        assert_eq!(receipts.swap, "0xhash2");
        assert_eq!(receipts.stake, "0xhash4"); // hash3 is the target allowance

        let submissions = chain.submissions.borrow();
        assert_eq!(submissions.len(), 5);

        // contracts, in order: source pool, freed token, router, target token, target pool
        assert_eq!(submissions[0].0, crate::constants::AAVE_V3_STAKING);
        assert_eq!(submissions[1].0, crate::constants::DAI_TOKEN);
        assert_eq!(submissions[2].0, crate::constants::SWAP_ROUTER);
        assert_eq!(submissions[3].0, crate::constants::USDC_TOKEN);
        assert_eq!(submissions[4].0, crate::constants::COMPOUND_V3_STAKING);

        // every step read a fresh nonce after the previous confirmation
        let nonces: Vec<u64> = submissions.iter().map(|(_, _, nonce)| *nonce).collect();
        assert_eq!(nonces, vec![40, 41, 42, 43, 44]);

        // the record closed on success
        assert!(crate::state::active_migration(&USER).is_none());
    }

    #[test]
    fn calldata_carries_scaled_amounts_and_buffer() {
        let mut migration = seeded_migration();
        let chain = StubChain::new(None);
        let mut journal = JournalCollection::open(None);
        block_on(migration.execute(&chain, &mut journal)).unwrap();

        let submissions = chain.submissions.borrow();
        let approve = approveCall::abi_decode(&submissions[1].1, false).unwrap();
        assert_eq!(approve.spender, SWAP_ROUTER);
        assert_eq!(approve.amount, U256::from(250_u64 * 1_000_000 + 10));

        let swap = swapCall::abi_decode(&submissions[2].1, false).unwrap();
        assert_eq!(swap.tokenIn, crate::constants::DAI_TOKEN);
        assert_eq!(swap.tokenOut, crate::constants::USDC_TOKEN);
        assert_eq!(swap.amount, U256::from(250_u64 * 1_000_000));

        let stake = stakeCall::abi_decode(&submissions[4].1, false).unwrap();
        assert_eq!(stake.poolId, U256::ZERO);
        assert_eq!(stake.amount, U256::from(250_u64 * 1_000_000));
    }

    #[test]
    fn approve_failure_aborts_with_unstake_preserved() {
        let mut migration = seeded_migration();
        // submission 1 is the router approval
        let chain = StubChain::new(Some(1));
        let mut journal = JournalCollection::open(None);

        let result = block_on(migration.execute(&chain, &mut journal));
        let err = result.unwrap_err();

        match err {
            ManagerError::Migration(failure) => {
                assert_eq!(failure.step, StepKind::Approve);
                assert_eq!(failure.completed.len(), 1);
                assert_eq!(failure.completed[0].kind, StepKind::Unstake);
                assert_eq!(failure.completed[0].tx_hash, "0xhash0");
            }
            other => panic!("expected a migration error, got {:?}", other),
        }

        // nothing past the approval was submitted
        assert_eq!(chain.submissions.borrow().len(), 1);

        // the durable record stays, marked as failed
        let record = crate::state::active_migration(&USER).unwrap();
        assert!(matches!(
            record.outcome,
            MigrationOutcome::Failed {
                step: StepKind::Approve,
                ..
            }
        ));
        assert_eq!(record.completed.len(), 1);
    }

    #[test]
    fn swap_failure_names_the_step_and_prior_hashes() {
        let mut migration = seeded_migration();
        let chain = StubChain::new(Some(2));
        let mut journal = JournalCollection::open(None);

        let err = block_on(migration.execute(&chain, &mut journal)).unwrap_err();
        match err {
            ManagerError::Migration(failure) => {
                assert_eq!(failure.step, StepKind::Swap);
                let kinds: Vec<StepKind> =
                    failure.completed.iter().map(|step| step.kind).collect();
                assert_eq!(kinds, vec![StepKind::Unstake, StepKind::Approve]);
            }
            other => panic!("expected a migration error, got {:?}", other),
        }
    }

    #[test]
    fn failure_before_any_transaction_leaves_no_record() {
        let mut migration = seeded_migration();
        let chain = StubChain::new(Some(0));
        let mut journal = JournalCollection::open(None);

        let err = block_on(migration.execute(&chain, &mut journal)).unwrap_err();
        assert!(matches!(err, ManagerError::Migration(_)));

        // the position is untouched, so the record is closed for a clean retry
        assert!(crate::state::active_migration(&USER).is_none());
    }

    #[test]
    fn lock_is_released_after_both_outcomes() {
        for failure in [None, Some(2_usize)] {
            let mut migration = seeded_migration();
            let chain = StubChain::new(failure);
            let mut journal = JournalCollection::open(None);
            let _ = block_on(migration.execute(&chain, &mut journal));

            let account = crate::state::account(&USER).unwrap();
            assert!(!account.lock.is_locked);
        }
    }

    #[test]
    fn amount_helpers_match_the_constants() {
        assert_eq!(scaled_amount(1), U256::from(1_000_000_u64));
        assert_eq!(approval_amount(1), U256::from(1_000_010_u64));
        assert_eq!(scaled_amount(0), U256::ZERO);
        assert_eq!(approval_amount(0), U256::from(10_u64));
    }
}
