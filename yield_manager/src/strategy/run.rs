//! The timer-driven rebalance cycle.
//!
//! One oracle snapshot per cycle, then one isolated run per user. A user
//! failure is journaled and never stops the loop; an oracle failure aborts
//! the whole cycle.

use crate::journal::{JournalCollection, LogType};
use crate::oracle::{self, YieldQuote};
use crate::registry::Registry;
use crate::state::{self, REGISTRY, RPC_CANISTER};
use crate::types::MigrationOutcome;
use crate::utils::chain::EvmRpcClient;
use crate::utils::common::time_secs;
use crate::utils::error::{ManagerError, ManagerResult};
use crate::wallet;

use super::account::StableAccount;
use super::executable::ExecutableMigration;
use super::policy::{self, RebalanceDecision};

/// Runs one full rebalance cycle across every registered user
pub async fn run_cycle() {
    let mut journal = JournalCollection::open(None);
    let registry = REGISTRY.with(|registry| registry.borrow().clone());

    let snapshot = match oracle::fetch_snapshot(&registry).await {
        Ok(snapshot) => {
            journal.append_note(
                Ok(()),
                LogType::Info,
                format!("Fetched a snapshot with {} quotes.", snapshot.len()),
            );
            snapshot
        }
        Err(err) => {
            journal.append_note(
                Err(err),
                LogType::ExecutionResult,
                "The snapshot fetch failed. Skipping this cycle for every user.",
            );
            journal.close();
            return;
        }
    };

    run_all_users(&snapshot, &registry).await;

    journal.append_note(Ok(()), LogType::Info, "Finished the cycle.");
    journal.close();
}

/// Runs every user under custody against one snapshot. Each user gets their
/// own journal collection and a failure never stops the loop.
async fn run_all_users(snapshot: &[YieldQuote], registry: &Registry) {
    for user in wallet::list_user_addresses() {
        let account = match state::account(&user) {
            Ok(account) => account,
            Err(_) => continue,
        };
        let mut user_journal = JournalCollection::open(Some(user.to_string()));

        let result = run_user(&account, snapshot, registry, &mut user_journal).await;

        let now = time_secs();
        let succeeded = result.is_ok();
        let _ = state::with_account_mut(&user, |account| {
            account.data.last_cycle = now;
            if succeeded {
                account.data.last_ok_cycle = now;
            }
        });

        match result {
            Ok(()) => {
                user_journal.append_note(Ok(()), LogType::Info, "Finished the run for this user.")
            }
            Err(err) => user_journal.append_note(
                Err(err),
                LogType::ExecutionResult,
                "The run for this user failed. Other users are unaffected.",
            ),
        };
        user_journal.close();
    }
}

/// Decides and, when indicated, executes for one user
async fn run_user(
    account: &StableAccount,
    snapshot: &[YieldQuote],
    registry: &Registry,
    journal: &mut JournalCollection,
) -> ManagerResult<()> {
    let user = account.settings.user_address;

    if let Some(record) = state::active_migration(&user) {
        let note = match record.outcome {
            MigrationOutcome::Failed { .. } => {
                "A stalled migration needs operator attention. Skipping this user."
            }
            MigrationOutcome::InFlight => {
                "A previous migration never settled. Skipping this user."
            }
        };
        journal.append_note(
            Err(ManagerError::Custom(format!(
                "unresolved migration from {} to {}",
                record.source_protocol, record.target_protocol
            ))),
            LogType::Info,
            note,
        );
        return Ok(());
    }

    let position = match state::position(&user) {
        Some(position) => position,
        None => {
            journal.append_note(
                Ok(()),
                LogType::Info,
                "No reported position for this user. Nothing to do.",
            );
            return Ok(());
        }
    };

    let decision = policy::decide(&position, snapshot, account.settings.risk_tier, registry)?;

    match decision {
        RebalanceDecision::Hold => {
            journal.append_note(
                Ok(()),
                LogType::Decision,
                format!(
                    "Holding {}. It is already the best eligible protocol.",
                    position.protocol
                ),
            );
            Ok(())
        }
        RebalanceDecision::Migrate(plan) => {
            journal.append_note(
                Ok(()),
                LogType::Decision,
                format!(
                    "Migrating {} from {} to {}.",
                    plan.amount, plan.source_protocol, plan.target_protocol
                ),
            );

            let eoa = match account.settings.eoa {
                Some(eoa) => eoa,
                None => {
                    journal.append_note(
                        Ok(()),
                        LogType::Custody,
                        "The wallet has no public key assigned yet. Skipping this user.",
                    );
                    return Ok(());
                }
            };

            let rpc = RPC_CANISTER.with(|service| *service.borrow());
            let chain = EvmRpcClient::new(rpc, eoa, account.settings.derivation_path.clone());

            let mut migration = ExecutableMigration::new(account, plan, registry)?;
            migration.execute(&chain, journal).await?;
            Ok(())
        }
    }
}
