//! Types used across the canister

use alloy_sol_types::sol;
use candid::{CandidType, Principal};
use serde::Deserialize;

use crate::registry::Protocol;

/// Derivation path for the threshold ECDSA signer
pub type DerivationPath = Vec<Vec<u8>>;

/// Risk appetite attached to a user account.
///
/// Medium and high are separate variants even though both currently admit
/// every protocol; the filter arms live in `strategy::policy::decide`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, CandidType, Deserialize)]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
}

/// A user's staked position as last reported by the position tracker.
/// The canister only reads these; updates arrive via `report_position`.
#[derive(Clone, Debug, PartialEq)]
pub struct UserPosition {
    pub user_address: alloy_primitives::Address,
    pub protocol: Protocol,
    /// Whole-token units, scaled on-chain by `constants::SCALE`
    pub staked_amount: u64,
}

/// One step of the migration sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, CandidType, Deserialize)]
pub enum StepKind {
    Unstake,
    Approve,
    Swap,
    Stake,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepKind::Unstake => "unstake",
            StepKind::Approve => "approve",
            StepKind::Swap => "swap",
            StepKind::Stake => "stake",
        };
        write!(f, "{}", name)
    }
}

/// A confirmed step and its transaction hash
#[derive(Clone, Debug, PartialEq, CandidType, Deserialize)]
pub struct CompletedStep {
    pub kind: StepKind,
    pub tx_hash: String,
}

/// The four transaction hashes of a fully executed migration
#[derive(Clone, Debug, PartialEq, CandidType, Deserialize)]
pub struct MigrationReceipts {
    pub unstake: String,
    pub approve: String,
    pub swap: String,
    pub stake: String,
}

#[derive(Clone, Debug, PartialEq, CandidType, Deserialize)]
pub enum MigrationOutcome {
    InFlight,
    Failed { step: StepKind, reason: String },
}

/// Durable record of a migration attempt. Stays in state until the sequence
/// completes, or until the operator clears it after a failure.
#[derive(Clone, Debug, PartialEq, CandidType, Deserialize)]
pub struct MigrationRecord {
    pub user_address: String,
    pub source_protocol: String,
    pub target_protocol: String,
    pub amount: u64,
    pub started_at: u64,
    pub completed: Vec<CompletedStep>,
    pub outcome: MigrationOutcome,
}

/// One user entry in the installation argument
#[derive(Clone, CandidType, Deserialize)]
pub struct UserInput {
    pub user_address: String,
    pub risk_tier: RiskTier,
}

/// Canister installation argument
#[derive(Clone, CandidType, Deserialize)]
pub struct InitArgs {
    pub rpc_principal: Principal,
    pub oracle_endpoint: Option<String>,
    pub users: Vec<UserInput>,
}

sol!(
    function withdrawAll() external;
    function approve(address spender, uint256 amount) external returns (bool);
    function transfer(address to, uint256 amount) external returns (bool);
    function mint(address to, uint256 amount) external;
    function swap(address tokenIn, address tokenOut, uint256 amount) external;
    function stake(uint256 poolId, uint256 amount) external;
);
