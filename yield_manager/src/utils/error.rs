use candid::CandidType;
use evm_rpc_types::RpcError;
use ic_exports::ic_kit::RejectionCode;
use serde::Deserialize;

use crate::types::{CompletedStep, StepKind};

/// Yield Manager Canister Result
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Yield Manager Canister Errors
#[derive(Clone, CandidType, Debug, Deserialize, PartialEq)]
pub enum ManagerError {
    /// `CallResult` error
    CallResult(RejectionCode, String),
    /// Unauthorized access
    Unauthorized,
    /// A requested value does not exist
    NonExistentValue,
    /// Wrapper for the RPC errors returned by the EVM RPC canister
    RpcResponseError(RpcError),
    /// Decoding issue
    DecodingError(String),
    /// Account is locked by an in-progress run
    Locked,
    /// No consensus was reached among RPC providers
    NoConsensus(String),
    /// An asset or protocol identifier outside the closed universe
    UnknownIdentifier(String),
    /// The tier filter left no protocol to choose from
    NoEligibleProtocol,
    /// The position references a protocol the snapshot does not carry
    InconsistentSnapshot(String),
    /// The yield backend could not be fetched or its payload was unusable.
    /// Aborts the whole cycle, not just one user.
    OracleUnavailable(String),
    /// A broadcast transaction was not seen in a block within the polling cap
    InclusionTimeout { tx_hash: String },
    /// Arithmetic error
    Arithmetic(String),
    /// A migration sequence stopped partway through
    Migration(Box<MigrationError>),
    /// Unknown/Custom error
    Custom(String),
}

/// Where a migration sequence stopped and what had already landed on-chain
#[derive(Clone, CandidType, Debug, Deserialize, PartialEq)]
pub struct MigrationError {
    /// The step that failed
    pub step: StepKind,
    /// Steps that were confirmed before the failure, with their hashes
    pub completed: Vec<CompletedStep>,
    /// The underlying failure
    pub source: ManagerError,
}

pub fn arithmetic_err<S: AsRef<str>>(s: S) -> ManagerError {
    ManagerError::Arithmetic(format!("{:#?}", s.as_ref()))
}
