pub mod chain;
pub mod common;
pub mod error;
pub mod evm_rpc;
pub mod gas;
pub mod signer;
pub mod transaction_builder;
