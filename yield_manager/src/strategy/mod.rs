//! Rebalancing strategy: accounts, the pure decision policy, and the
//! executable migration sequence

pub mod account;
pub mod executable;
pub mod lock;
pub mod policy;
pub mod run;
