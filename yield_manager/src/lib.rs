mod canister;
mod cleanup;
mod constants;
mod journal;
mod oracle;
mod providers;
mod registry;
mod state;
mod strategy;
mod timers;
mod types;
mod utils;
mod wallet;

pub use canister::YieldManager;
