//! Generates the candid file automatically

use yield_manager::YieldManager;

fn main() {
    let canister_e_idl = YieldManager::idl();
    let idl = candid::pretty::candid::compile(&canister_e_idl.env.env, &Some(canister_e_idl.actor));

    println!("{}", idl);
}
