//! Timer wiring for the recurring tasks

use std::time::Duration;

use ic_exports::{
    ic_cdk::spawn,
    ic_cdk_timers::{set_timer, set_timer_interval},
};

use crate::cleanup::daily_cleanup;
use crate::constants::{CLEANUP_INTERVAL, CYCLE_INTERVAL};
use crate::strategy::run::run_cycle;
use crate::wallet::assign_public_keys;

/// Arms all recurring tasks. Called once at install time.
pub fn start_timers() {
    // accounts created at install time still need their public keys
    set_timer(Duration::ZERO, || spawn(assign_public_keys()));

    set_timer_interval(Duration::from_secs(CYCLE_INTERVAL), || spawn(run_cycle()));

    set_timer_interval(Duration::from_secs(CLEANUP_INTERVAL), || {
        spawn(daily_cleanup())
    });
}
