//! Account Locking System
//!
//! A timeout-based locking mechanism that prevents concurrent execution of
//! one user's migration sequence while providing automatic deadlock
//! recovery. The system maintains both runtime and persistent lock
//! representations with safe state transitions.
//!
//! ```plain
//! Lock State Machine:
//!
//!                   +----------+
//!              +----> Unlocked <-----+
//!              |    +----------+     |
//!              |         |           |
//! Auto-Unlock  |     try_lock      try_unlock
//! (Timeout)    |         |           |
//!              |         v           |
//!              |    +---------+      |
//!              +----+ Locked  +------+
//!                   +---------+
//!
//! Timeout = ACCOUNT_LOCK_TIMEOUT (3600s)
//! ```

use candid::CandidType;
use serde::Deserialize;

use crate::{
    constants::ACCOUNT_LOCK_TIMEOUT,
    utils::common::time_secs,
    utils::error::{ManagerError, ManagerResult},
};

/// Runtime lock implementation with automatic timeout recovery
#[derive(Clone, Default)]
pub struct Lock {
    /// Current lock state
    pub is_locked: bool,
    /// Last successful lock acquisition time, in seconds
    pub last_locked_at: Option<u64>,
}

impl Lock {
    /// Attempts to acquire the lock.
    ///
    /// Succeeds if either:
    /// 1. Lock is currently free (unlocked)
    /// 2. Existing lock has exceeded the timeout period
    pub fn try_lock(&mut self) -> ManagerResult<()> {
        let current_time = time_secs();

        if let Some(last_locked_at) = self.last_locked_at {
            if self.is_locked && current_time - last_locked_at > ACCOUNT_LOCK_TIMEOUT {
                self.is_locked = false;
            }
        }

        if !self.is_locked {
            self.is_locked = true;
            self.last_locked_at = Some(current_time);
            Ok(())
        } else {
            Err(ManagerError::Locked)
        }
    }

    /// Releases the lock if it was legitimately acquired.
    ///
    /// Also handles timeout-based cleanup of abandoned locks.
    pub fn try_unlock(&mut self, acquired_lock: bool) -> &mut Self {
        if acquired_lock {
            self.is_locked = false;
            self.last_locked_at = None;
        } else if let Some(last_locked_at) = self.last_locked_at {
            let current_time = time_secs();

            if self.is_locked && current_time - last_locked_at > ACCOUNT_LOCK_TIMEOUT {
                self.is_locked = false;
                self.last_locked_at = None;
            }
        }

        self
    }
}

/// Persistent lock state. Does not implement locking logic.
#[derive(Clone, Default, CandidType, Deserialize)]
pub struct StableLock {
    /// Status of the lock. `true` represents locked and `false` unlocked
    pub is_locked: bool,
    /// Last locked timestamp in seconds
    pub last_locked_at: Option<u64>,
}

/// Conversion from storage to runtime lock
impl From<StableLock> for Lock {
    fn from(value: StableLock) -> Self {
        Self {
            is_locked: value.is_locked,
            last_locked_at: value.last_locked_at,
        }
    }
}

/// Conversion from runtime to storage lock
impl From<Lock> for StableLock {
    fn from(value: Lock) -> Self {
        Self {
            is_locked: value.is_locked,
            last_locked_at: value.last_locked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquisition_fails_while_held() {
        let mut lock = Lock::default();
        assert!(lock.try_lock().is_ok());
        assert_eq!(lock.try_lock(), Err(ManagerError::Locked));
    }

    #[test]
    fn unlock_requires_ownership() {
        let mut lock = Lock::default();
        lock.try_lock().unwrap();

        // a caller that never acquired the lock cannot release a live one
        lock.try_unlock(false);
        assert!(lock.is_locked);

        lock.try_unlock(true);
        assert!(!lock.is_locked);
        assert!(lock.try_lock().is_ok());
    }

    #[test]
    fn stable_round_trip_preserves_state() {
        let mut lock = Lock::default();
        lock.try_lock().unwrap();
        let stable: StableLock = lock.into();
        let restored: Lock = stable.into();
        assert!(restored.is_locked);
    }
}
