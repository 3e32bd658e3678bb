//! Per-account serialization of mutating requests.
//!
//! Each account id maps to an async mutex. A handler holds the guard for
//! the whole load → mutate → commit sequence, so two requests for the same
//! account never interleave. Requests for different accounts never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::lock_or_recover;

#[derive(Default)]
pub struct AccountLocks {
    slots: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account_id`.
    pub async fn lock(&self, account_id: i64) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = lock_or_recover(&self.slots);
            // Drop slots nobody holds or waits on.
            if slots.len() > 1024 {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(account_id).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of tracked slots.
    pub fn len(&self) -> usize {
        lock_or_recover(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_account_is_exclusive() {
        let locks = Arc::new(AccountLocks::new());
        let guard = locks.lock(1).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_accounts_do_not_contend() {
        let locks = AccountLocks::new();
        let _a = locks.lock(1).await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.lock(2))
            .await
            .unwrap();
        assert_eq!(locks.len(), 2);
    }
}
