//! Per-platform mutual exclusion.
//!
//! An upload or delete runs mutate, reindex and mirror as one unit. Holding
//! the platform's lock for that whole sequence keeps two requests on the same
//! platform from interleaving; different platforms never contend.

use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};

use crate::platform::Platform;

/// One async mutex per platform, created up front.
#[derive(Debug)]
pub struct PlatformLocks {
    locks: HashMap<Platform, Mutex<()>>,
}

impl Default for PlatformLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformLocks {
    pub fn new() -> Self {
        Self {
            locks: Platform::ALL.into_iter().map(|p| (p, Mutex::new(()))).collect(),
        }
    }

    /// Wait for exclusive access to `platform`.
    pub async fn lock(&self, platform: Platform) -> MutexGuard<'_, ()> {
        self.locks[&platform].lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_platform_is_exclusive() {
        let locks = PlatformLocks::new();
        let _held = locks.lock(Platform::Linux64).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(Platform::Linux64)).await;
        assert!(second.is_err(), "second lock on the same platform should wait");
    }

    #[tokio::test]
    async fn different_platforms_do_not_contend() {
        let locks = PlatformLocks::new();
        let _linux = locks.lock(Platform::Linux64).await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock(Platform::Win64)).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn lock_is_released_on_drop() {
        let locks = PlatformLocks::new();
        drop(locks.lock(Platform::Noarch).await);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.lock(Platform::Noarch)).await;
        assert!(again.is_ok());
    }
}
