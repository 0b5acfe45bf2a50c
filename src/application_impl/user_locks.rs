use crate::domain_model::UserId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<UserId, Arc<Mutex<()>>>;

/// One async mutex per user, created on demand and dropped once nobody holds
/// or waits for it. Different users never share a lock.
#[derive(Default)]
pub struct UserLocks {
    locks: Arc<LockMap>,
}

pub struct UserLockGuard {
    user_id: UserId,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: UserId) -> UserLockGuard {
        let mutex = self.locks.entry(user_id).or_default().value().clone();
        let guard = mutex.lock_owned().await;
        UserLockGuard {
            user_id,
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Number of users with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

impl UserLockGuard {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map itself still references the mutex: no holder, no waiter.
        self.locks
            .remove_if(&self.user_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
