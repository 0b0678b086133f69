use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use echelon_core::domain::conversation::SenderId;

type SenderLock = Arc<tokio::sync::Mutex<()>>;
type LockTable = Arc<Mutex<BTreeMap<SenderId, SenderLock>>>;

/// One async mutex per sender. Holding a sender's guard serializes that sender's events only.
///
/// Waiters are served in the order they started waiting. An entry lives only while some guard
/// or waiter references it.
#[derive(Clone, Default)]
pub struct SenderLocks {
    locks: LockTable,
}

/// Held for the handling of one event. Dropping the last reference to a sender's lock removes
/// its entry.
pub struct SenderGuard {
    sender_id: SenderId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockTable,
}

impl SenderGuard {
    pub fn sender_id(&self) -> &SenderId {
        &self.sender_id
    }
}

impl Drop for SenderGuard {
    fn drop(&mut self) {
        // The owned guard keeps its own reference to the mutex.
        drop(self.guard.take());
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        let unused = locks.get(&self.sender_id).is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            locks.remove(&self.sender_id);
        }
    }
}

impl SenderLocks {
    pub async fn acquire(&self, sender_id: &SenderId) -> SenderGuard {
        let lock = self.lock_for(sender_id);
        let guard = lock.lock_owned().await;
        SenderGuard {
            sender_id: sender_id.clone(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    fn lock_for(&self, sender_id: &SenderId) -> SenderLock {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(sender_id.clone()).or_default())
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
