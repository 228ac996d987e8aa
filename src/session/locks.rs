use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::SessionId;

/// Per-session async locks serializing load → generate → save within one
/// process.
///
/// Entries are held weakly: once the last guard for an id is dropped the
/// slot is pruned on a later acquire.
#[derive(Default)]
pub struct SessionLocks {
    slots: Mutex<HashMap<SessionId, Weak<AsyncMutex<()>>>>,
}

/// Held while a request owns a session
pub type SessionGuard = OwnedMutexGuard<()>;

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &SessionId) -> SessionGuard {
        let lock = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.retain(|_, slot| slot.strong_count() > 0);
            match slots.get(id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    slots.insert(id.clone(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Number of ids with a live lock
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = Arc::new(SessionLocks::new());
        let id = SessionId::generate();

        let guard = locks.acquire(&id).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "second acquire should wait");

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish after release")
            .expect("waiter task");
    }

    #[tokio::test]
    async fn test_distinct_ids_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire(&SessionId::generate()).await;
        let _b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&SessionId::generate()),
        )
        .await
        .expect("different id should not wait");
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_released_slots_are_pruned() {
        let locks = SessionLocks::new();
        drop(locks.acquire(&SessionId::generate()).await);
        drop(locks.acquire(&SessionId::generate()).await);
        assert_eq!(locks.active(), 0);
    }
}
