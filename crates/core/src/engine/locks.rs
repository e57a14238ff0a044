use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::SessionId;

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// One async mutex per session id. Holding the guard makes the caller the
/// only writer of that session; other sessions are unaffected.
///
/// Entries only live while some caller holds or waits on them.
#[derive(Default)]
pub(crate) struct SessionLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl SessionLocks {
    pub(crate) async fn acquire(&self, id: &SessionId) -> SessionGuard {
        let lock = {
            let mut locks = lock_map(&self.locks);
            Arc::clone(locks.entry(id.0.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        SessionGuard { id: id.0.clone(), locks: Arc::clone(&self.locks), guard: Some(guard) }
    }

    pub(crate) fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }
}

pub(crate) struct SessionGuard {
    id: String,
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_map(&self.locks);
        // The map's own reference is the last one: nobody is waiting.
        if locks.get(&self.id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.id);
        }
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    match locks.lock() {
        Ok(locks) => locks,
        Err(poisoned) => poisoned.into_inner(),
    }
}
