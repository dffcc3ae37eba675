use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use super::{DocumentKey, StorageError};

/// Blocking lock for a single document key (`Mutex<bool>` + `Condvar`).
#[derive(Debug, Default)]
struct KeyLock {
    held: Mutex<bool>,
    wake: Condvar,
}

impl KeyLock {
    fn lock(&self) -> Result<(), StorageError> {
        let mut held = self
            .held
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?;
        while *held {
            held = self
                .wake
                .wait(held)
                .map_err(|e| StorageError::Poisoned(e.to_string()))?;
        }
        *held = true;
        Ok(())
    }

    fn unlock(&self) {
        // A poisoned flag still gets cleared so waiters can observe the poison themselves.
        let mut held = match self.held.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        *held = false;
        self.wake.notify_one();
    }
}

/// Lazily-populated table of per-key locks.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<DocumentKey, Arc<KeyLock>>>,
}

impl KeyLocks {
    fn get(&self, key: &DocumentKey) -> Result<Arc<KeyLock>, StorageError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StorageError::Poisoned("lock table poisoned".into()))?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }

    /// Acquire every key, in order. `keys` must be sorted and deduplicated.
    pub(crate) fn acquire(&self, keys: &[DocumentKey]) -> Result<KeyGuard, StorageError> {
        let mut guard = KeyGuard { held: Vec::with_capacity(keys.len()) };
        for key in keys {
            let lock = self.get(key)?;
            lock.lock()?;
            guard.held.push(lock);
        }
        Ok(guard)
    }
}

/// Releases its locks in reverse acquisition order on drop.
#[derive(Debug)]
pub(crate) struct KeyGuard {
    held: Vec<Arc<KeyLock>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        while let Some(lock) = self.held.pop() {
            lock.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use stockflow_core::{LotId, ProductId};
    use stockflow_inventory::StockKey;

    fn position(lot: &str) -> DocumentKey {
        DocumentKey::Position(StockKey::new(ProductId::new("p1"), LotId::new(lot)))
    }

    #[test]
    fn guard_releases_on_drop() {
        let locks = KeyLocks::default();
        let keys = vec![position("l1")];
        drop(locks.acquire(&keys).unwrap());
        // Would deadlock if the first guard had leaked its lock.
        drop(locks.acquire(&keys).unwrap());
    }

    #[test]
    fn same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::default());
        let keys = vec![position("l1")];
        let guard = locks.acquire(&keys).unwrap();

        let entered = Arc::new(AtomicBool::new(false));
        let handle = {
            let locks = locks.clone();
            let entered = entered.clone();
            let keys = keys.clone();
            std::thread::spawn(move || {
                let _g = locks.acquire(&keys).unwrap();
                entered.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));
        drop(guard);
        handle.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn disjoint_keys_do_not_block() {
        let locks = KeyLocks::default();
        let _a = locks.acquire(&[position("l1")]).unwrap();
        let _b = locks.acquire(&[position("l2")]).unwrap();
    }
}
