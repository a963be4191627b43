use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// One mutex per key, created on demand. Different keys never contend.
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self { Self { slots: Mutex::new(HashMap::new()) } }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self { Self::default() }

    /// Run `f` while holding the lock for `key`.
    pub fn with<T>(&self, key: &K, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key.clone()).or_default().clone()
        };
        let result = {
            let _guard: MutexGuard<'_, ()> = slot.lock();
            f()
        };
        self.release(key, slot);
        result
    }

    // Drop the slot once nobody else holds or waits on it.
    fn release(&self, key: &K, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock();
        drop(slot);
        if slots.get(key).is_some_and(|s| Arc::strong_count(s) == 1) {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize { self.slots.lock().len() }
}
