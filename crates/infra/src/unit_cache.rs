//! Single-flight cache of per-type storage units.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use esdoc_core::{StoreError, StoreResult, TypeKey};

type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Map from type key to a lazily built value.
///
/// Each key owns a slot with its own lock. The map lock is held only long
/// enough to find or insert the slot, so builds for different keys run in
/// parallel while concurrent first lookups of the same key build it once.
/// A failed build leaves the slot empty and the next lookup tries again.
#[derive(Debug)]
pub struct UnitCache<T> {
    slots: Mutex<HashMap<TypeKey, Slot<T>>>,
}

impl<T> Default for UnitCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> UnitCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, building it with `build` on a miss.
    pub fn get_or_try_init<F>(&self, key: &TypeKey, build: F) -> StoreResult<Arc<T>>
    where
        F: FnOnce() -> StoreResult<T>,
    {
        let slot = self.slot(key)?;
        let mut guard = slot
            .lock()
            .map_err(|_| StoreError::storage(format!("unit cache slot for '{key}' poisoned")))?;

        if let Some(unit) = guard.as_ref() {
            return Ok(Arc::clone(unit));
        }
        let unit = Arc::new(build()?);
        *guard = Some(Arc::clone(&unit));
        Ok(unit)
    }

    /// Drop the cached value; `true` when one was present.
    pub fn invalidate(&self, key: &TypeKey) -> StoreResult<bool> {
        let removed = self.lock_slots()?.remove(key);
        match removed {
            Some(slot) => {
                let guard = slot.lock().map_err(|_| {
                    StoreError::storage(format!("unit cache slot for '{key}' poisoned"))
                })?;
                Ok(guard.is_some())
            }
            None => Ok(false),
        }
    }

    /// Keys with a built value, sorted.
    pub fn keys(&self) -> StoreResult<Vec<TypeKey>> {
        let slots: Vec<(TypeKey, Slot<T>)> = self
            .lock_slots()?
            .iter()
            .map(|(k, s)| (k.clone(), Arc::clone(s)))
            .collect();

        let mut keys = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            // A slot being built right now is skipped rather than waited on.
            if let Ok(guard) = slot.try_lock() {
                if guard.is_some() {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn slot(&self, key: &TypeKey) -> StoreResult<Slot<T>> {
        let mut slots = self.lock_slots()?;
        Ok(Arc::clone(slots.entry(key.clone()).or_default()))
    }

    fn lock_slots(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<TypeKey, Slot<T>>>> {
        self.slots
            .lock()
            .map_err(|_| StoreError::storage("unit cache lock poisoned"))
    }
}
