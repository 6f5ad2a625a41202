//! Per-name mutual exclusion.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Hands out one lock per storage name.
///
/// Slots that nobody holds are pruned the next time the table is touched.
#[derive(Debug, Default)]
pub struct NameLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for `name`. Lock the returned mutex for the duration of
    /// the critical section.
    pub fn slot(&self, name: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock();
        slots.retain(|key, slot| key == name || Arc::strong_count(slot) > 1);
        slots
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of names currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
