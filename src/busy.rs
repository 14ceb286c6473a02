use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{lifecycle::Action, orders::OrderId};

type Key = (Action, OrderId);

/// In-flight mutations, keyed by `(action, order)`.
///
/// A view disables a control while its key is held. At most one mutation per
/// order may be in flight, whatever the action.
#[derive(Debug, Clone, Default)]
pub struct BusyFlags {
    inner: Arc<Mutex<HashSet<Key>>>,
}

impl BusyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `(action, order_id)` busy, or returns `None` when any action on
    /// that order is already in flight. The flag clears when the guard drops.
    pub fn try_acquire(&self, action: Action, order_id: &str) -> Option<BusyGuard> {
        let mut set = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if set.iter().any(|(_, id)| id == order_id) {
            return None;
        }
        let key = (action, order_id.to_string());
        set.insert(key.clone());
        Some(BusyGuard {
            flags: Arc::clone(&self.inner),
            key,
        })
    }

    pub fn is_busy(&self, action: Action, order_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(action, order_id.to_string()))
    }

    pub fn order_busy(&self, order_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(_, id)| id == order_id)
    }
}

#[derive(Debug)]
pub struct BusyGuard {
    flags: Arc<Mutex<HashSet<Key>>>,
    key: Key,
}

impl BusyGuard {
    pub fn action(&self) -> Action {
        self.key.0
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
