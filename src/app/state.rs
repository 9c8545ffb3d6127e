use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::app::cancel::CancelToken;

/// Cancel tokens of operations that are queued or running, keyed by device serial.
#[derive(Default)]
pub struct OperationRegistry {
    next_id: AtomicU64,
    active: Mutex<HashMap<String, Vec<(u64, CancelToken)>>>,
}

/// Removes its entry from the registry when dropped.
pub struct Registration<'a> {
    registry: &'a OperationRegistry,
    serial: String,
    id: u64,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, serial: &str, token: CancelToken) -> Registration<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        guard.entry(serial.to_string()).or_default().push((id, token));
        Registration {
            registry: self,
            serial: serial.to_string(),
            id,
        }
    }

    /// Cancels every registered operation for `serial` and returns how many were signalled.
    pub fn cancel(&self, serial: &str) -> usize {
        let guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(serial).map_or(0, |tokens| {
            tokens.iter().for_each(|(_, token)| token.cancel());
            tokens.len()
        })
    }

    #[cfg(test)]
    pub(crate) fn active_count(&self, serial: &str) -> usize {
        let guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(serial).map_or(0, Vec::len)
    }

    fn remove(&self, serial: &str, id: u64) {
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tokens) = guard.get_mut(serial) {
            tokens.retain(|(entry_id, _)| *entry_id != id);
            if tokens.is_empty() {
                guard.remove(serial);
            }
        }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.serial, self.id);
    }
}
