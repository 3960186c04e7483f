use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::types::HealthSample;

pub type DataListener = Arc<dyn Fn(&HealthSample) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistryInner {
    listeners: HashMap<String, DataListener>,
    latest: HashMap<String, HealthSample>,
}

/// One data listener per device id, shared with the notification tasks.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<ListenerRegistryInner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerRegistryInner> {
        // a panicking listener poisons the lock; the maps themselves stay consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces any listener previously registered for `device_id`.
    pub fn insert(&self, device_id: &str, listener: DataListener) {
        self.lock().listeners.insert(device_id.to_string(), listener);
    }

    pub fn remove(&self, device_id: &str) {
        self.lock().listeners.remove(device_id);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.listeners.clear();
        inner.latest.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().listeners.is_empty()
    }

    pub fn latest(&self, device_id: &str) -> Option<HealthSample> {
        self.lock().latest.get(device_id).cloned()
    }

    /// Hands a sample to the listener of `device_id`. Empty samples are dropped.
    pub fn notify(&self, device_id: &str, sample: HealthSample) {
        if sample.is_empty() {
            return;
        }

        let listener = {
            let mut inner = self.lock();
            inner.latest.insert(device_id.to_string(), sample.clone());
            inner.listeners.get(device_id).cloned()
        };

        // invoked outside the lock so the callback may register/remove listeners
        if let Some(listener) = listener {
            listener(&sample);
        }
    }
}
