use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::models::RefreshCategory;

/// Zero-argument refetch callback registered by a UI consumer.
pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

type CallbackMap = HashMap<RefreshCategory, HashMap<Uuid, RefreshCallback>>;

fn write_lock(lock: &RwLock<CallbackMap>) -> std::sync::RwLockWriteGuard<'_, CallbackMap> {
    lock.write().unwrap_or_else(|err| err.into_inner())
}

fn read_lock(lock: &RwLock<CallbackMap>) -> std::sync::RwLockReadGuard<'_, CallbackMap> {
    lock.read().unwrap_or_else(|err| err.into_inner())
}

/// Per-category observer registry for refresh callbacks.
///
/// Multiple independent subscribers may register for the same category;
/// dispatch order across subscribers is unspecified. Each registration has a
/// stable identity, so unsubscribing is idempotent and never detaches
/// another subscriber's callback.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    inner: Arc<RwLock<CallbackMap>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `category`.
    ///
    /// The callback stays active until the returned subscription is
    /// explicitly unsubscribed; dropping the handle does not detach it.
    pub fn subscribe(
        &self,
        category: RefreshCategory,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let id = Uuid::new_v4();
        write_lock(&self.inner)
            .entry(category)
            .or_default()
            .insert(id, Arc::new(callback));

        Subscription {
            inner: self.inner.clone(),
            category,
            id,
        }
    }

    /// Invoke every callback registered for any category present in
    /// `categories`. Each callback runs at most once per dispatch, outside
    /// the registry lock.
    pub fn dispatch(&self, categories: &[RefreshCategory]) {
        let mut to_run: Vec<RefreshCallback> = Vec::new();
        {
            let guard = read_lock(&self.inner);
            for category in RefreshCategory::ALL {
                if !categories.contains(&category) {
                    continue;
                }
                if let Some(callbacks) = guard.get(&category) {
                    to_run.extend(callbacks.values().cloned());
                }
            }
        }
        for callback in to_run {
            callback();
        }
    }

    pub fn subscriber_count(&self, category: RefreshCategory) -> usize {
        read_lock(&self.inner)
            .get(&category)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

/// Handle for one callback registration.
pub struct Subscription {
    inner: Arc<RwLock<CallbackMap>>,
    category: RefreshCategory,
    id: Uuid,
}

impl Subscription {
    /// Detach the callback. Idempotent.
    pub fn unsubscribe(&self) {
        let mut guard = write_lock(&self.inner);
        if let Some(callbacks) = guard.get_mut(&self.category) {
            callbacks.remove(&self.id);
            if callbacks.is_empty() {
                guard.remove(&self.category);
            }
        }
    }
}
