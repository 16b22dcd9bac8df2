//! Base reactive cell: a value slot plus an ordered listener list
//!
//! A [`Store`] is a cheap clonable handle to shared state. Writes go through
//! [`Store::set`], which suppresses updates that are deeply equal to the
//! current value and otherwise notifies listeners synchronously, in
//! registration order, before returning. Listeners can scope themselves to a
//! set of top-level keys so unrelated field churn does not wake them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::trace;

use crate::value::{Json, deep_eq, field, opt_eq};

type ListenerFn = Box<dyn Fn(&Option<Json>) + Send + Sync>;

/// Which top-level keys a listener cares about.
#[derive(Debug, Clone)]
pub enum KeyScope {
    /// Invoke on every accepted `set`.
    Any,
    /// Invoke only when this field changed.
    One(String),
    /// Invoke when at least one of these fields changed.
    Many(Vec<String>),
}

impl KeyScope {
    fn matches(&self, old: &Option<Json>, new: &Option<Json>) -> bool {
        match self {
            KeyScope::Any => true,
            KeyScope::One(key) => field_changed(old, new, key),
            KeyScope::Many(keys) => keys.iter().any(|key| field_changed(old, new, key)),
        }
    }
}

fn field_changed(old: &Option<Json>, new: &Option<Json>, key: &str) -> bool {
    match (field(old, key), field(new, key)) {
        (None, None) => false,
        (Some(a), Some(b)) => !deep_eq(a, b),
        _ => true,
    }
}

struct ListenerEntry {
    id: u64,
    scope: KeyScope,
    closure: ListenerFn,
}

struct StoreInner {
    value: RwLock<Option<Json>>,
    listeners: Mutex<Vec<Arc<ListenerEntry>>>,
    next_id: AtomicU64,
}

impl StoreInner {
    fn unsubscribe(&self, id: u64) {
        self.listeners
            .lock()
            .expect("listener list poisoned")
            .retain(|entry| entry.id != id);
    }
}

/// Handle to a reactive cell. Clones share the same slot and listeners.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Create a store holding `value`.
pub fn store(value: Json) -> Store {
    Store::new(Some(value))
}

impl Store {
    fn new(value: Option<Json>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                value: RwLock::new(value),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// A store in the unready state, before any value has been set.
    pub fn unready() -> Self {
        Self::new(None)
    }

    /// Clone of the current slot. Never fails, no side effects.
    pub fn get(&self) -> Option<Json> {
        self.inner.value.read().expect("value slot poisoned").clone()
    }

    /// Replace the value. A value deeply equal to the current one is a
    /// no-op: no mutation, no notification.
    pub fn set(&self, value: Json) {
        self.apply(Some(value));
    }

    /// Return the slot to the unready state, notifying listeners if it held
    /// a value.
    pub fn unset(&self) {
        self.apply(None);
    }

    fn apply(&self, new: Option<Json>) {
        let old = {
            let mut slot = self.inner.value.write().expect("value slot poisoned");
            if opt_eq(&slot, &new) {
                return;
            }
            std::mem::replace(&mut *slot, new.clone())
        };

        // Snapshot so listeners registered or removed by a callback do not
        // affect the pass already underway.
        let pass: Vec<Arc<ListenerEntry>> = self
            .inner
            .listeners
            .lock()
            .expect("listener list poisoned")
            .clone();

        trace!(listeners = pass.len(), "notifying store listeners");

        for entry in pass {
            if entry.scope.matches(&old, &new) {
                (entry.closure)(&new);
            }
        }
    }

    /// Register a listener invoked with the new slot on every accepted
    /// `set`. The returned [`Subscription`] removes it again.
    pub fn listen<F>(&self, closure: F) -> Subscription
    where
        F: Fn(&Option<Json>) + Send + Sync + 'static,
    {
        self.listen_keys(closure, KeyScope::Any)
    }

    /// Register a listener scoped to the given keys.
    pub fn listen_keys<F>(&self, closure: F, scope: KeyScope) -> Subscription
    where
        F: Fn(&Option<Json>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .expect("listener list poisoned")
            .push(Arc::new(ListenerEntry {
                id,
                scope,
                closure: Box::new(closure),
            }));

        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Non-owning handle, for dependents that must not keep this store
    /// alive.
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("value", &self.get()).finish()
    }
}

/// Non-owning store handle.
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

/// Handle to one registered listener. Dropping it does nothing; removal is
/// explicit via [`Subscription::unsubscribe`] and is idempotent.
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.store.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}
