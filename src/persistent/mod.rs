//! Stores mirrored to durable key/value storage
//!
//! A [`Persistent`] hydrates its value from storage on construction and
//! writes the serialized current value back after every `set`. Storage
//! failures are the one thing this component exists to handle, so they are
//! never masked: reads, writes, and corrupt stored text all surface as
//! [`PersistenceError`].

use std::sync::Arc;

use tracing::debug;

use crate::storage::{PersistenceError, Result, Storage};
use crate::store::{KeyScope, Store, Subscription, store};
use crate::value::Json;

/// A store whose value survives in durable storage under a fixed key.
pub struct Persistent {
    cell: Store,
    key: String,
    storage: Arc<dyn Storage>,
}

/// Open a persistent store at `key`, falling back to `default` when the
/// slot was never written.
pub fn persistent(
    storage: Arc<dyn Storage>,
    key: impl Into<String>,
    default: Json,
) -> Result<Persistent> {
    Persistent::open(storage, key, Some(default))
}

impl Persistent {
    /// Hydrate from storage; an absent slot leaves the supplied default,
    /// an unparseable one is an error. The initial value is written back
    /// immediately, normalizing its serialized form.
    pub fn open(
        storage: Arc<dyn Storage>,
        key: impl Into<String>,
        default: Option<Json>,
    ) -> Result<Self> {
        let key = key.into();

        let initial = match storage.read(&key)? {
            Some(text) => {
                let value: Json =
                    serde_json::from_str(&text).map_err(|e| PersistenceError::Corrupt {
                        key: key.clone(),
                        detail: e.to_string(),
                    })?;
                debug!(key, "hydrated persistent store");
                Some(value)
            }
            None => default,
        };

        let cell = match initial {
            Some(value) => store(value),
            None => Store::unready(),
        };

        let this = Self { cell, key, storage };
        this.flush()?;
        Ok(this)
    }

    fn flush(&self) -> Result<()> {
        match self.cell.get() {
            Some(value) => self.storage.write(&self.key, &serde_json::to_string(&value)?),
            None => Ok(()),
        }
    }

    pub fn get(&self) -> Option<Json> {
        self.cell.get()
    }

    /// Equality-suppressed `set`, then write-through. A suppressed set
    /// notifies nobody but the slot is still (re)written.
    pub fn set(&self, value: Json) -> Result<()> {
        self.cell.set(value);
        self.flush()
    }

    pub fn listen<F>(&self, closure: F) -> Subscription
    where
        F: Fn(&Option<Json>) + Send + Sync + 'static,
    {
        self.cell.listen(closure)
    }

    pub fn listen_keys<F>(&self, closure: F, scope: KeyScope) -> Subscription
    where
        F: Fn(&Option<Json>) + Send + Sync + 'static,
    {
        self.cell.listen_keys(closure, scope)
    }

    /// Handle to the underlying cell, for listening and derivation (e.g.
    /// as a computed source).
    ///
    /// Writes must go through [`Persistent::set`]: a `set` on this handle
    /// updates the in-memory value and notifies listeners but is not
    /// written through to durable storage.
    pub fn store(&self) -> Store {
        self.cell.clone()
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
