//! Durable key/value storage behind persistent stores
//!
//! Synchronous string-keyed slots holding JSON text. The default binding is
//! fjall; [`MemoryStorage`] backs tests and throwaway setups.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Backend(#[from] fjall::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt stored value at {key}: {detail}")]
    Corrupt { key: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Persistence capability consumed by persistent stores.
pub trait Storage: Send + Sync {
    /// Serialized value at `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write the serialized value at `key`, replacing any previous one.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Fjall-backed storage, one partition of string-keyed JSON text.
pub struct FjallStorage {
    _keyspace: Keyspace,
    slots: PartitionHandle,
}

impl FjallStorage {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("opening storage at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let slots = keyspace.open_partition("slots", PartitionCreateOptions::default())?;

        Ok(Self {
            _keyspace: keyspace,
            slots,
        })
    }
}

impl Storage for FjallStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.slots.get(key)? {
            Some(raw) => {
                let text =
                    String::from_utf8(raw.to_vec()).map_err(|e| PersistenceError::Corrupt {
                        key: key.to_string(),
                        detail: e.to_string(),
                    })?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.slots.insert(key, value)?;
        debug!(key, "wrote storage slot");
        Ok(())
    }
}

/// In-memory storage for tests and throwaway setups.
#[derive(Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .slots
            .lock()
            .expect("slot map poisoned")
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.slots
            .lock()
            .expect("slot map poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
