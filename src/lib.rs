//! Reactive value stores with computed, fetched, and persistent variants
//!
//! The base [`Store`] holds a JSON-shaped value and notifies listeners on
//! change, with deep-equality update suppression and key-scoped
//! subscriptions. On top of it:
//!
//! - [`computed`] derives a store from one or more sources via a pure
//!   mapping, suppressed while any source is unready.
//! - [`fetched`] keeps a store synchronized with a remote resource, gated
//!   by dependencies, with retry on failure and optional periodic refetch.
//! - [`persistent`] mirrors a store to durable key/value storage.
//!
//! Network transport and durable storage are injectable capabilities
//! ([`Transport`], [`Storage`]) with default bindings over reqwest and
//! fjall; fetched stores need a tokio runtime.

pub mod computed;
pub mod fetched;
pub mod persistent;
pub mod storage;
pub mod store;
pub mod value;

pub use computed::{computed, computed_all, computed_all_keys, computed_keys};
pub use fetched::http::{HttpConfig, HttpTransport};
pub use fetched::transport::{OptionsProvider, RequestOptions, ResourceError, Transport};
pub use fetched::{Dependency, Fetched, FetchedSettings, fetched, fetched_with};
pub use persistent::{Persistent, persistent};
pub use storage::{FjallStorage, MemoryStorage, PersistenceError, Storage};
pub use store::{KeyScope, Store, Subscription, WeakStore, store};
pub use value::Json;
