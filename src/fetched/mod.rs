//! Stores synchronized with an external resource
//!
//! A [`Fetched`] owns a base [`Store`] and keeps it filled from an
//! asynchronous resource: a read is issued on construction, whenever a
//! dependency store changes, on an optional refetch interval, and on
//! explicit operation calls. Every trigger passes through the dependency
//! gate first; a falsy dependency means no operation is issued at all.
//!
//! Failures are values, not panics. A failed operation leaves the last
//! good value in place, records the error, invokes the registered
//! catchers, and retries on a fixed interval while budget remains.
//!
//! Overlapping operations are sequenced by a per-instance generation
//! stamp: a resolution that is no longer the newest issued operation is
//! discarded, so a slow superseded request can never overwrite a fresher
//! result.
//!
//! Construction must happen inside a tokio runtime; operations run as
//! spawned tasks holding only weak handles, and the refetch timer is
//! aborted when the last `Fetched` handle is dropped.

pub mod http;
pub mod transport;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::{KeyScope, Store, Subscription};
use crate::value::{Json, is_truthy, is_truthy_value};

use http::HttpTransport;
use transport::{OptionsProvider, ResourceError, Transport};

/// One entry of the dependency gate: either a live store or a literal.
pub enum Dependency {
    Cell(Store),
    Literal(Json),
}

impl Dependency {
    fn is_truthy(&self) -> bool {
        match self {
            Dependency::Cell(cell) => is_truthy(&cell.get()),
            Dependency::Literal(value) => is_truthy_value(value),
        }
    }
}

impl From<Store> for Dependency {
    fn from(cell: Store) -> Self {
        Dependency::Cell(cell)
    }
}

impl From<Json> for Dependency {
    fn from(value: Json) -> Self {
        Dependency::Literal(value)
    }
}

/// Construction-time policy for a fetched store.
pub struct FetchedSettings {
    /// Transport capability; defaults to [`HttpTransport`].
    pub transport: Option<Arc<dyn Transport>>,
    /// Request options, fixed or recomputed per call.
    pub options: OptionsProvider,
    /// Re-issue the read on this interval.
    pub refetch_interval: Option<Duration>,
    /// Retries scheduled after a failed operation before giving up.
    pub retry_budget: u32,
    /// Delay between a failure and its retry.
    pub retry_interval: Duration,
    /// All entries must be truthy for any operation to fire.
    pub dependencies: Vec<Dependency>,
}

impl Default for FetchedSettings {
    fn default() -> Self {
        Self {
            transport: None,
            options: OptionsProvider::default(),
            refetch_interval: None,
            retry_budget: 0,
            retry_interval: Duration::from_secs(1),
            dependencies: Vec::new(),
        }
    }
}

#[derive(Clone)]
enum Operation {
    Read,
    Create(Json),
    Replace(Json),
    Merge(Json),
    Remove,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create(_) => "create",
            Operation::Replace(_) => "replace",
            Operation::Merge(_) => "merge",
            Operation::Remove => "remove",
        }
    }
}

type Catcher = Arc<dyn Fn(&ResourceError) + Send + Sync>;
type Loader = Arc<dyn Fn(bool) + Send + Sync>;

struct FetchedInner {
    cell: Store,
    url: String,
    options: OptionsProvider,
    transport: Arc<dyn Transport>,
    dependencies: Vec<Dependency>,
    retry_budget: u32,
    retry_interval: Duration,
    loading: AtomicBool,
    last_error: Mutex<Option<ResourceError>>,
    generation: AtomicU64,
    // Serializes settlements: the staleness check and the write it guards
    // must not interleave with another settlement on a multi-thread
    // runtime.
    settle_gate: Mutex<()>,
    catchers: Mutex<Vec<Catcher>>,
    loaders: Mutex<Vec<Loader>>,
    dependency_subs: Mutex<Vec<Subscription>>,
    refetch_task: Mutex<Option<JoinHandle<()>>>,
}

impl FetchedInner {
    fn has_truthy_dependencies(&self) -> bool {
        self.dependencies.iter().all(Dependency::is_truthy)
    }

    fn set_loading(&self, value: bool) {
        self.loading.store(value, Ordering::SeqCst);
        let loaders: Vec<Loader> = self.loaders.lock().expect("loader list poisoned").clone();
        for loader in loaders {
            loader(value);
        }
    }

    /// Run one operation, gated and generation-stamped. `retries_left` is
    /// the budget remaining for this operation chain.
    fn issue(this: &Arc<Self>, operation: Operation, retries_left: u32) {
        if !this.has_truthy_dependencies() {
            debug!(url = %this.url, operation = operation.name(), "dependency gate closed, skipping");
            return;
        }

        let generation = this.generation.fetch_add(1, Ordering::SeqCst) + 1;
        this.set_loading(true);
        *this.last_error.lock().expect("error slot poisoned") = None;

        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else { return };
            let options = inner.options.resolve();
            let result = match &operation {
                Operation::Read => inner.transport.read(&inner.url, &options).await,
                Operation::Create(body) => inner.transport.create(&inner.url, body, &options).await,
                Operation::Replace(body) => {
                    inner.transport.replace(&inner.url, body, &options).await
                }
                Operation::Merge(body) => inner.transport.merge(&inner.url, body, &options).await,
                Operation::Remove => inner.transport.remove(&inner.url, &options).await,
            };
            FetchedInner::settle(&inner, generation, operation, result, retries_left);
        });
    }

    fn settle(
        this: &Arc<Self>,
        generation: u64,
        operation: Operation,
        result: transport::Result<Json>,
        retries_left: u32,
    ) {
        // Held until the result is applied, so a settlement that passed the
        // staleness check cannot be overtaken by a newer one mid-write.
        let _gate = this.settle_gate.lock().expect("settle gate poisoned");

        if this.generation.load(Ordering::SeqCst) != generation {
            debug!(url = %this.url, generation, "stale resolution discarded");
            return;
        }

        match result {
            Ok(payload) => {
                debug!(url = %this.url, operation = operation.name(), "resource operation settled");
                this.cell.set(payload);
                this.set_loading(false);
            }
            Err(error) => {
                warn!(
                    url = %this.url,
                    operation = operation.name(),
                    error = %error,
                    retries_left,
                    "resource operation failed"
                );
                *this.last_error.lock().expect("error slot poisoned") = Some(error.clone());

                let catchers: Vec<Catcher> =
                    this.catchers.lock().expect("catcher list poisoned").clone();
                for catcher in catchers {
                    catcher(&error);
                }

                this.set_loading(false);

                if retries_left > 0 {
                    let weak = Arc::downgrade(this);
                    let delay = this.retry_interval;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(inner) = weak.upgrade() {
                            FetchedInner::issue(&inner, operation, retries_left - 1);
                        }
                    });
                }
            }
        }
    }
}

impl Drop for FetchedInner {
    fn drop(&mut self) {
        let task = self
            .refetch_task
            .get_mut()
            .ok()
            .and_then(|slot| slot.take());
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// A store kept in sync with an external resource.
pub struct Fetched {
    inner: Arc<FetchedInner>,
}

/// Fetch `url` with default settings: HTTP transport, no dependencies, no
/// retry, no refetch interval.
pub fn fetched(url: impl Into<String>) -> Fetched {
    fetched_with(url, FetchedSettings::default())
}

/// Fetch `url` under the given settings. The initial read is issued
/// immediately, subject to the dependency gate.
pub fn fetched_with(url: impl Into<String>, settings: FetchedSettings) -> Fetched {
    let transport = settings
        .transport
        .unwrap_or_else(|| Arc::new(HttpTransport::default()));

    let inner = Arc::new(FetchedInner {
        cell: Store::unready(),
        url: url.into(),
        options: settings.options,
        transport,
        dependencies: settings.dependencies,
        retry_budget: settings.retry_budget,
        retry_interval: settings.retry_interval,
        loading: AtomicBool::new(false),
        last_error: Mutex::new(None),
        generation: AtomicU64::new(0),
        settle_gate: Mutex::new(()),
        catchers: Mutex::new(Vec::new()),
        loaders: Mutex::new(Vec::new()),
        dependency_subs: Mutex::new(Vec::new()),
        refetch_task: Mutex::new(None),
    });

    // React to every store-shaped dependency; literals cannot change.
    for dependency in &inner.dependencies {
        if let Dependency::Cell(cell) = dependency {
            let weak = Arc::downgrade(&inner);
            let sub = cell.listen(move |_| {
                if let Some(inner) = weak.upgrade() {
                    FetchedInner::issue(&inner, Operation::Read, inner.retry_budget);
                }
            });
            inner
                .dependency_subs
                .lock()
                .expect("subscription list poisoned")
                .push(sub);
        }
    }

    FetchedInner::issue(&inner, Operation::Read, inner.retry_budget);

    if let Some(every) = settings.refetch_interval {
        let weak: Weak<FetchedInner> = Arc::downgrade(&inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately; the construction-time
            // read already covers it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                FetchedInner::issue(&inner, Operation::Read, inner.retry_budget);
            }
        });
        *inner.refetch_task.lock().expect("refetch slot poisoned") = Some(task);
    }

    Fetched { inner }
}

impl Fetched {
    /// Current slot; unready until the first successful read.
    pub fn get(&self) -> Option<Json> {
        self.inner.cell.get()
    }

    /// Handle to the underlying cell, e.g. for use as a computed source or
    /// as another fetched store's dependency.
    pub fn store(&self) -> Store {
        self.inner.cell.clone()
    }

    pub fn listen<F>(&self, closure: F) -> Subscription
    where
        F: Fn(&Option<Json>) + Send + Sync + 'static,
    {
        self.inner.cell.listen(closure)
    }

    pub fn listen_keys<F>(&self, closure: F, scope: KeyScope) -> Subscription
    where
        F: Fn(&Option<Json>) + Send + Sync + 'static,
    {
        self.inner.cell.listen_keys(closure, scope)
    }

    /// Re-issue the read, subject to the dependency gate.
    pub fn fetch(&self) {
        self.issue(Operation::Read);
    }

    /// POST-shaped write; on success the payload replaces the value.
    pub fn create(&self, body: Json) {
        self.issue(Operation::Create(body));
    }

    /// PUT-shaped write; on success the payload replaces the value.
    pub fn replace(&self, body: Json) {
        self.issue(Operation::Replace(body));
    }

    /// PATCH-shaped write; on success the payload replaces the value.
    pub fn merge(&self, body: Json) {
        self.issue(Operation::Merge(body));
    }

    /// DELETE-shaped write; on success the (typically empty) payload
    /// replaces the value.
    pub fn remove(&self) {
        self.issue(Operation::Remove);
    }

    fn issue(&self, operation: Operation) {
        FetchedInner::issue(&self.inner, operation, self.inner.retry_budget);
    }

    /// Register a callback invoked with every operation failure.
    pub fn on_error<F>(&self, catcher: F)
    where
        F: Fn(&ResourceError) + Send + Sync + 'static,
    {
        self.inner
            .catchers
            .lock()
            .expect("catcher list poisoned")
            .push(Arc::new(catcher));
    }

    /// Register a callback invoked with every loading-flag change.
    pub fn on_loading<F>(&self, loader: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.inner
            .loaders
            .lock()
            .expect("loader list poisoned")
            .push(Arc::new(loader));
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<ResourceError> {
        self.inner
            .last_error
            .lock()
            .expect("error slot poisoned")
            .clone()
    }

    /// Revoke the dependency subscriptions this instance created and drop
    /// its catcher and loader lists. Listeners that external code
    /// registered on a dependency store are untouched.
    pub fn clear(&self) {
        let subs = std::mem::take(
            &mut *self
                .inner
                .dependency_subs
                .lock()
                .expect("subscription list poisoned"),
        );
        for sub in &subs {
            sub.unsubscribe();
        }
        self.inner
            .catchers
            .lock()
            .expect("catcher list poisoned")
            .clear();
        self.inner
            .loaders
            .lock()
            .expect("loader list poisoned")
            .clear();
    }
}
