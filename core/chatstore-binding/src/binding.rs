//! Data bindings: a data source wrapped in observable cells.

use crate::cell::Cell;
use chatstore_data::{DataError, DataResult, DataSource};
use chatstore_types::{Fields, Record, fields_of};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How source results land in a bound value.
///
/// Implemented for `Option<T>` (one record) and `Vec<T>` (a collection).
pub trait BoundShape<T: Record>: Clone + Send + Sync + 'static {
    /// The value after a load returned `records`, or `None` to keep the
    /// current value.
    fn loaded(&self, records: Vec<T>) -> Option<Self>;

    /// The value after `record` was created.
    fn created(&self, record: T) -> Self;

    /// The `(id, fields)` updates that persist this value, where `key` is
    /// the binding's key.
    fn patches(&self, key: &str) -> DataResult<Vec<(String, Fields)>>;
}

impl<T: Record> BoundShape<T> for Option<T> {
    /// Takes the first record. An empty load keeps the current value.
    fn loaded(&self, records: Vec<T>) -> Option<Self> {
        records.into_iter().next().map(Some)
    }

    fn created(&self, record: T) -> Self {
        Some(record)
    }

    /// A single bound record is persisted under the binding's key.
    fn patches(&self, key: &str) -> DataResult<Vec<(String, Fields)>> {
        match self {
            Some(record) => Ok(vec![(key.to_string(), fields_of(record)?)]),
            None => Ok(Vec::new()),
        }
    }
}

impl<T: Record> BoundShape<T> for Vec<T> {
    fn loaded(&self, records: Vec<T>) -> Option<Self> {
        Some(records)
    }

    /// The created record replaces the sequence until the next load.
    fn created(&self, record: T) -> Self {
        vec![record]
    }

    fn patches(&self, _key: &str) -> DataResult<Vec<(String, Fields)>> {
        self.iter()
            .map(|record| -> DataResult<(String, Fields)> {
                Ok((record.id().to_string(), fields_of(record)?))
            })
            .collect()
    }
}

/// A local write to a binding's value.
pub enum WriteAction<V> {
    /// Replace the value.
    Value(V),
    /// Replace the value with a function of the current one.
    Update(Box<dyn FnOnce(&V) -> V + Send>),
}

impl<V> WriteAction<V> {
    pub fn update(f: impl FnOnce(&V) -> V + Send + 'static) -> Self {
        WriteAction::Update(Box::new(f))
    }
}

/// Lifecycle options for [`DataBinding::mount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingOptions {
    /// Load once when mounted.
    pub load_on_mount: bool,
    /// Reload on this interval while mounted.
    pub refresh_interval: Option<Duration>,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            load_on_mount: true,
            refresh_interval: None,
        }
    }
}

/// Sets the loading flag for its lifetime.
struct LoadingGuard<'a> {
    loading: &'a Cell<bool>,
}

impl<'a> LoadingGuard<'a> {
    fn start(loading: &'a Cell<bool>) -> Self {
        loading.set(true);
        Self { loading }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.loading.set(false);
    }
}

/// A data source bound to observable cells.
pub struct DataBinding<T, V> {
    key: String,
    source: Arc<dyn DataSource<T>>,
    initial: V,
    value: Cell<V>,
    loading: Cell<bool>,
    error: Cell<Option<String>>,
    options: BindingOptions,
}

impl<T: Record, V: BoundShape<T>> DataBinding<T, V> {
    pub fn new(key: impl Into<String>, initial: V, source: Arc<dyn DataSource<T>>) -> Self {
        Self::with_options(key, initial, source, BindingOptions::default())
    }

    pub fn with_options(
        key: impl Into<String>,
        initial: V,
        source: Arc<dyn DataSource<T>>,
        options: BindingOptions,
    ) -> Self {
        Self {
            key: key.into(),
            source,
            value: Cell::new(initial.clone()),
            initial,
            loading: Cell::new(false),
            error: Cell::new(None),
            options,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> &Arc<dyn DataSource<T>> {
        &self.source
    }

    pub fn options(&self) -> BindingOptions {
        self.options
    }

    /// The bound value.
    pub fn value(&self) -> &Cell<V> {
        &self.value
    }

    /// True while an action is running.
    pub fn loading(&self) -> &Cell<bool> {
        &self.loading
    }

    /// Message of the last failed action, cleared when the next one starts.
    pub fn error(&self) -> &Cell<Option<String>> {
        &self.error
    }

    /// Returns the current value.
    pub fn get(&self) -> V {
        self.value.get()
    }

    /// Loads the collection into the value.
    ///
    /// Failures are recorded in the error cell and not returned.
    pub async fn load(&self) {
        let _loading = LoadingGuard::start(&self.loading);
        self.error.set(None);

        match self.source.get_all().await {
            Ok(records) => {
                debug!(key = %self.key, count = records.len(), "binding loaded");
                let current = self.value.get();
                if let Some(next) = current.loaded(records) {
                    self.value.set(next);
                }
            }
            Err(e) => self.record_error("load", &e),
        }
    }

    /// Creates a record and folds it into the value.
    ///
    /// Failures are recorded in the error cell and returned.
    pub async fn create(&self, data: Fields) -> DataResult<T> {
        let _loading = LoadingGuard::start(&self.loading);
        self.error.set(None);

        match self.source.create(data).await {
            Ok(record) => {
                let created = record.clone();
                self.value.update(|current| current.created(created));
                Ok(record)
            }
            Err(e) => {
                self.record_error("create", &e);
                Err(e)
            }
        }
    }

    /// Deletes a record and resets the value to its initial state.
    ///
    /// Failures are recorded in the error cell and returned.
    pub async fn delete(&self, id: &str) -> DataResult<()> {
        let _loading = LoadingGuard::start(&self.loading);
        self.error.set(None);

        match self.source.delete(id).await {
            Ok(()) => {
                self.value.set(self.initial.clone());
                Ok(())
            }
            Err(e) => {
                self.record_error("delete", &e);
                Err(e)
            }
        }
    }

    /// Applies a write locally, then pushes it to the source.
    ///
    /// The local value is kept even if the source rejects the update; the
    /// failure only shows in the error cell.
    pub async fn write(&self, action: WriteAction<V>) {
        let _loading = LoadingGuard::start(&self.loading);
        self.error.set(None);

        let next = match action {
            WriteAction::Value(value) => {
                self.value.set(value.clone());
                value
            }
            WriteAction::Update(f) => self.value.update(f),
        };

        let patches = match next.patches(&self.key) {
            Ok(patches) => patches,
            Err(e) => {
                self.record_error("write", &e);
                return;
            }
        };
        for (id, fields) in patches {
            if let Err(e) = self.source.update(&id, fields).await {
                self.record_error("write", &e);
                return;
            }
        }
    }

    /// Restores the initial value and clears the error.
    pub fn reset(&self) {
        self.value.set(self.initial.clone());
        self.error.set(None);
    }

    /// Starts the binding's lifecycle: an initial load if configured, and a
    /// periodic reload if an interval is set.
    ///
    /// The returned task stops the reloads when dropped.
    pub async fn mount(self: &Arc<Self>) -> Option<RefreshTask> {
        if self.options.load_on_mount {
            self.load().await;
        }

        let interval = self.options.refresh_interval.filter(|d| !d.is_zero())?;
        let binding = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                binding.load().await;
            }
        });
        Some(RefreshTask { handle })
    }

    fn record_error(&self, action: &str, err: &DataError) {
        warn!(key = %self.key, action, error = %err, "binding action failed");
        self.error.set(Some(err.to_string()));
    }
}

/// Periodic reload started by [`DataBinding::mount`]. Stops when dropped.
pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
