//! Hybrid data source: a local cache layered over a remote source of truth.
//!
//! Reads are served from the local store first; writes land locally first
//! and are mirrored to the remote on a best-effort basis. A resync replaces
//! the local collection with the remote one.
//!
//! # Pending writes
//!
//! Every local write registers its record id as pending until the remote
//! mirror succeeds. A resync keeps the local version of pending upserts and
//! drops pending deletes, so a write racing a resync is never discarded.
//! Writes that are never mirrored (`sync_on_write` off, offline mode, remote
//! failure) stay pending and survive every resync.
//!
//! The pending list is persisted in the store under `<key>.pending`, so it
//! is shared by every hybrid source over the same slot and survives a
//! restart. Those sources also share one replace gate per slot key.
//!
//! # Sync guard
//!
//! At most one resync runs per instance. A resync requested while another
//! is in flight returns immediately without fetching.

use crate::error::{DataError, DataResult};
use crate::local::LocalSource;
use crate::remote::RemoteSource;
use crate::source::{DataSource, SourceKind};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use chatstore_types::{Fields, Record, new_record_id};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Flags controlling how the hybrid source talks to the remote half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HybridOptions {
    /// Trigger a background resync after every successful local read.
    pub sync_on_read: bool,
    /// Mirror every local write to the remote.
    pub sync_on_write: bool,
    /// Never touch the remote.
    pub offline_mode: bool,
}

/// A local write whose remote mirror has not succeeded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PendingWrite {
    Upsert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PendingEntry {
    write: PendingWrite,
    ticket: String,
}

type PendingMap = BTreeMap<String, PendingEntry>;

/// Handle to one registered pending write.
struct PendingTicket {
    id: String,
    ticket: String,
    previous: Option<PendingEntry>,
}

/// Locks shared by every hybrid source over one slot key.
#[derive(Default)]
struct SlotLocks {
    /// Serializes read-modify-write of the pending slot.
    pending: Mutex<()>,
    /// Held shared by local writes and exclusively while a resync replaces
    /// the local collection.
    replace_gate: RwLock<()>,
}

static SLOT_LOCKS: LazyLock<std::sync::Mutex<HashMap<String, Arc<SlotLocks>>>> =
    LazyLock::new(Default::default);

fn slot_locks(key: &str) -> Arc<SlotLocks> {
    let mut locks = SLOT_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key.to_string()).or_default())
}

/// Resets the in-flight flag when dropped.
struct SyncGuard {
    flag: Arc<AtomicBool>,
}

impl SyncGuard {
    fn try_begin(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct HybridInner<T> {
    local: LocalSource<T>,
    remote: RemoteSource<T>,
    options: HybridOptions,
    syncing: Arc<AtomicBool>,
    pending_key: String,
    locks: Arc<SlotLocks>,
}

/// Data source combining a [`LocalSource`] cache with a [`RemoteSource`].
pub struct HybridSource<T> {
    inner: Arc<HybridInner<T>>,
}

impl<T> Clone for HybridSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record> HybridSource<T> {
    /// Creates a hybrid source owning `local` and `remote`.
    pub fn new(local: LocalSource<T>, remote: RemoteSource<T>, options: HybridOptions) -> Self {
        Self {
            inner: Arc::new(HybridInner {
                syncing: Arc::new(AtomicBool::new(false)),
                pending_key: format!("{}.pending", local.key()),
                locks: slot_locks(local.key()),
                local,
                remote,
                options,
            }),
        }
    }

    /// Creates a hybrid source for slot `key` and the remote `endpoint`.
    pub fn open(
        key: impl Into<String>,
        endpoint: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        client: reqwest::Client,
        options: HybridOptions,
    ) -> Self {
        Self::new(
            LocalSource::new(key, store),
            RemoteSource::with_client(endpoint, client),
            options,
        )
    }

    /// The flags this source was built with.
    pub fn options(&self) -> HybridOptions {
        self.inner.options
    }

    /// The local half.
    pub fn local(&self) -> &LocalSource<T> {
        &self.inner.local
    }

    /// The remote half.
    pub fn remote(&self) -> &RemoteSource<T> {
        &self.inner.remote
    }

    /// Returns true while a resync is in flight.
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    /// Number of local writes over this slot not yet mirrored to the remote.
    pub async fn pending_writes(&self) -> DataResult<usize> {
        Ok(self.load_pending().await?.len())
    }

    /// Runs [`DataSource::sync`] every `interval` until the returned task is
    /// dropped or stopped. The first run happens after one interval.
    pub fn spawn_periodic_sync(&self, interval: Duration) -> SyncTask {
        let source = self.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if let Err(e) = source.sync().await {
                    warn!(key = %source.inner.local.key(), error = %e, "periodic sync failed");
                }
            }
        });
        SyncTask { handle }
    }

    fn remote_enabled(&self) -> bool {
        !self.inner.options.offline_mode
    }

    fn mirror_writes(&self) -> bool {
        self.inner.options.sync_on_write && !self.inner.options.offline_mode
    }

    /// Fires a resync without waiting on it, if reads are configured to.
    fn sync_in_background(&self) {
        if !self.inner.options.sync_on_read || self.inner.options.offline_mode {
            return;
        }
        let Some(guard) = SyncGuard::try_begin(&self.inner.syncing) else {
            debug!(key = %self.inner.local.key(), "background sync already in flight");
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime; skipping background sync");
            return;
        };

        let source = self.clone();
        runtime.spawn(async move {
            let _guard = guard;
            if let Err(e) = source.resync().await {
                warn!(key = %source.inner.local.key(), error = %e, "background sync failed");
            }
        });
    }

    /// Fetches the remote collection and replaces the local one with it.
    async fn resync(&self) -> DataResult<Vec<T>> {
        let pending_before = self.load_pending().await?;
        let remote = self.inner.remote.get_all().await?;
        let merged = self.store_remote_snapshot(remote, pending_before).await?;
        info!(key = %self.inner.local.key(), count = merged.len(), "local collection resynced");
        Ok(merged)
    }

    /// Writes a remote snapshot into the local store, keeping pending local
    /// writes on top of it.
    ///
    /// `pending_before` is the pending list from before the remote fetch;
    /// writes settled while the fetch was in flight still win over it.
    async fn store_remote_snapshot(
        &self,
        remote: Vec<T>,
        pending_before: PendingMap,
    ) -> DataResult<Vec<T>> {
        let _gate = self.inner.locks.replace_gate.write().await;

        let mut pending: HashMap<String, PendingWrite> = pending_before
            .into_iter()
            .map(|(id, entry)| (id, entry.write))
            .collect();
        pending.extend(
            self.load_pending()
                .await?
                .into_iter()
                .map(|(id, entry)| (id, entry.write)),
        );

        let local = self.inner.local.get_all().await?;
        let local_by_id: HashMap<&str, &T> = local.iter().map(|r| (r.id(), r)).collect();

        let mut merged = Vec::with_capacity(remote.len());
        let mut seen = HashSet::new();
        for record in remote {
            let id = record.id().to_string();
            if !seen.insert(id.clone()) {
                continue;
            }
            match pending.get(&id) {
                Some(PendingWrite::Delete) => {}
                Some(PendingWrite::Upsert) => match local_by_id.get(id.as_str()) {
                    Some(local_record) => merged.push((*local_record).clone()),
                    None => merged.push(record),
                },
                None => merged.push(record),
            }
        }
        for record in &local {
            if pending.get(record.id()) == Some(&PendingWrite::Upsert)
                && seen.insert(record.id().to_string())
            {
                merged.push(record.clone());
            }
        }

        self.inner.local.replace_all(&merged).await?;
        Ok(merged)
    }

    /// Reads the persisted pending list. A corrupt list reads as empty.
    async fn load_pending(&self) -> DataResult<PendingMap> {
        let Some(bytes) = self.inner.local.store().read(&self.inner.pending_key).await? else {
            return Ok(PendingMap::new());
        };
        match serde_json::from_slice(&bytes) {
            Ok(pending) => Ok(pending),
            Err(e) => {
                warn!(key = %self.inner.pending_key, error = %e, "discarding corrupt pending-write list");
                Ok(PendingMap::new())
            }
        }
    }

    async fn save_pending(&self, pending: &PendingMap) -> DataResult<()> {
        let store = self.inner.local.store();
        if pending.is_empty() {
            return store.remove(&self.inner.pending_key).await;
        }
        let bytes = serde_json::to_vec(pending)
            .map_err(|e| DataError::StorageUnavailable(format!("failed to encode pending writes: {e}")))?;
        store.write(&self.inner.pending_key, bytes).await
    }

    async fn mark_pending(&self, id: &str, write: PendingWrite) -> DataResult<PendingTicket> {
        let _lock = self.inner.locks.pending.lock().await;
        let mut pending = self.load_pending().await?;
        let ticket = new_record_id();
        let previous = pending.insert(
            id.to_string(),
            PendingEntry {
                write,
                ticket: ticket.clone(),
            },
        );
        self.save_pending(&pending).await?;
        Ok(PendingTicket {
            id: id.to_string(),
            ticket,
            previous,
        })
    }

    /// Replaces the entry `ticket` registered, unless a newer write took
    /// its place. Failures are logged.
    async fn release(&self, ticket: PendingTicket, restore: Option<PendingEntry>) {
        let _lock = self.inner.locks.pending.lock().await;
        if let Err(e) = self.replace_entry(&ticket, restore).await {
            warn!(key = %self.inner.pending_key, id = %ticket.id, error = %e, "failed to update pending-write list");
        }
    }

    async fn replace_entry(
        &self,
        ticket: &PendingTicket,
        restore: Option<PendingEntry>,
    ) -> DataResult<()> {
        let mut pending = self.load_pending().await?;
        if !pending
            .get(&ticket.id)
            .is_some_and(|e| e.ticket == ticket.ticket)
        {
            return Ok(());
        }
        match restore {
            Some(previous) => {
                pending.insert(ticket.id.clone(), previous);
            }
            None => {
                pending.remove(&ticket.id);
            }
        }
        self.save_pending(&pending).await
    }

    /// The remote mirror succeeded: forget the write.
    async fn settle(&self, ticket: PendingTicket) {
        self.release(ticket, None).await;
    }

    /// The local write failed: restore whatever was pending before.
    async fn rollback(&self, mut ticket: PendingTicket) {
        let previous = ticket.previous.take();
        self.release(ticket, previous).await;
    }

    /// Mirrors a completed local write, swallowing remote failures.
    async fn mirror<F, Fut, R>(&self, ticket: PendingTicket, op: &str, call: F)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DataResult<R>>,
    {
        if !self.mirror_writes() {
            return;
        }
        match call().await {
            Ok(_) => self.settle(ticket).await,
            Err(e) => warn!(
                key = %self.inner.local.key(),
                id = %ticket.id,
                op,
                error = %e,
                "failed to mirror write to remote; keeping local result"
            ),
        }
    }
}

#[async_trait]
impl<T: Record> DataSource<T> for HybridSource<T> {
    fn kind(&self) -> SourceKind {
        SourceKind::Hybrid
    }

    async fn get(&self, id: &str) -> DataResult<T> {
        let local_err = match self.inner.local.get(id).await {
            Ok(record) => {
                self.sync_in_background();
                return Ok(record);
            }
            Err(e) => e,
        };

        if !self.remote_enabled() {
            return Err(local_err);
        }

        match self.inner.remote.get(id).await {
            Ok(record) => {
                let _gate = self.inner.locks.replace_gate.read().await;
                if let Err(e) = self.inner.local.put(&record).await {
                    warn!(key = %self.inner.local.key(), %id, error = %e, "failed to cache remote record");
                }
                Ok(record)
            }
            Err(remote_err) => {
                warn!(%id, error = %remote_err, "both local and remote data unavailable");
                Err(local_err)
            }
        }
    }

    async fn get_all(&self) -> DataResult<Vec<T>> {
        let local = self.inner.local.get_all().await?;
        if !local.is_empty() {
            self.sync_in_background();
            return Ok(local);
        }

        if !self.remote_enabled() {
            return Ok(local);
        }

        let pending_before = self.load_pending().await?;
        match self.inner.remote.get_all().await {
            Ok(remote) => self.store_remote_snapshot(remote, pending_before).await,
            Err(remote_err) => {
                warn!(error = %remote_err, "local collection empty and remote unavailable");
                Ok(local)
            }
        }
    }

    async fn create(&self, mut data: Fields) -> DataResult<T> {
        let id = new_record_id();
        data.insert("id".to_string(), Value::String(id.clone()));
        let record: T = chatstore_types::record_from_fields(data.clone())?;

        let ticket = self.mark_pending(&id, PendingWrite::Upsert).await?;
        let stored = {
            let _gate = self.inner.locks.replace_gate.read().await;
            self.inner.local.put(&record).await
        };
        if let Err(e) = stored {
            self.rollback(ticket).await;
            return Err(e);
        }

        // The locally generated id travels with the mirror so both halves
        // agree on identity.
        self.mirror(ticket, "create", || self.inner.remote.create(data))
            .await;
        Ok(record)
    }

    async fn update(&self, id: &str, patch: Fields) -> DataResult<T> {
        let ticket = self.mark_pending(id, PendingWrite::Upsert).await?;
        let updated = {
            let _gate = self.inner.locks.replace_gate.read().await;
            self.inner.local.update(id, patch.clone()).await
        };
        let record = match updated {
            Ok(record) => record,
            Err(e) => {
                self.rollback(ticket).await;
                return Err(e);
            }
        };

        self.mirror(ticket, "update", || self.inner.remote.update(id, patch))
            .await;
        Ok(record)
    }

    async fn delete(&self, id: &str) -> DataResult<()> {
        let ticket = self.mark_pending(id, PendingWrite::Delete).await?;
        let deleted = {
            let _gate = self.inner.locks.replace_gate.read().await;
            self.inner.local.delete(id).await
        };
        if let Err(e) = deleted {
            self.rollback(ticket).await;
            return Err(e);
        }

        self.mirror(ticket, "delete", || self.inner.remote.delete(id))
            .await;
        Ok(())
    }

    async fn sync(&self) -> DataResult<()> {
        if self.inner.options.offline_mode {
            return Ok(());
        }
        let Some(_guard) = SyncGuard::try_begin(&self.inner.syncing) else {
            debug!(key = %self.inner.local.key(), "sync already in flight; skipping");
            return Ok(());
        };
        self.resync().await.map(|_| ())
    }
}

/// A running periodic sync. Stops when dropped.
pub struct SyncTask {
    handle: JoinHandle<()>,
}

impl SyncTask {
    /// Stops the task.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Returns true once the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
